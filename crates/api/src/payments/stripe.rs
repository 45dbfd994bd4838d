use async_trait::async_trait;
use pumpflix_core::types::DbId;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;

use super::{CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider};

/// Client for a Stripe-compatible REST API.
#[derive(Clone)]
pub struct StripeProvider {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl std::fmt::Debug for StripeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeProvider")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeProvider {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.api_base))
            .bearer_auth(&self.secret_key)
    }

    /// Send a request and decode the JSON body, turning non-2xx replies
    /// into [`PaymentError::Api`].
    async fn send(&self, builder: RequestBuilder) -> Result<Value, PaymentError> {
        let response = builder.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}

fn string_field(body: &Value, pointer: &str) -> Result<String, PaymentError> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PaymentError::Decode(format!("missing {pointer}")))
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn is_live(&self) -> bool {
        true
    }

    async fn create_customer(
        &self,
        organization_id: DbId,
        email: &str,
        name: &str,
    ) -> Result<String, PaymentError> {
        let org = organization_id.to_string();
        let form = [
            ("email", email),
            ("name", name),
            ("metadata[organization_id]", org.as_str()),
        ];
        let body = self
            .send(self.request(Method::POST, "/customers").form(&form))
            .await?;
        string_field(&body, "/id")
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, PaymentError> {
        let org = request.organization_id.to_string();
        let form = [
            ("mode", "subscription"),
            ("customer", request.customer_id),
            ("line_items[0][price]", request.price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
            ("client_reference_id", org.as_str()),
            ("metadata[organization_id]", org.as_str()),
            ("metadata[plan]", request.plan),
            ("subscription_data[metadata][organization_id]", org.as_str()),
            ("subscription_data[metadata][plan]", request.plan),
        ];
        let body = self
            .send(self.request(Method::POST, "/checkout/sessions").form(&form))
            .await?;
        Ok(CheckoutSession {
            id: string_field(&body, "/id")?,
            url: string_field(&body, "/url")?,
        })
    }

    async fn change_subscription_price(
        &self,
        subscription_id: &str,
        price_id: &str,
    ) -> Result<(), PaymentError> {
        let path = format!("/subscriptions/{subscription_id}");
        let current = self.send(self.request(Method::GET, &path)).await?;
        let item_id = string_field(&current, "/items/data/0/id")?;

        let form = [
            ("items[0][id]", item_id.as_str()),
            ("items[0][price]", price_id),
            ("proration_behavior", "create_prorations"),
            ("cancel_at_period_end", "false"),
        ];
        self.send(self.request(Method::POST, &path).form(&form))
            .await?;
        Ok(())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), PaymentError> {
        let path = format!("/subscriptions/{subscription_id}");
        if at_period_end {
            self.send(
                self.request(Method::POST, &path)
                    .form(&[("cancel_at_period_end", "true")]),
            )
            .await?;
        } else {
            self.send(self.request(Method::DELETE, &path)).await?;
        }
        Ok(())
    }
}
