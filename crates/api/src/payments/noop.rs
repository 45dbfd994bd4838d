use async_trait::async_trait;
use pumpflix_core::types::DbId;

use super::{CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider};

/// Provider used when no API key is configured.
#[derive(Debug, Default, Clone)]
pub struct NoopPaymentProvider;

#[async_trait]
impl PaymentProvider for NoopPaymentProvider {
    fn is_live(&self) -> bool {
        false
    }

    async fn create_customer(
        &self,
        organization_id: DbId,
        _email: &str,
        _name: &str,
    ) -> Result<String, PaymentError> {
        Ok(format!("local_cus_{organization_id}"))
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, PaymentError> {
        Ok(CheckoutSession {
            id: format!("local_cs_{}_{}", request.organization_id, request.plan),
            url: request.success_url.to_string(),
        })
    }

    async fn change_subscription_price(
        &self,
        _subscription_id: &str,
        _price_id: &str,
    ) -> Result<(), PaymentError> {
        Ok(())
    }

    async fn cancel_subscription(
        &self,
        _subscription_id: &str,
        _at_period_end: bool,
    ) -> Result<(), PaymentError> {
        Ok(())
    }
}
