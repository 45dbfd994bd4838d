//! Payment provider client.
//!
//! [`PaymentProvider`] is the seam between billing handlers and the
//! external provider. [`StripeProvider`] speaks the Stripe-compatible
//! form-encoded REST API; [`NoopPaymentProvider`] is used when no key is
//! configured, in which case plan changes apply locally right away.

mod noop;
mod stripe;

use async_trait::async_trait;
use pumpflix_core::types::DbId;

pub use noop::NoopPaymentProvider;
pub use stripe::StripeProvider;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected provider response: {0}")]
    Decode(String),
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        crate::error::AppError::Provider(err.to_string())
    }
}

/// Parameters for a hosted checkout page.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub organization_id: DbId,
    pub customer_id: &'a str,
    pub price_id: &'a str,
    pub plan: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// False for providers that never talk to a real backend.
    fn is_live(&self) -> bool;

    /// Create a customer record and return its id.
    async fn create_customer(
        &self,
        organization_id: DbId,
        email: &str,
        name: &str,
    ) -> Result<String, PaymentError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Move an existing subscription to another price.
    async fn change_subscription_price(
        &self,
        subscription_id: &str,
        price_id: &str,
    ) -> Result<(), PaymentError>;

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), PaymentError>;
}
