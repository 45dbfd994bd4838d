use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// Everything except the secrets has a default suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Upper bound on how long background tasks get to drain after the
    /// listener stops.
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    /// Base64-encoded 32-byte AES key for integration credentials.
    pub credentials_key: String,
    pub billing: BillingConfig,
}

/// Payment provider settings.
#[derive(Debug, Clone, Default)]
pub struct BillingConfig {
    /// Provider API key. Without it checkout and plan changes only update
    /// the local subscription row.
    pub secret_key: Option<String>,
    /// Shared secret for webhook signatures. Without it every webhook is
    /// rejected.
    pub webhook_secret: Option<String>,
    pub api_base: String,
    pub price_pro: Option<String>,
    pub price_business: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl BillingConfig {
    /// | Env Var                          | Default                                |
    /// |----------------------------------|----------------------------------------|
    /// | `PAYMENT_PROVIDER_SECRET_KEY`    | unset                                  |
    /// | `PAYMENT_WEBHOOK_SECRET`         | unset                                  |
    /// | `PAYMENT_PROVIDER_API_BASE`      | `https://api.stripe.com/v1`            |
    /// | `PAYMENT_PRICE_PRO`              | unset                                  |
    /// | `PAYMENT_PRICE_BUSINESS`         | unset                                  |
    /// | `BILLING_SUCCESS_URL`            | `http://localhost:5173/billing/success`|
    /// | `BILLING_CANCEL_URL`             | `http://localhost:5173/billing`        |
    pub fn from_env() -> Self {
        Self {
            secret_key: non_empty_var("PAYMENT_PROVIDER_SECRET_KEY"),
            webhook_secret: non_empty_var("PAYMENT_WEBHOOK_SECRET"),
            api_base: std::env::var("PAYMENT_PROVIDER_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".into()),
            price_pro: non_empty_var("PAYMENT_PRICE_PRO"),
            price_business: non_empty_var("PAYMENT_PRICE_BUSINESS"),
            success_url: std::env::var("BILLING_SUCCESS_URL")
                .unwrap_or_else(|_| "http://localhost:5173/billing/success".into()),
            cancel_url: std::env::var("BILLING_CANCEL_URL")
                .unwrap_or_else(|_| "http://localhost:5173/billing".into()),
        }
    }

    /// Provider price id configured for a paid plan.
    pub fn price_for(&self, plan: pumpflix_core::plans::Plan) -> Option<&str> {
        use pumpflix_core::plans::Plan;
        match plan {
            Plan::Free => None,
            Plan::Pro => self.price_pro.as_deref(),
            Plan::Business => self.price_business.as_deref(),
        }
    }

    /// Reverse of [`Self::price_for`].
    pub fn plan_for_price(&self, price_id: &str) -> Option<pumpflix_core::plans::Plan> {
        use pumpflix_core::plans::{Plan, ALL_PLANS};
        ALL_PLANS
            .iter()
            .copied()
            .filter(|p| *p != Plan::Free)
            .find(|p| self.price_for(*p) == Some(price_id))
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                 |
    /// |-------------------------------|-------------------------|
    /// | `HOST`                        | `0.0.0.0`               |
    /// | `PORT`                        | `3000`                  |
    /// | `CORS_ORIGINS`                | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`        | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`                    |
    /// | `CREDENTIALS_ENCRYPTION_KEY`  | required                |
    ///
    /// JWT and billing settings are documented on [`JwtConfig::from_env`]
    /// and [`BillingConfig::from_env`].
    pub fn from_env() -> Self {
        let host = non_empty_var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parsed_var("PORT", 3000u16);
        let cors_origins: Vec<String> = non_empty_var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        let request_timeout_secs = parsed_var("REQUEST_TIMEOUT_SECS", 30u64);
        let shutdown_timeout_secs = parsed_var("SHUTDOWN_TIMEOUT_SECS", 30u64);

        let credentials_key = std::env::var("CREDENTIALS_ENCRYPTION_KEY")
            .expect("CREDENTIALS_ENCRYPTION_KEY must be set in the environment");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt: JwtConfig::from_env(),
            credentials_key,
            billing: BillingConfig::from_env(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// `default` when unset; panics at startup on an unparsable value.
pub(crate) fn parsed_var<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} has an invalid value '{raw}': {e}")),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumpflix_core::plans::Plan;

    #[test]
    fn price_lookup_both_ways() {
        let billing = BillingConfig {
            price_pro: Some("price_pro_1".into()),
            price_business: Some("price_biz_1".into()),
            ..Default::default()
        };
        assert_eq!(billing.price_for(Plan::Pro), Some("price_pro_1"));
        assert_eq!(billing.price_for(Plan::Free), None);
        assert_eq!(billing.plan_for_price("price_biz_1"), Some(Plan::Business));
        assert_eq!(billing.plan_for_price("price_other"), None);
    }
}
