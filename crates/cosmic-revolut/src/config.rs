//! # Revolut Configuration

use cosmic_core::{PaymentError, PaymentResult};
use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://merchant.revolut.com";
pub const DEFAULT_CHECKOUT_BASE_URL: &str = "https://checkout.revolut.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Revolut Merchant API configuration
#[derive(Debug, Clone)]
pub struct RevolutConfig {
    /// Secret Merchant API key
    pub api_key: String,

    /// Public merchant id, safe to hand to the storefront
    pub merchant_id: String,

    /// Webhook signing secret (wsk_...); events are unverified without one
    pub webhook_secret: Option<String>,

    pub api_base_url: String,

    /// Base of hosted payment pages (`{base}/payment-link/{public_id}`)
    pub checkout_base_url: String,

    pub timeout: Duration,
}

impl RevolutConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when `REVOLUT_API_KEY` is unset.
    pub fn from_env() -> PaymentResult<Option<Self>> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from any variable lookup
    pub fn from_vars<F>(lookup: F) -> PaymentResult<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(api_key) = var("REVOLUT_API_KEY") else {
            return Ok(None);
        };

        let timeout = match var("PROVIDER_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|_| {
                PaymentError::Configuration(format!(
                    "PROVIDER_TIMEOUT_SECS must be a number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let trim = |url: String| url.trim_end_matches('/').to_string();

        Ok(Some(Self {
            api_key,
            merchant_id: var("REVOLUT_MERCHANT_ID").unwrap_or_default(),
            webhook_secret: var("REVOLUT_WEBHOOK_SECRET"),
            api_base_url: trim(
                var("REVOLUT_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            ),
            checkout_base_url: trim(
                var("REVOLUT_CHECKOUT_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_CHECKOUT_BASE_URL.to_string()),
            ),
            timeout: Duration::from_secs(timeout),
        }))
    }

    /// Create config with explicit values (for testing)
    pub fn new(api_key: impl Into<String>, merchant_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            merchant_id: merchant_id.into(),
            webhook_secret: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            checkout_base_url: DEFAULT_CHECKOUT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Hosted payment page for an order's public id
    pub fn payment_link(&self, public_id: &str) -> String {
        format!("{}/payment-link/{}", self.checkout_base_url, public_id)
    }
}
