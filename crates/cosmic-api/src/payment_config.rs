//! # Payment Config
//!
//! Non-secret provider configuration for the storefront. Built once at
//! start-up and served read-only.

use cosmic_revolut::RevolutConfig;
use cosmic_stripe::StripeConfig;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripePublicConfig {
    pub publishable_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevolutPublicConfig {
    pub merchant_id: Option<String>,
    /// Whether an API key is configured; the key itself is never exposed
    pub available: bool,
}

/// Body of `GET /api/config/payment`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentConfig {
    pub stripe: StripePublicConfig,
    pub revolut: RevolutPublicConfig,
}

impl PaymentConfig {
    pub fn new(stripe: Option<&StripeConfig>, revolut: Option<&RevolutConfig>) -> Self {
        let non_empty = |value: &str| Some(value.to_string()).filter(|v| !v.is_empty());

        Self {
            stripe: StripePublicConfig {
                publishable_key: stripe.and_then(|c| non_empty(&c.publishable_key)),
            },
            revolut: RevolutPublicConfig {
                merchant_id: revolut.and_then(|c| non_empty(&c.merchant_id)),
                available: revolut.is_some(),
            },
        }
    }
}
