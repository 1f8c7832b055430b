//! # Payment Strategy Trait
//!
//! Strategy pattern trait for the payment providers the storefront can
//! hand a checkout to.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaymentStrategy (trait)                  │
//! │  ├── create_checkout()                                      │
//! │  ├── parse_completion_event()                               │
//! │  └── provider()                                             │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                  ┌─────────┴─────────┐
//!                  │                   │
//!          ┌───────┴───────┐   ┌───────┴───────┐
//!          │StripeCheckout │   │ RevolutOrder  │
//!          │   Strategy    │   │   Strategy    │
//!          └───────────────┘   └───────────────┘
//! ```

use crate::error::PaymentResult;
use crate::order::{CheckoutSession, Order, OrderId, PaymentProvider, WebhookEvent, WebhookRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Core trait for payment provider implementations.
///
/// The checkout orchestrator is written once against this trait and picks
/// an implementation by the customer's declared payment method.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Create the provider-hosted checkout for a persisted pending order.
    ///
    /// Must fail with `PaymentError::Provider` if the remote call fails or
    /// times out. Implementations never touch the order store.
    async fn create_checkout(
        &self,
        order: &Order,
        urls: &CheckoutUrls,
    ) -> PaymentResult<CheckoutSession>;

    /// Verify (where the provider supports it) and parse a webhook delivery.
    ///
    /// Fails with `PaymentError::Authenticity` when a signature does not
    /// verify, and with `PaymentError::WebhookParse` for payloads that are
    /// not events this provider sends.
    async fn parse_completion_event(
        &self,
        request: WebhookRequest<'_>,
    ) -> PaymentResult<WebhookEvent>;

    /// Which provider this strategy talks to
    fn provider(&self) -> PaymentProvider;
}

/// Type alias for a boxed payment strategy (dynamic dispatch)
pub type BoxedPaymentStrategy = Arc<dyn PaymentStrategy>;

/// Registry of the configured providers
#[derive(Clone, Default)]
pub struct PaymentStrategySelector {
    strategies: HashMap<PaymentProvider, BoxedPaymentStrategy>,
}

impl PaymentStrategySelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payment strategy
    pub fn register(&mut self, strategy: BoxedPaymentStrategy) {
        self.strategies.insert(strategy.provider(), strategy);
    }

    /// Register with builder pattern
    pub fn with_strategy(mut self, strategy: BoxedPaymentStrategy) -> Self {
        self.register(strategy);
        self
    }

    /// Get a strategy by provider
    pub fn get(&self, provider: PaymentProvider) -> Option<&BoxedPaymentStrategy> {
        self.strategies.get(&provider)
    }

    /// List all registered providers
    pub fn providers(&self) -> Vec<PaymentProvider> {
        let mut providers: Vec<_> = self.strategies.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }

    /// Check if a provider is registered
    pub fn has_provider(&self, provider: PaymentProvider) -> bool {
        self.strategies.contains_key(&provider)
    }
}

/// Redirect targets handed to providers.
///
/// Both URLs point back at the storefront with `checkout`, `order_id` and
/// `provider` query parameters for the front-end to pick up.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    /// Base URL of the storefront (e.g., "https://cosmicblueprint.app")
    pub base_url: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn success_url(&self, order_id: OrderId, provider: PaymentProvider) -> String {
        format!(
            "{}/?checkout=success&order_id={}&provider={}",
            self.base_url, order_id, provider
        )
    }

    pub fn cancel_url(&self, order_id: OrderId, provider: PaymentProvider) -> String {
        format!(
            "{}/?checkout=cancelled&order_id={}&provider={}",
            self.base_url, order_id, provider
        )
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStrategy;

    #[test]
    fn test_checkout_urls() {
        let urls = CheckoutUrls::new("https://cosmicblueprint.app/");

        assert_eq!(
            urls.success_url(42, PaymentProvider::Stripe),
            "https://cosmicblueprint.app/?checkout=success&order_id=42&provider=stripe"
        );
        assert_eq!(
            urls.cancel_url(42, PaymentProvider::Revolut),
            "https://cosmicblueprint.app/?checkout=cancelled&order_id=42&provider=revolut"
        );
    }

    #[test]
    fn test_strategy_selector() {
        let selector = PaymentStrategySelector::new()
            .with_strategy(Arc::new(FakeStrategy::new(PaymentProvider::Revolut)));

        assert!(selector.has_provider(PaymentProvider::Revolut));
        assert!(!selector.has_provider(PaymentProvider::Stripe));
        assert!(selector.get(PaymentProvider::Stripe).is_none());
        assert_eq!(selector.providers(), vec![PaymentProvider::Revolut]);
    }
}
