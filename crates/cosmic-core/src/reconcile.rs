//! # Webhook Reconciler
//!
//! Turns provider webhook deliveries into order state changes. Every
//! transition is idempotent, so duplicate and concurrent deliveries of the
//! same event leave a single completed order.

use crate::error::{PaymentError, PaymentResult};
use crate::order::{Order, OrderId, OrderSummary, PaymentProvider, WebhookEventType, WebhookRequest};
use crate::store::{OrderStore, Transition};
use crate::strategy::PaymentStrategySelector;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What a webhook delivery did to the order store
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Payment completed; `applied` is false for redeliveries
    Completed { order: Order, applied: bool },
    /// Payment failed; `applied` is false if the order had moved on already
    Failed { order: Order, applied: bool },
    /// Acknowledged without any state change
    Ignored(String),
}

impl WebhookOutcome {
    fn from_transition(transition: Transition, completed: bool) -> Self {
        let applied = transition.is_applied();
        let order = transition.into_order();
        if completed {
            WebhookOutcome::Completed { order, applied }
        } else {
            WebhookOutcome::Failed { order, applied }
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn OrderStore>,
    strategies: PaymentStrategySelector,
}

impl Reconciler {
    pub fn new(store: Arc<dyn OrderStore>, strategies: PaymentStrategySelector) -> Self {
        Self { store, strategies }
    }

    /// Verify, parse and apply one webhook delivery.
    ///
    /// Authenticity failures and storage errors are returned. Payloads that
    /// are not actionable (unknown event types, unknown orders, malformed
    /// bodies) come back as [`WebhookOutcome::Ignored`].
    #[instrument(skip(self, request), fields(provider = %provider))]
    pub async fn handle_webhook(
        &self,
        provider: PaymentProvider,
        request: WebhookRequest<'_>,
    ) -> PaymentResult<WebhookOutcome> {
        let strategy = self.strategies.get(provider).ok_or_else(|| {
            PaymentError::Validation(format!("Payment method not available: {}", provider))
        })?;

        let event = match strategy.parse_completion_event(request).await {
            Ok(event) => event,
            Err(e) if e.is_unrecognized_event() => {
                warn!("Ignoring {} webhook: {}", provider, e);
                return Ok(WebhookOutcome::Ignored(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        if !event.verified {
            warn!(
                "Processing unverified {} webhook {} (no signing secret configured)",
                provider, event.event_id
            );
        }

        let completed = match &event.event_type {
            WebhookEventType::PaymentCompleted => true,
            WebhookEventType::PaymentFailed => false,
            WebhookEventType::Unknown(kind) => {
                info!("Acknowledging unhandled {} event: {}", provider, kind);
                return Ok(WebhookOutcome::Ignored(format!("unhandled event {}", kind)));
            }
        };

        let Some(selector) = event.selector.as_ref() else {
            warn!("{} event {} carries no order reference", provider, event.event_id);
            return Ok(WebhookOutcome::Ignored("no order reference".to_string()));
        };

        let transition = if completed {
            self.store
                .mark_completed(provider, selector, event.transaction_ref.as_deref())
                .await
        } else {
            self.store.mark_failed(provider, selector).await
        };

        match transition {
            Ok(transition) => {
                let outcome = WebhookOutcome::from_transition(transition, completed);
                match &outcome {
                    WebhookOutcome::Completed { order, applied: true } => info!(
                        "Order {} ({}) completed via {}",
                        order.id, order.order_number, provider
                    ),
                    WebhookOutcome::Failed { order, applied: true } => warn!(
                        "Order {} ({}) payment failed via {}",
                        order.id, order.order_number, provider
                    ),
                    _ => info!(
                        "Duplicate {} event {} for {}, no change",
                        provider, event.event_id, selector
                    ),
                }
                Ok(outcome)
            }
            Err(e @ PaymentError::OrderNotFound { .. }) => {
                warn!("{} event {} for unknown order {}", provider, event.event_id, selector);
                Ok(WebhookOutcome::Ignored(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Current state of an order for polling clients
    pub async fn order_status(&self, order_id: OrderId) -> PaymentResult<OrderSummary> {
        self.store.get_status(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderSelector, OrderStatus, PaymentStatus, ProviderReference, WebhookEvent};
    use crate::store::InMemoryOrderStore;
    use crate::test_support::{order_draft, FakeStrategy};

    fn event(
        provider: PaymentProvider,
        event_type: WebhookEventType,
        selector: Option<OrderSelector>,
    ) -> WebhookEvent {
        WebhookEvent {
            event_id: "evt_1".to_string(),
            event_type,
            provider,
            selector,
            transaction_ref: Some("pi_1".to_string()),
            verified: true,
        }
    }

    async fn setup(provider: PaymentProvider) -> (InMemoryOrderStore, Arc<FakeStrategy>, Reconciler, Order) {
        let store = InMemoryOrderStore::new();
        let order = store
            .create_order(order_draft("CR-00000001", provider))
            .await
            .unwrap();
        let reference = match provider {
            PaymentProvider::Stripe => ProviderReference::Stripe {
                session_id: "cs_1".to_string(),
                payment_intent_id: None,
            },
            PaymentProvider::Revolut => ProviderReference::Revolut {
                order_id: "rev_1".to_string(),
                public_id: None,
            },
        };
        let order = store.attach_provider_reference(order.id, reference).await.unwrap();

        let strategy = Arc::new(FakeStrategy::new(provider));
        let mut selector = PaymentStrategySelector::new();
        selector.register(strategy.clone());
        let reconciler = Reconciler::new(Arc::new(store.clone()), selector);
        (store, strategy, reconciler, order)
    }

    #[tokio::test]
    async fn test_completion_applied_once() {
        let (store, strategy, reconciler, order) = setup(PaymentProvider::Stripe).await;
        let completed = event(
            PaymentProvider::Stripe,
            WebhookEventType::PaymentCompleted,
            Some(OrderSelector::Id(order.id)),
        );
        strategy.push_event(Ok(completed.clone()));
        strategy.push_event(Ok(completed));

        let first = reconciler
            .handle_webhook(PaymentProvider::Stripe, WebhookRequest::new(b"{}"))
            .await
            .unwrap();
        let second = reconciler
            .handle_webhook(PaymentProvider::Stripe, WebhookRequest::new(b"{}"))
            .await
            .unwrap();

        assert!(matches!(first, WebhookOutcome::Completed { applied: true, .. }));
        assert!(matches!(second, WebhookOutcome::Completed { applied: false, .. }));

        let stored = store.get_order(order.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(stored.order_status, OrderStatus::Processing);
        assert_eq!(
            stored.provider_reference,
            Some(ProviderReference::Stripe {
                session_id: "cs_1".to_string(),
                payment_intent_id: Some("pi_1".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_revolut_completion_by_external_id() {
        let (store, strategy, reconciler, order) = setup(PaymentProvider::Revolut).await;
        strategy.push_event(Ok(event(
            PaymentProvider::Revolut,
            WebhookEventType::PaymentCompleted,
            Some(OrderSelector::RevolutOrder("rev_1".to_string())),
        )));

        reconciler
            .handle_webhook(PaymentProvider::Revolut, WebhookRequest::new(b"{}"))
            .await
            .unwrap();

        let summary = reconciler.order_status(order.id).await.unwrap();
        assert_eq!(summary.payment_status, PaymentStatus::Completed);
        assert!(store.get_order(order.id).await.unwrap().completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_then_completion() {
        let (store, strategy, reconciler, order) = setup(PaymentProvider::Stripe).await;
        let selector = Some(OrderSelector::StripeSession("cs_1".to_string()));
        strategy.push_event(Ok(event(
            PaymentProvider::Stripe,
            WebhookEventType::PaymentFailed,
            selector.clone(),
        )));
        strategy.push_event(Ok(event(
            PaymentProvider::Stripe,
            WebhookEventType::PaymentCompleted,
            selector,
        )));

        let failed = reconciler
            .handle_webhook(PaymentProvider::Stripe, WebhookRequest::new(b"{}"))
            .await
            .unwrap();
        assert!(matches!(failed, WebhookOutcome::Failed { applied: true, .. }));
        assert_eq!(
            store.get_order(order.id).await.unwrap().payment_status,
            PaymentStatus::Failed
        );

        reconciler
            .handle_webhook(PaymentProvider::Stripe, WebhookRequest::new(b"{}"))
            .await
            .unwrap();
        assert!(store.get_order(order.id).await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_authenticity_error_propagates() {
        let (store, strategy, reconciler, order) = setup(PaymentProvider::Stripe).await;
        strategy.push_event(Err(PaymentError::Authenticity("bad signature".to_string())));

        let err = reconciler
            .handle_webhook(PaymentProvider::Stripe, WebhookRequest::new(b"{}"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert_eq!(
            store.get_order(order.id).await.unwrap().payment_status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_unactionable_events_are_ignored() {
        let (_store, strategy, reconciler, _order) = setup(PaymentProvider::Stripe).await;
        strategy.push_event(Ok(event(
            PaymentProvider::Stripe,
            WebhookEventType::Unknown("customer.created".to_string()),
            None,
        )));
        strategy.push_event(Ok(event(
            PaymentProvider::Stripe,
            WebhookEventType::PaymentCompleted,
            Some(OrderSelector::StripeSession("cs_unknown".to_string())),
        )));
        strategy.push_event(Ok(event(
            PaymentProvider::Stripe,
            WebhookEventType::PaymentCompleted,
            None,
        )));

        for _ in 0..4 {
            let outcome = reconciler
                .handle_webhook(PaymentProvider::Stripe, WebhookRequest::new(b"{}"))
                .await
                .unwrap();
            assert!(matches!(outcome, WebhookOutcome::Ignored(_)));
        }
    }

    #[tokio::test]
    async fn test_event_from_other_provider_is_ignored() {
        let (store, _revolut, _, order) = setup(PaymentProvider::Revolut).await;
        let stripe = Arc::new(FakeStrategy::new(PaymentProvider::Stripe));
        stripe.push_event(Ok(event(
            PaymentProvider::Stripe,
            WebhookEventType::PaymentCompleted,
            Some(OrderSelector::Id(order.id)),
        )));
        let reconciler = Reconciler::new(
            Arc::new(store.clone()),
            PaymentStrategySelector::new().with_strategy(stripe),
        );

        let outcome = reconciler
            .handle_webhook(PaymentProvider::Stripe, WebhookRequest::new(b"{}"))
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored(_)));
        let stored = store.get_order(order.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(stored.order_status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let (_store, _strategy, reconciler, _order) = setup(PaymentProvider::Stripe).await;
        let err = reconciler
            .handle_webhook(PaymentProvider::Revolut, WebhookRequest::new(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_complete_once() {
        let (store, strategy, reconciler, order) = setup(PaymentProvider::Stripe).await;
        for _ in 0..20 {
            strategy.push_event(Ok(event(
                PaymentProvider::Stripe,
                WebhookEventType::PaymentCompleted,
                Some(OrderSelector::Id(order.id)),
            )));
        }

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let reconciler = reconciler.clone();
                tokio::spawn(async move {
                    reconciler
                        .handle_webhook(PaymentProvider::Stripe, WebhookRequest::new(b"{}"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if let WebhookOutcome::Completed { applied: true, .. } = handle.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert!(store.get_order(order.id).await.unwrap().is_completed());
    }
}
