//! # Checkout Orchestrator
//!
//! `validate → get_or_create_package → create_order(pending) →
//! create_checkout → attach_provider_reference → respond`.
//!
//! A failure after the order row exists leaves it pending with no provider
//! reference. Such orphans are logged and left in place, never deleted.

use crate::error::{PaymentError, PaymentResult};
use crate::order::{
    BirthDetails, CheckoutSession, CustomerDetails, Order, OrderDraft, OrderNumberGenerator,
    PaymentProvider, DEFAULT_BIRTH_TIME, DEFAULT_PAYMENT_METHOD,
};
use crate::package::PackageDraft;
use crate::store::OrderStore;
use crate::strategy::{CheckoutUrls, PaymentStrategySelector};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Attempts at finding a free order number before giving up
const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Package as sent by the storefront
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Checkout request body, exactly as the storefront posts it.
///
/// Birth components arrive as numbers or numeric strings depending on the
/// form, so they are kept as raw JSON until validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birth_day: Option<Value>,
    #[serde(default)]
    pub birth_month: Option<Value>,
    #[serde(default)]
    pub birth_year: Option<Value>,
    #[serde(default)]
    pub birth_time: Option<String>,
    #[serde(default)]
    pub birth_place: Option<String>,
    #[serde(default)]
    pub package: Option<PackageRequest>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub terms_accepted: Option<bool>,
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCheckout {
    pub customer: CustomerDetails,
    pub package: PackageDraft,
    pub terms_accepted: bool,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Truthy numeric field: a positive integer or a numeric string
fn numeric_field(field: &str, value: &Option<Value>) -> PaymentResult<Option<u64>> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(0) => Ok(None),
        Some(n) => Ok(Some(n)),
        None => Err(PaymentError::Validation(format!(
            "{} must be numeric",
            field
        ))),
    }
}

fn narrow<T: TryFrom<u64>>(field: &str, value: u64) -> PaymentResult<T> {
    T::try_from(value)
        .map_err(|_| PaymentError::Validation(format!("{} is out of range: {}", field, value)))
}

impl CheckoutRequest {
    /// The provider the client asked for, if it named one
    pub fn declared_provider(&self) -> PaymentResult<Option<PaymentProvider>> {
        present(&self.payment_method)
            .map(PaymentProvider::parse)
            .transpose()
    }

    /// Check required fields and shape the request into domain values.
    ///
    /// Every missing field is listed in one error.
    pub fn validate(&self) -> PaymentResult<ValidatedCheckout> {
        let day = numeric_field("birthDay", &self.birth_day)?;
        let month = numeric_field("birthMonth", &self.birth_month)?;
        let year = numeric_field("birthYear", &self.birth_year)?;
        let package_name = self.package.as_ref().and_then(|p| present(&p.name));
        let package_price = self.package.as_ref().and_then(|p| p.price);

        let mut missing = Vec::new();
        if present(&self.name).is_none() {
            missing.push("name");
        }
        if present(&self.email).is_none() {
            missing.push("email");
        }
        if day.is_none() {
            missing.push("birthDay");
        }
        if month.is_none() {
            missing.push("birthMonth");
        }
        if year.is_none() {
            missing.push("birthYear");
        }
        if present(&self.birth_place).is_none() {
            missing.push("birthPlace");
        }
        if self.package.is_none() {
            missing.push("package");
        } else {
            if package_name.is_none() {
                missing.push("package.name");
            }
            if package_price.is_none() {
                missing.push("package.price");
            }
        }

        if !missing.is_empty() {
            return Err(PaymentError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        if self.terms_accepted == Some(false) {
            return Err(PaymentError::Validation(
                "Terms and conditions must be accepted".to_string(),
            ));
        }

        let customer = CustomerDetails {
            name: present(&self.name).unwrap_or_default().to_string(),
            email: present(&self.email).unwrap_or_default().to_string(),
            birth: BirthDetails {
                day: narrow("birthDay", day.unwrap_or_default())?,
                month: narrow("birthMonth", month.unwrap_or_default())?,
                year: narrow("birthYear", year.unwrap_or_default())?,
                time: present(&self.birth_time)
                    .unwrap_or(DEFAULT_BIRTH_TIME)
                    .to_string(),
                place: present(&self.birth_place).unwrap_or_default().to_string(),
            },
        };
        customer.validate()?;

        let description = self
            .package
            .as_ref()
            .and_then(|p| present(&p.description))
            .unwrap_or_default();
        let package = PackageDraft::new(
            package_name.unwrap_or_default(),
            package_price.unwrap_or_default(),
        )
        .with_description(description);
        package.validate()?;

        Ok(ValidatedCheckout {
            customer,
            package,
            terms_accepted: true,
        })
    }
}

/// Successful checkout: the order and where to send the customer
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub session: CheckoutSession,
}

/// Runs the checkout flow against a store and the configured providers
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    store: Arc<dyn OrderStore>,
    strategies: PaymentStrategySelector,
    urls: CheckoutUrls,
    order_numbers: Arc<OrderNumberGenerator>,
}

impl CheckoutOrchestrator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        strategies: PaymentStrategySelector,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            store,
            strategies,
            urls,
            order_numbers: Arc::new(OrderNumberGenerator::new()),
        }
    }

    /// Providers checkout can be started with
    pub fn providers(&self) -> Vec<PaymentProvider> {
        self.strategies.providers()
    }

    /// Work out which provider handles the request.
    ///
    /// `route_provider` is set by provider-specific endpoints; a declared
    /// `paymentMethod` must then agree with it.
    pub fn resolve_provider(
        &self,
        request: &CheckoutRequest,
        route_provider: Option<PaymentProvider>,
    ) -> PaymentResult<PaymentProvider> {
        let declared = request.declared_provider()?;

        let provider = match (route_provider, declared) {
            (Some(route), Some(declared)) if route != declared => {
                return Err(PaymentError::Validation(format!(
                    "paymentMethod '{}' does not match the {} checkout endpoint",
                    declared, route
                )))
            }
            (Some(route), _) => route,
            (None, Some(declared)) => declared,
            (None, None) => {
                return Err(PaymentError::Validation(
                    "Missing required fields: paymentMethod".to_string(),
                ))
            }
        };

        if !self.strategies.has_provider(provider) {
            return Err(PaymentError::Validation(format!(
                "Payment method not available: {}",
                provider
            )));
        }
        Ok(provider)
    }

    #[instrument(skip(self, request))]
    pub async fn checkout(
        &self,
        request: &CheckoutRequest,
        route_provider: Option<PaymentProvider>,
    ) -> PaymentResult<CheckoutOutcome> {
        let checkout = request.validate()?;
        let provider = self.resolve_provider(request, route_provider)?;
        let strategy = self
            .strategies
            .get(provider)
            .ok_or_else(|| PaymentError::Configuration(format!("{} not configured", provider)))?;

        let package = self.store.get_or_create_package(&checkout.package).await?;
        if package.price != checkout.package.price {
            warn!(
                "Request price {} for '{}' differs from catalog price {}, using catalog price",
                checkout.package.price, package.name, package.price
            );
        }

        let order = self
            .create_pending_order(OrderDraft {
                order_number: String::new(),
                customer: checkout.customer,
                package_id: package.id,
                package_name: package.name.clone(),
                package_price: package.price,
                provider,
                payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
                terms_accepted: checkout.terms_accepted,
            })
            .await?;

        info!(
            "Created pending order: id={}, number={}, package={}, provider={}",
            order.id, order.order_number, order.package_name, provider
        );

        let session = strategy
            .create_checkout(&order, &self.urls)
            .await
            .map_err(|e| {
                error!(
                    "Checkout creation failed, order {} left pending without provider reference: {}",
                    order.id, e
                );
                e
            })?;

        let order = self
            .store
            .attach_provider_reference(order.id, session.reference())
            .await
            .map_err(|e| {
                error!(
                    "Failed to attach {} reference {} to order {}: {}",
                    provider, session.external_id, order.id, e
                );
                e
            })?;

        info!(
            "Checkout ready: order={}, provider={}, external_id={}",
            order.id, provider, session.external_id
        );

        Ok(CheckoutOutcome { order, session })
    }

    async fn create_pending_order(&self, mut draft: OrderDraft) -> PaymentResult<Order> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            draft.order_number = self.order_numbers.next();

            match self.store.create_order(draft.clone()).await {
                Err(PaymentError::OrderNumberTaken { order_number })
                    if attempt < ORDER_NUMBER_ATTEMPTS =>
                {
                    warn!("Order number {} already taken, retrying", order_number);
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderStatus, PaymentStatus, ProviderReference};
    use crate::store::InMemoryOrderStore;
    use crate::test_support::FakeStrategy;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    fn request(value: Value) -> CheckoutRequest {
        serde_json::from_value(value).unwrap()
    }

    fn ana(method: &str) -> CheckoutRequest {
        request(json!({
            "name": "Ana",
            "email": "ana@x.com",
            "birthDay": 5,
            "birthMonth": 9,
            "birthYear": 1990,
            "birthPlace": "Porto",
            "package": { "name": "Soul Blueprint", "price": 147 },
            "paymentMethod": method
        }))
    }

    fn orchestrator(
        store: &InMemoryOrderStore,
        strategies: Vec<Arc<FakeStrategy>>,
    ) -> CheckoutOrchestrator {
        let mut selector = PaymentStrategySelector::new();
        for strategy in strategies {
            selector.register(strategy);
        }
        CheckoutOrchestrator::new(
            Arc::new(store.clone()),
            selector,
            CheckoutUrls::new("https://cosmicblueprint.app"),
        )
    }

    #[test]
    fn test_validate_accepts_strings_and_defaults_birth_time() {
        let checkout = request(json!({
            "name": "Ana",
            "email": "ana@x.com",
            "birthDay": "5",
            "birthMonth": "9",
            "birthYear": "1990",
            "birthPlace": "Porto",
            "package": { "name": "Soul Blueprint", "price": "147" }
        }))
        .validate()
        .unwrap();

        assert_eq!(checkout.customer.birth.day, 5);
        assert_eq!(checkout.customer.birth.time, DEFAULT_BIRTH_TIME);
        assert_eq!(checkout.package.price, dec!(147));
        assert!(checkout.terms_accepted);
    }

    #[test]
    fn test_validate_lists_missing_fields() {
        let err = request(json!({
            "name": "Ana",
            "email": "",
            "birthDay": 5,
            "birthMonth": 9,
            "birthPlace": "Porto",
            "package": { "name": "Soul Blueprint" }
        }))
        .validate()
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Missing required fields: email, birthYear, package.price"
        );
    }

    #[test]
    fn test_validate_rejects_non_numeric_birth_day() {
        let mut req = ana("stripe");
        req.birth_day = Some(json!("fifth"));
        assert!(matches!(req.validate(), Err(PaymentError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_declined_terms() {
        let mut req = ana("stripe");
        req.terms_accepted = Some(false);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_resolve_provider() {
        let store = InMemoryOrderStore::new();
        let orchestrator = orchestrator(
            &store,
            vec![Arc::new(FakeStrategy::new(PaymentProvider::Stripe))],
        );

        assert_eq!(
            orchestrator.resolve_provider(&ana("stripe"), None).unwrap(),
            PaymentProvider::Stripe
        );
        assert!(orchestrator
            .resolve_provider(&ana("bitcoin"), None)
            .is_err());
        assert!(orchestrator
            .resolve_provider(&ana("revolut"), Some(PaymentProvider::Stripe))
            .is_err());
        // Known but not configured
        assert!(orchestrator
            .resolve_provider(&ana("revolut"), None)
            .is_err());
    }

    #[tokio::test]
    async fn test_checkout_happy_path() {
        let store = InMemoryOrderStore::new();
        let strategy = Arc::new(FakeStrategy::new(PaymentProvider::Stripe));
        let orchestrator = orchestrator(&store, vec![strategy.clone()]);

        let outcome = orchestrator.checkout(&ana("stripe"), None).await.unwrap();

        assert!(outcome.order.order_number.starts_with("CR-"));
        assert_eq!(outcome.order.payment_status, PaymentStatus::Pending);
        assert_eq!(outcome.order.order_status, OrderStatus::Pending);
        assert_eq!(
            outcome.order.provider_reference,
            Some(ProviderReference::Stripe {
                session_id: format!("ext_{}", outcome.order.id),
                payment_intent_id: None,
            })
        );
        assert_eq!(strategy.checkout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_persists_nothing() {
        let store = InMemoryOrderStore::new();
        let strategy = Arc::new(FakeStrategy::new(PaymentProvider::Stripe));
        let orchestrator = orchestrator(&store, vec![strategy.clone()]);

        let mut req = ana("stripe");
        req.birth_year = None;
        let err = orchestrator.checkout(&req, None).await.unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.package_count().await, 0);
        assert_eq!(strategy.checkout_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_orphan() {
        let store = InMemoryOrderStore::new();
        let orchestrator = orchestrator(
            &store,
            vec![Arc::new(FakeStrategy::failing(PaymentProvider::Revolut))],
        );

        let err = orchestrator.checkout(&ana("revolut"), None).await.unwrap_err();
        assert!(matches!(err, PaymentError::Provider { .. }));
        assert_eq!(err.status_code(), 500);

        let orders = store.orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].payment_status, PaymentStatus::Pending);
        assert!(orders[0].provider_reference.is_none());
    }

    #[tokio::test]
    async fn test_catalog_price_is_authoritative() {
        let store = InMemoryOrderStore::new();
        store
            .upsert_package(&PackageDraft::new("Soul Blueprint", dec!(147)))
            .await
            .unwrap();
        let orchestrator = orchestrator(
            &store,
            vec![Arc::new(FakeStrategy::new(PaymentProvider::Stripe))],
        );

        let mut req = ana("stripe");
        req.package = Some(PackageRequest {
            name: Some("Soul Blueprint".to_string()),
            price: Some(dec!(1)),
            description: None,
        });
        let outcome = orchestrator.checkout(&req, None).await.unwrap();

        assert_eq!(outcome.order.package_price, dec!(147));
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_get_unique_order_numbers() {
        let store = InMemoryOrderStore::new();
        let orchestrator = orchestrator(
            &store,
            vec![Arc::new(FakeStrategy::new(PaymentProvider::Stripe))],
        );

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator
                        .checkout(&ana("stripe"), None)
                        .await
                        .unwrap()
                        .order
                        .order_number
                })
            })
            .collect();

        let mut numbers = HashSet::new();
        for handle in handles {
            assert!(numbers.insert(handle.await.unwrap()));
        }
        assert_eq!(store.order_count().await, 50);
        assert_eq!(store.package_count().await, 1);
    }
}
