//! # cosmic-core
//!
//! Core types and traits for the cosmic-checkout payment service.
//!
//! This crate provides:
//! - `PaymentStrategy` trait for implementing payment providers
//! - `Package` and `PackageCatalog` for the product catalog
//! - `Order`, `OrderDraft` and the payment/order status model
//! - `OrderStore` with in-memory and (feature `postgres`) Postgres backends
//! - `CheckoutOrchestrator` and `Reconciler` for the checkout and webhook flows
//! - `PaymentError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use cosmic_core::{CheckoutOrchestrator, CheckoutUrls, InMemoryOrderStore, PaymentStrategySelector};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryOrderStore::new());
//! let strategies = PaymentStrategySelector::new().with_strategy(Arc::new(stripe));
//! let orchestrator = CheckoutOrchestrator::new(store, strategies, CheckoutUrls::new(app_url));
//!
//! // Persist a pending order and create the hosted checkout
//! let outcome = orchestrator.checkout(&request, None).await?;
//!
//! // Redirect user to outcome.session.checkout_url
//! ```

pub mod checkout;
pub mod error;
pub mod order;
pub mod package;
pub mod reconcile;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use checkout::{
    CheckoutOrchestrator, CheckoutOutcome, CheckoutRequest, PackageRequest, ValidatedCheckout,
};
pub use error::{PaymentError, PaymentResult};
pub use order::{
    BirthDetails, CheckoutSession, CustomerDetails, Order, OrderDraft, OrderId,
    OrderNumberGenerator, OrderSelector, OrderStatus, OrderSummary, PaymentProvider,
    PaymentStatus, ProviderReference, WebhookEvent, WebhookEventType, WebhookRequest,
};
pub use package::{to_minor_units, Package, PackageCatalog, PackageDraft, CURRENCY};
pub use reconcile::{Reconciler, WebhookOutcome};
pub use store::{InMemoryOrderStore, OrderStore, Transition};
#[cfg(feature = "postgres")]
pub use store::PostgresOrderStore;
pub use strategy::{
    BoxedPaymentStrategy, CheckoutUrls, PaymentStrategy, PaymentStrategySelector,
};
