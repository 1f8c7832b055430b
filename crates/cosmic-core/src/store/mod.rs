//! # Order Store
//!
//! The single source of truth for orders and the package catalog.
//!
//! Implementations must make `attach_provider_reference`, `mark_completed`
//! and `mark_failed` atomic per order, and must serialize package creation
//! on the package name so concurrent first orders share one row.

use crate::error::PaymentResult;
use crate::order::{
    Order, OrderDraft, OrderId, OrderSelector, OrderSummary, PaymentProvider, ProviderReference,
};
use crate::package::{Package, PackageDraft};
use async_trait::async_trait;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryOrderStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresOrderStore;

/// Result of an idempotent state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The order changed state
    Applied(Order),
    /// The order was already past this transition; nothing was written
    Unchanged(Order),
}

impl Transition {
    pub fn order(&self) -> &Order {
        match self {
            Transition::Applied(order) | Transition::Unchanged(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Transition::Applied(order) | Transition::Unchanged(order) => order,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a package, or replace price/description/features of the
    /// package with the same name (catalog re-seeding).
    async fn upsert_package(&self, draft: &PackageDraft) -> PaymentResult<Package>;

    /// Return the package named `draft.name`, inserting it from `draft`
    /// if it does not exist. A concurrent loser reads back the winner's row.
    async fn get_or_create_package(&self, draft: &PackageDraft) -> PaymentResult<Package>;

    /// Persist a new order in (pending, pending).
    ///
    /// Fails with `Validation` for a malformed draft and with
    /// `OrderNumberTaken` if the order number is already used.
    async fn create_order(&self, draft: OrderDraft) -> PaymentResult<Order>;

    /// Store provider correlation ids. Fails with `OrderNotFound`.
    async fn attach_provider_reference(
        &self,
        order_id: OrderId,
        reference: ProviderReference,
    ) -> PaymentResult<Order>;

    /// Mark the selected order paid. Idempotent: an already completed
    /// order is returned as `Transition::Unchanged` and `completed_at`
    /// keeps its first value.
    ///
    /// Only orders placed with `provider` match; an order paid through the
    /// other provider is reported as `OrderNotFound`.
    async fn mark_completed(
        &self,
        provider: PaymentProvider,
        selector: &OrderSelector,
        transaction_ref: Option<&str>,
    ) -> PaymentResult<Transition>;

    /// Mark the selected order's payment failed, if it is still pending.
    /// Matches like `mark_completed`.
    async fn mark_failed(
        &self,
        provider: PaymentProvider,
        selector: &OrderSelector,
    ) -> PaymentResult<Transition>;

    async fn get_order(&self, order_id: OrderId) -> PaymentResult<Order>;

    /// Read-only projection for polling clients
    async fn get_status(&self, order_id: OrderId) -> PaymentResult<OrderSummary> {
        Ok(self.get_order(order_id).await?.summary())
    }
}
