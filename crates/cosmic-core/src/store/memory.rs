use super::{OrderStore, Transition};
use crate::error::{PaymentError, PaymentResult};
use crate::order::{Order, OrderDraft, OrderId, OrderSelector, PaymentProvider, ProviderReference};
use crate::package::{Package, PackageDraft};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    last_package_id: i64,
    last_order_id: OrderId,
    /// Keyed by package name (the unique constraint)
    packages: HashMap<String, Package>,
    orders: BTreeMap<OrderId, Order>,
    order_numbers: HashSet<String>,
}

impl Tables {
    fn find_mut(
        &mut self,
        provider: PaymentProvider,
        selector: &OrderSelector,
    ) -> Option<&mut Order> {
        let order = match selector {
            OrderSelector::Id(id) => self.orders.get_mut(id),
            other => self.orders.values_mut().find(|order| other.matches(order)),
        };
        order.filter(|order| order.provider == provider)
    }

    fn insert_package(&mut self, draft: &PackageDraft) -> Package {
        self.last_package_id += 1;
        let package = Package {
            id: self.last_package_id,
            name: draft.name.clone(),
            slug: draft.slug(),
            description: draft.description.clone(),
            price: draft.price,
            features: draft.features.clone(),
            created_at: Utc::now(),
        };
        self.packages.insert(package.name.clone(), package.clone());
        package
    }
}

/// A thread-safe in-memory order store.
///
/// All tables sit behind one `RwLock`, so every mutation is atomic and
/// package creation is serialized. Used for tests and single-process
/// deployments without a database.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn package_count(&self) -> usize {
        self.tables.read().await.packages.len()
    }

    /// Snapshot of every stored order, oldest first
    pub async fn orders(&self) -> Vec<Order> {
        self.tables.read().await.orders.values().cloned().collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn upsert_package(&self, draft: &PackageDraft) -> PaymentResult<Package> {
        draft.validate()?;
        let mut tables = self.tables.write().await;

        match tables.packages.get_mut(&draft.name) {
            Some(existing) => {
                existing.price = draft.price;
                existing.description = draft.description.clone();
                existing.features = draft.features.clone();
                existing.slug = draft.slug();
                Ok(existing.clone())
            }
            None => Ok(tables.insert_package(draft)),
        }
    }

    async fn get_or_create_package(&self, draft: &PackageDraft) -> PaymentResult<Package> {
        draft.validate()?;

        if let Some(existing) = self.tables.read().await.packages.get(&draft.name) {
            return Ok(existing.clone());
        }

        // Re-check under the write lock: another first order may have won
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.packages.get(&draft.name) {
            debug!("Package '{}' created concurrently, reusing it", draft.name);
            return Ok(existing.clone());
        }
        Ok(tables.insert_package(draft))
    }

    async fn create_order(&self, draft: OrderDraft) -> PaymentResult<Order> {
        draft.validate()?;
        let mut tables = self.tables.write().await;

        if tables.order_numbers.contains(&draft.order_number) {
            return Err(PaymentError::OrderNumberTaken {
                order_number: draft.order_number,
            });
        }

        tables.last_order_id += 1;
        let order = Order::pending(tables.last_order_id, draft, Utc::now());
        tables.order_numbers.insert(order.order_number.clone());
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn attach_provider_reference(
        &self,
        order_id: OrderId,
        reference: ProviderReference,
    ) -> PaymentResult<Order> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| PaymentError::not_found(order_id))?;

        order.attach_reference(reference, Utc::now())?;
        Ok(order.clone())
    }

    async fn mark_completed(
        &self,
        provider: PaymentProvider,
        selector: &OrderSelector,
        transaction_ref: Option<&str>,
    ) -> PaymentResult<Transition> {
        let mut tables = self.tables.write().await;
        let order = tables
            .find_mut(provider, selector)
            .ok_or_else(|| PaymentError::not_found(selector))?;

        if order.complete(transaction_ref, Utc::now()) {
            Ok(Transition::Applied(order.clone()))
        } else {
            Ok(Transition::Unchanged(order.clone()))
        }
    }

    async fn mark_failed(
        &self,
        provider: PaymentProvider,
        selector: &OrderSelector,
    ) -> PaymentResult<Transition> {
        let mut tables = self.tables.write().await;
        let order = tables
            .find_mut(provider, selector)
            .ok_or_else(|| PaymentError::not_found(selector))?;

        if order.fail(Utc::now()) {
            Ok(Transition::Applied(order.clone()))
        } else {
            Ok(Transition::Unchanged(order.clone()))
        }
    }

    async fn get_order(&self, order_id: OrderId) -> PaymentResult<Order> {
        self.tables
            .read()
            .await
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| PaymentError::not_found(order_id))
    }
}
