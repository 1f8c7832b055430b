//! Postgres-backed order store.
//!
//! Unique constraints on `packages.name` and `orders.order_number` are the
//! serialization points; payment transitions are single conditional
//! `UPDATE ... RETURNING` statements.

use super::{OrderStore, Transition};
use crate::error::{PaymentError, PaymentResult};
use crate::order::{
    BirthDetails, CustomerDetails, Order, OrderDraft, OrderId, OrderSelector, OrderStatus,
    PaymentProvider, PaymentStatus, ProviderReference,
};
use crate::package::{Package, PackageDraft};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info};

const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";

/// Matches an order by whichever of id / session id / revolut order id is
/// bound, restricted to the provider in `$4` when one is bound
const SELECTOR_CLAUSE: &str = "(($1::BIGINT IS NOT NULL AND id = $1)
    OR ($2::TEXT IS NOT NULL AND stripe_session_id = $2)
    OR ($3::TEXT IS NOT NULL AND revolut_order_id = $3))
    AND ($4::TEXT IS NULL OR payment_provider = $4)";

impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        PaymentError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for PaymentError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        PaymentError::Storage(format!("Migration failed: {}", err))
    }
}

#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date
    pub async fn connect(database_url: &str) -> PaymentResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> PaymentResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Order store migrations applied");
        Ok(())
    }

    async fn find(
        &self,
        provider: Option<PaymentProvider>,
        selector: &OrderSelector,
    ) -> PaymentResult<Option<Order>> {
        let (id, session_id, revolut_id) = selector_binds(selector);
        let sql = format!("SELECT * FROM orders WHERE {}", SELECTOR_CLAUSE);

        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(session_id)
            .bind(revolut_id)
            .bind(provider.map(|p| p.as_str()))
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    /// Result of a conditional update that matched no row
    async fn unchanged(
        &self,
        provider: PaymentProvider,
        selector: &OrderSelector,
    ) -> PaymentResult<Transition> {
        self.find(Some(provider), selector)
            .await?
            .map(Transition::Unchanged)
            .ok_or_else(|| PaymentError::not_found(selector))
    }
}

fn selector_binds(selector: &OrderSelector) -> (Option<i64>, Option<&str>, Option<&str>) {
    match selector {
        OrderSelector::Id(id) => (Some(*id), None, None),
        OrderSelector::StripeSession(session_id) => (None, Some(session_id.as_str()), None),
        OrderSelector::RevolutOrder(order_id) => (None, None, Some(order_id.as_str())),
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn upsert_package(&self, draft: &PackageDraft) -> PaymentResult<Package> {
        draft.validate()?;

        let row = sqlx::query_as::<_, PackageRow>(
            r#"
            INSERT INTO packages (name, slug, description, price, features)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE SET
                slug = EXCLUDED.slug,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                features = EXCLUDED.features
            RETURNING *
            "#,
        )
        .bind(&draft.name)
        .bind(draft.slug())
        .bind(&draft.description)
        .bind(draft.price)
        .bind(Json(&draft.features))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_or_create_package(&self, draft: &PackageDraft) -> PaymentResult<Package> {
        draft.validate()?;

        let inserted = sqlx::query_as::<_, PackageRow>(
            r#"
            INSERT INTO packages (name, slug, description, price, features)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&draft.name)
        .bind(draft.slug())
        .bind(&draft.description)
        .bind(draft.price)
        .bind(Json(&draft.features))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        debug!("Package '{}' already exists, reading it back", draft.name);
        let row = sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE name = $1")
            .bind(&draft.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn create_order(&self, draft: OrderDraft) -> PaymentResult<Order> {
        draft.validate()?;

        let result = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO orders (
                order_number, customer_name, customer_email,
                birth_day, birth_month, birth_year, birth_time, birth_place,
                package_id, package_name, package_price,
                payment_provider, payment_method, payment_status, order_status, terms_accepted
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending', 'pending', $14)
            RETURNING *
            "#,
        )
        .bind(&draft.order_number)
        .bind(&draft.customer.name)
        .bind(&draft.customer.email)
        .bind(i16::from(draft.customer.birth.day))
        .bind(i16::from(draft.customer.birth.month))
        .bind(draft.customer.birth.year as i16)
        .bind(&draft.customer.birth.time)
        .bind(&draft.customer.birth.place)
        .bind(draft.package_id)
        .bind(&draft.package_name)
        .bind(draft.package_price)
        .bind(draft.provider.as_str())
        .bind(&draft.payment_method)
        .bind(draft.terms_accepted)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Order::try_from(row),
            Err(sqlx::Error::Database(db))
                if db.is_unique_violation() && db.constraint() == Some(ORDER_NUMBER_CONSTRAINT) =>
            {
                Err(PaymentError::OrderNumberTaken {
                    order_number: draft.order_number,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn attach_provider_reference(
        &self,
        order_id: OrderId,
        reference: ProviderReference,
    ) -> PaymentResult<Order> {
        let mut order = self.get_order(order_id).await?;
        order.attach_reference(reference.clone(), Utc::now())?;

        let (stripe_session, revolut_order, revolut_public) = match &reference {
            ProviderReference::Stripe { session_id, .. } => (Some(session_id.as_str()), None, None),
            ProviderReference::Revolut {
                order_id,
                public_id,
            } => (None, Some(order_id.as_str()), public_id.as_deref()),
        };

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            UPDATE orders SET
                stripe_session_id = COALESCE($2, stripe_session_id),
                revolut_order_id = COALESCE($3, revolut_order_id),
                revolut_public_id = COALESCE($4, revolut_public_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(stripe_session)
        .bind(revolut_order)
        .bind(revolut_public)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PaymentError::not_found(order_id))?;

        Order::try_from(row)
    }

    async fn mark_completed(
        &self,
        provider: PaymentProvider,
        selector: &OrderSelector,
        transaction_ref: Option<&str>,
    ) -> PaymentResult<Transition> {
        let (id, session_id, revolut_id) = selector_binds(selector);
        let sql = format!(
            r#"
            UPDATE orders SET
                payment_status = 'completed',
                order_status = CASE WHEN order_status = 'pending' THEN 'processing' ELSE order_status END,
                completed_at = COALESCE(completed_at, NOW()),
                stripe_payment_intent_id = CASE
                    WHEN payment_provider = 'stripe' THEN COALESCE(stripe_payment_intent_id, $5)
                    ELSE stripe_payment_intent_id
                END,
                updated_at = NOW()
            WHERE {} AND payment_status <> 'completed'
            RETURNING *
            "#,
            SELECTOR_CLAUSE
        );

        let updated = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(session_id)
            .bind(revolut_id)
            .bind(provider.as_str())
            .bind(transaction_ref)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => Ok(Transition::Applied(Order::try_from(row)?)),
            None => self.unchanged(provider, selector).await,
        }
    }

    async fn mark_failed(
        &self,
        provider: PaymentProvider,
        selector: &OrderSelector,
    ) -> PaymentResult<Transition> {
        let (id, session_id, revolut_id) = selector_binds(selector);
        let sql = format!(
            r#"
            UPDATE orders SET payment_status = 'failed', updated_at = NOW()
            WHERE {} AND payment_status = 'pending'
            RETURNING *
            "#,
            SELECTOR_CLAUSE
        );

        let updated = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(session_id)
            .bind(revolut_id)
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => Ok(Transition::Applied(Order::try_from(row)?)),
            None => self.unchanged(provider, selector).await,
        }
    }

    async fn get_order(&self, order_id: OrderId) -> PaymentResult<Order> {
        self.find(None, &OrderSelector::Id(order_id))
            .await?
            .ok_or_else(|| PaymentError::not_found(order_id))
    }
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct PackageRow {
    id: i64,
    name: String,
    slug: String,
    description: String,
    price: Decimal,
    features: Json<Vec<String>>,
    created_at: DateTime<Utc>,
}

impl From<PackageRow> for Package {
    fn from(row: PackageRow) -> Self {
        Package {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            price: row.price,
            features: row.features.0,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    order_number: String,
    customer_name: String,
    customer_email: String,
    birth_day: i16,
    birth_month: i16,
    birth_year: i16,
    birth_time: String,
    birth_place: String,
    package_id: i64,
    package_name: String,
    package_price: Decimal,
    payment_provider: String,
    payment_method: String,
    stripe_session_id: Option<String>,
    stripe_payment_intent_id: Option<String>,
    revolut_order_id: Option<String>,
    revolut_public_id: Option<String>,
    payment_status: String,
    order_status: String,
    terms_accepted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

fn column_out_of_range(column: &str, value: i16) -> PaymentError {
    PaymentError::Serialization(format!("{} out of range: {}", column, value))
}

impl TryFrom<OrderRow> for Order {
    type Error = PaymentError;

    fn try_from(row: OrderRow) -> PaymentResult<Self> {
        let provider = PaymentProvider::parse(&row.payment_provider)
            .map_err(|e| PaymentError::Serialization(e.to_string()))?;

        let provider_reference = match provider {
            PaymentProvider::Stripe => row.stripe_session_id.map(|session_id| {
                ProviderReference::Stripe {
                    session_id,
                    payment_intent_id: row.stripe_payment_intent_id,
                }
            }),
            PaymentProvider::Revolut => {
                row.revolut_order_id
                    .map(|order_id| ProviderReference::Revolut {
                        order_id,
                        public_id: row.revolut_public_id,
                    })
            }
        };

        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            customer: CustomerDetails {
                name: row.customer_name,
                email: row.customer_email,
                birth: BirthDetails {
                    day: u8::try_from(row.birth_day)
                        .map_err(|_| column_out_of_range("birth_day", row.birth_day))?,
                    month: u8::try_from(row.birth_month)
                        .map_err(|_| column_out_of_range("birth_month", row.birth_month))?,
                    year: u16::try_from(row.birth_year)
                        .map_err(|_| column_out_of_range("birth_year", row.birth_year))?,
                    time: row.birth_time,
                    place: row.birth_place,
                },
            },
            package_id: row.package_id,
            package_name: row.package_name,
            package_price: row.package_price,
            provider,
            payment_method: row.payment_method,
            provider_reference,
            payment_status: PaymentStatus::parse(&row.payment_status)?,
            order_status: OrderStatus::parse(&row.order_status)?,
            terms_accepted: row.terms_accepted,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}
