//! # Order Types
//!
//! Orders, their payment state and the provider-facing checkout/webhook types.

use crate::error::{PaymentError, PaymentResult};
use chrono::{DateTime, Datelike, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// System-assigned order identity
pub type OrderId = i64;

/// Birth time stored when the customer leaves it blank
pub const DEFAULT_BIRTH_TIME: &str = "00:00";

/// Payment method recorded on orders (both providers take cards)
pub const DEFAULT_PAYMENT_METHOD: &str = "card";

/// Payment provider that collects the money for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    /// Hosted card checkout sessions
    Stripe,
    /// Hosted merchant orders
    Revolut,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Revolut => "revolut",
        }
    }

    /// Parse a client-declared `paymentMethod`
    pub fn parse(method: &str) -> PaymentResult<Self> {
        match method.trim().to_lowercase().as_str() {
            "stripe" => Ok(PaymentProvider::Stripe),
            "revolut" => Ok(PaymentProvider::Revolut),
            other => Err(PaymentError::Validation(format!(
                "Unsupported payment method: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> PaymentResult<Self> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(PaymentError::Serialization(format!(
                "Unknown payment status: {}",
                other
            ))),
        }
    }
}

/// Fulfilment state of an order. Variants are declared in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> PaymentResult<Self> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "fulfilled" => Ok(OrderStatus::Fulfilled),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(PaymentError::Serialization(format!(
                "Unknown order status: {}",
                other
            ))),
        }
    }

    /// Advance to `target` unless that would move the order backwards
    pub fn advance_to(self, target: OrderStatus) -> OrderStatus {
        self.max(target)
    }
}

/// Birth data the reading is computed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthDetails {
    pub day: u8,
    pub month: u8,
    pub year: u16,
    /// `HH:MM`, [`DEFAULT_BIRTH_TIME`] when unknown
    pub time: String,
    pub place: String,
}

impl BirthDetails {
    pub fn validate(&self) -> PaymentResult<()> {
        if !(1..=31).contains(&self.day) {
            return Err(PaymentError::Validation(format!(
                "birthDay must be between 1 and 31, got {}",
                self.day
            )));
        }
        if !(1..=12).contains(&self.month) {
            return Err(PaymentError::Validation(format!(
                "birthMonth must be between 1 and 12, got {}",
                self.month
            )));
        }
        let current_year = Utc::now().year();
        if i32::from(self.year) < 1900 || i32::from(self.year) > current_year {
            return Err(PaymentError::Validation(format!(
                "birthYear must be between 1900 and {}, got {}",
                current_year, self.year
            )));
        }
        if NaiveTime::parse_from_str(&self.time, "%H:%M").is_err()
            && NaiveTime::parse_from_str(&self.time, "%H:%M:%S").is_err()
        {
            return Err(PaymentError::Validation(format!(
                "birthTime must be HH:MM, got {}",
                self.time
            )));
        }
        if self.place.trim().is_empty() {
            return Err(PaymentError::Validation("birthPlace is required".to_string()));
        }
        Ok(())
    }
}

/// Customer data captured at checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub birth: BirthDetails,
}

impl CustomerDetails {
    pub fn validate(&self) -> PaymentResult<()> {
        if self.name.trim().is_empty() {
            return Err(PaymentError::Validation("name is required".to_string()));
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err(PaymentError::Validation("email is required".to_string()));
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(PaymentError::Validation(format!(
                    "email is not a valid address: {}",
                    email
                )))
            }
        }
        self.birth.validate()
    }
}

/// Everything needed to persist a new pending order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub order_number: String,
    pub customer: CustomerDetails,
    pub package_id: i64,
    pub package_name: String,
    pub package_price: Decimal,
    pub provider: PaymentProvider,
    pub payment_method: String,
    pub terms_accepted: bool,
}

impl OrderDraft {
    pub fn validate(&self) -> PaymentResult<()> {
        if self.order_number.is_empty() {
            return Err(PaymentError::Validation("order number is required".to_string()));
        }
        if !self.terms_accepted {
            return Err(PaymentError::Validation(
                "Terms and conditions must be accepted".to_string(),
            ));
        }
        if self.package_name.trim().is_empty() {
            return Err(PaymentError::Validation("package is required".to_string()));
        }
        crate::package::to_minor_units(self.package_price)?;
        self.customer.validate()
    }
}

/// Provider correlation identifiers attached after checkout creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderReference {
    Stripe {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payment_intent_id: Option<String>,
    },
    Revolut {
        order_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_id: Option<String>,
    },
}

impl ProviderReference {
    pub fn provider(&self) -> PaymentProvider {
        match self {
            ProviderReference::Stripe { .. } => PaymentProvider::Stripe,
            ProviderReference::Revolut { .. } => PaymentProvider::Revolut,
        }
    }

    /// The identifier the provider's webhooks can be matched on
    pub fn external_id(&self) -> &str {
        match self {
            ProviderReference::Stripe { session_id, .. } => session_id,
            ProviderReference::Revolut { order_id, .. } => order_id,
        }
    }
}

/// Identifies the order a mutation applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSelector {
    /// Internal order id (e.g. carried in provider metadata)
    Id(OrderId),
    /// Stored Stripe checkout session id
    StripeSession(String),
    /// Stored Revolut order id
    RevolutOrder(String),
}

impl OrderSelector {
    /// Whether `order` is the one this selector names
    pub fn matches(&self, order: &Order) -> bool {
        match (self, &order.provider_reference) {
            (OrderSelector::Id(id), _) => order.id == *id,
            (
                OrderSelector::StripeSession(wanted),
                Some(ProviderReference::Stripe { session_id, .. }),
            ) => session_id == wanted,
            (
                OrderSelector::RevolutOrder(wanted),
                Some(ProviderReference::Revolut { order_id, .. }),
            ) => order_id == wanted,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSelector::Id(id) => write!(f, "{}", id),
            OrderSelector::StripeSession(id) => write!(f, "stripe:{}", id),
            OrderSelector::RevolutOrder(id) => write!(f, "revolut:{}", id),
        }
    }
}

/// A persisted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer: CustomerDetails,
    pub package_id: i64,
    pub package_name: String,
    pub package_price: Decimal,
    pub provider: PaymentProvider,
    pub payment_method: String,

    /// Set once the provider session/order exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<ProviderReference>,

    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub terms_accepted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build the pending order a store persists for `draft`
    pub fn pending(id: OrderId, draft: OrderDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            order_number: draft.order_number,
            customer: draft.customer,
            package_id: draft.package_id,
            package_name: draft.package_name,
            package_price: draft.package_price,
            provider: draft.provider,
            payment_method: draft.payment_method,
            provider_reference: None,
            payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Pending,
            terms_accepted: draft.terms_accepted,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }

    /// Attach provider correlation ids
    pub fn attach_reference(
        &mut self,
        reference: ProviderReference,
        now: DateTime<Utc>,
    ) -> PaymentResult<()> {
        if reference.provider() != self.provider {
            return Err(PaymentError::Validation(format!(
                "Order {} is paid via {}, cannot attach a {} reference",
                self.id,
                self.provider,
                reference.provider()
            )));
        }
        self.provider_reference = Some(reference);
        self.updated_at = now;
        Ok(())
    }

    /// Apply a completion event. Returns false when the order was already completed.
    pub fn complete(&mut self, transaction_ref: Option<&str>, now: DateTime<Utc>) -> bool {
        if self.is_completed() {
            return false;
        }

        self.payment_status = PaymentStatus::Completed;
        self.order_status = self.order_status.advance_to(OrderStatus::Processing);
        self.completed_at.get_or_insert(now);
        self.updated_at = now;

        if let (
            Some(ProviderReference::Stripe {
                payment_intent_id, ..
            }),
            Some(reference),
        ) = (self.provider_reference.as_mut(), transaction_ref)
        {
            payment_intent_id.get_or_insert_with(|| reference.to_string());
        }

        true
    }

    /// Apply a failure event. Only a pending payment can fail.
    pub fn fail(&mut self, now: DateTime<Utc>) -> bool {
        if self.payment_status != PaymentStatus::Pending {
            return false;
        }
        self.payment_status = PaymentStatus::Failed;
        self.updated_at = now;
        true
    }

    /// Read-only projection returned to polling clients
    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            order_number: self.order_number.clone(),
            email: self.customer.email.clone(),
            package_name: self.package_name.clone(),
            price: self.package_price,
            payment_status: self.payment_status,
            order_status: self.order_status,
            provider: self.provider,
            created_at: self.created_at,
        }
    }
}

/// Order status as shown to the customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_number: String,
    pub email: String,
    pub package_name: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub provider: PaymentProvider,
    pub created_at: DateTime<Utc>,
}

/// Issues human-readable order numbers (`CR-` + 8 digits of a millisecond clock).
///
/// Never issues the same clock value twice within a process. Order numbers
/// are not secrets and must not be used to authorize anything.
#[derive(Debug, Default)]
pub struct OrderNumberGenerator {
    last_issued: AtomicI64,
}

impl OrderNumberGenerator {
    pub const PREFIX: &'static str = "CR-";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> String {
        self.next_at(Utc::now().timestamp_millis())
    }

    fn next_at(&self, now_millis: i64) -> String {
        let mut issued = now_millis;
        let _ = self
            .last_issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                issued = if now_millis > last { now_millis } else { last + 1 };
                Some(issued)
            });
        format!("{}{:08}", Self::PREFIX, issued.rem_euclid(100_000_000))
    }
}

/// A checkout created by a payment provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub provider: PaymentProvider,

    /// Provider's session/order id
    pub external_id: String,

    /// Provider's public token (Revolut)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,

    /// URL to redirect the customer to for payment
    pub checkout_url: String,
}

impl CheckoutSession {
    /// Correlation ids to store on the order
    pub fn reference(&self) -> ProviderReference {
        match self.provider {
            PaymentProvider::Stripe => ProviderReference::Stripe {
                session_id: self.external_id.clone(),
                payment_intent_id: None,
            },
            PaymentProvider::Revolut => ProviderReference::Revolut {
                order_id: self.external_id.clone(),
                public_id: self.public_id.clone(),
            },
        }
    }
}

/// A raw webhook delivery
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub payload: &'a [u8],
    /// Provider signature header, if sent
    pub signature: Option<&'a str>,
    /// Provider timestamp header, if sent separately from the signature
    pub timestamp: Option<&'a str>,
}

impl<'a> WebhookRequest<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            signature: None,
            timestamp: None,
        }
    }

    pub fn with_signature(mut self, signature: Option<&'a str>) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<&'a str>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Webhook event types we act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    /// Payment collected
    PaymentCompleted,
    /// Payment failed, declined or the checkout expired
    PaymentFailed,
    /// Anything else (acknowledged, no state change)
    Unknown(String),
}

/// A parsed (and, where supported, verified) webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event ID from provider
    pub event_id: String,

    pub event_type: WebhookEventType,

    pub provider: PaymentProvider,

    /// Order the event refers to, when it could be correlated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<OrderSelector>,

    /// Provider transaction reference (payment intent id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_ref: Option<String>,

    /// Whether the payload's signature was checked
    pub verified: bool,
}
