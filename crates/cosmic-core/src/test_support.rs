//! Fixtures shared by the unit tests of this crate.

use crate::error::PaymentResult;
use crate::order::{
    BirthDetails, CheckoutSession, CustomerDetails, Order, OrderDraft, PaymentProvider,
    WebhookEvent, WebhookRequest, DEFAULT_BIRTH_TIME, DEFAULT_PAYMENT_METHOD,
};
use crate::strategy::{CheckoutUrls, PaymentStrategy};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::collections::VecDeque;
use std::sync::Mutex;

pub fn customer() -> CustomerDetails {
    CustomerDetails {
        name: "Ana".to_string(),
        email: "ana@x.com".to_string(),
        birth: BirthDetails {
            day: 5,
            month: 9,
            year: 1990,
            time: DEFAULT_BIRTH_TIME.to_string(),
            place: "Porto".to_string(),
        },
    }
}

pub fn order_draft(order_number: &str, provider: PaymentProvider) -> OrderDraft {
    OrderDraft {
        order_number: order_number.to_string(),
        customer: customer(),
        package_id: 1,
        package_name: "Soul Blueprint".to_string(),
        package_price: dec!(147),
        provider,
        payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
        terms_accepted: true,
    }
}

/// Strategy that answers from memory: checkout either succeeds with
/// `ext_<order id>` or fails, and webhooks replay queued events.
pub struct FakeStrategy {
    pub provider: PaymentProvider,
    pub fail_checkout: bool,
    pub events: Mutex<VecDeque<PaymentResult<WebhookEvent>>>,
    pub checkout_calls: AtomicUsize,
}

impl FakeStrategy {
    pub fn new(provider: PaymentProvider) -> Self {
        Self {
            provider,
            fail_checkout: false,
            events: Mutex::new(VecDeque::new()),
            checkout_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(provider: PaymentProvider) -> Self {
        Self {
            fail_checkout: true,
            ..Self::new(provider)
        }
    }

    /// Queue the result of the next `parse_completion_event` call
    pub fn push_event(&self, event: PaymentResult<WebhookEvent>) {
        self.events.lock().unwrap().push_back(event);
    }
}

#[async_trait]
impl PaymentStrategy for FakeStrategy {
    async fn create_checkout(
        &self,
        order: &Order,
        urls: &CheckoutUrls,
    ) -> PaymentResult<CheckoutSession> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_checkout {
            return Err(crate::PaymentError::provider(
                self.provider.as_str(),
                "connection refused",
            ));
        }
        Ok(CheckoutSession {
            provider: self.provider,
            external_id: format!("ext_{}", order.id),
            public_id: None,
            checkout_url: urls.success_url(order.id, self.provider),
        })
    }

    async fn parse_completion_event(
        &self,
        _request: WebhookRequest<'_>,
    ) -> PaymentResult<WebhookEvent> {
        self.events
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(crate::PaymentError::WebhookParse("no event".to_string())))
    }

    fn provider(&self) -> PaymentProvider {
        self.provider
    }
}
