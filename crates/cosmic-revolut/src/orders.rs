//! # Revolut Merchant Orders
//!
//! Wallet and card payments through Revolut's hosted checkout. A merchant
//! order is created for the pending order and the customer is sent to its
//! hosted payment page.

use crate::config::RevolutConfig;
use crate::webhook;
use async_trait::async_trait;
use cosmic_core::{
    to_minor_units, CheckoutSession, CheckoutUrls, Order, PaymentError, PaymentProvider,
    PaymentResult, PaymentStrategy, WebhookEvent, WebhookRequest, CURRENCY,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

const PROVIDER: &str = "revolut";

pub struct RevolutOrderStrategy {
    config: RevolutConfig,
    client: Client,
}

impl RevolutOrderStrategy {
    pub fn new(config: RevolutConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                PaymentError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn order_request(&self, order: &Order, urls: &CheckoutUrls) -> PaymentResult<CreateOrderRequest> {
        let birth = &order.customer.birth;
        Ok(CreateOrderRequest {
            amount: to_minor_units(order.package_price)?,
            currency: CURRENCY,
            merchant_order_ext_ref: order.order_number.clone(),
            customer_email: order.customer.email.clone(),
            description: format!("{} - Cosmic Blueprint", order.package_name),
            success_url: urls.success_url(order.id, PaymentProvider::Revolut),
            cancel_url: urls.cancel_url(order.id, PaymentProvider::Revolut),
            metadata: OrderMetadata {
                order_id: order.id.to_string(),
                order_number: order.order_number.clone(),
                customer_name: order.customer.name.clone(),
                birth_details: format!("{}/{}/{}", birth.day, birth.month, birth.year),
            },
        })
    }
}

fn request_error(e: reqwest::Error) -> PaymentError {
    if e.is_timeout() {
        PaymentError::provider(PROVIDER, "request timed out")
    } else {
        PaymentError::provider(PROVIDER, e.to_string())
    }
}

#[async_trait]
impl PaymentStrategy for RevolutOrderStrategy {
    #[instrument(skip(self, order, urls), fields(order_id = %order.id))]
    async fn create_checkout(
        &self,
        order: &Order,
        urls: &CheckoutUrls,
    ) -> PaymentResult<CheckoutSession> {
        let body = self.order_request(order, urls)?;
        let url = format!("{}/api/1.0/orders", self.config.api_base_url);

        debug!(
            "Creating Revolut order: ext_ref={}, amount={}",
            body.merchant_order_ext_ref, body.amount
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let text = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            error!("Revolut API error: status={}, body={}", status, text);

            let message = serde_json::from_str::<RevolutErrorResponse>(&text)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {}: {}", status, text));
            return Err(PaymentError::provider(PROVIDER, message));
        }

        let created: CreateOrderResponse = serde_json::from_str(&text).map_err(|e| {
            PaymentError::provider(PROVIDER, format!("Failed to parse Revolut response: {}", e))
        })?;

        let checkout_url = match (&created.checkout_url, &created.public_id) {
            (Some(url), _) => url.clone(),
            (None, Some(public_id)) => self.config.payment_link(public_id),
            (None, None) => {
                return Err(PaymentError::provider(
                    PROVIDER,
                    format!("Order {} has neither checkout_url nor public_id", created.id),
                ))
            }
        };

        info!(
            "Created Revolut order: id={}, public_id={:?}",
            created.id, created.public_id
        );

        Ok(CheckoutSession {
            provider: PaymentProvider::Revolut,
            external_id: created.id,
            public_id: created.public_id,
            checkout_url,
        })
    }

    #[instrument(skip(self, request))]
    async fn parse_completion_event(
        &self,
        request: WebhookRequest<'_>,
    ) -> PaymentResult<WebhookEvent> {
        let verified = match self.config.webhook_secret.as_deref() {
            Some(secret) => {
                webhook::verify_signature(
                    secret,
                    request.payload,
                    request.signature,
                    request.timestamp,
                )?;
                true
            }
            None => {
                warn!("REVOLUT_WEBHOOK_SECRET not set, accepting unsigned webhook");
                false
            }
        };

        webhook::parse_event(request.payload, verified)
    }

    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Revolut
    }
}

// =============================================================================
// Merchant API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    amount: i64,
    currency: &'static str,
    merchant_order_ext_ref: String,
    customer_email: String,
    description: String,
    success_url: String,
    cancel_url: String,
    metadata: OrderMetadata,
}

#[derive(Debug, Serialize)]
struct OrderMetadata {
    order_id: String,
    order_number: String,
    customer_name: String,
    birth_details: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    #[serde(default)]
    public_id: Option<String>,
    #[serde(default)]
    checkout_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RevolutErrorResponse {
    #[serde(default)]
    message: Option<String>,
}
