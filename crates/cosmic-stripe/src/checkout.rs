//! # Stripe Checkout Sessions
//!
//! Card payments through Stripe's hosted Checkout Sessions API.

use crate::config::StripeConfig;
use crate::webhook;
use async_trait::async_trait;
use cosmic_core::{
    to_minor_units, CheckoutSession, CheckoutUrls, Order, PaymentError, PaymentProvider,
    PaymentResult, PaymentStrategy, WebhookEvent, WebhookRequest, CURRENCY,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "stripe";

/// Stripe Checkout Session strategy
///
/// Uses Stripe's hosted checkout page, so card data never touches this service.
pub struct StripeCheckoutStrategy {
    config: StripeConfig,
    client: Client,
}

impl StripeCheckoutStrategy {
    /// Create a new Stripe checkout strategy
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                PaymentError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Form fields for `POST /v1/checkout/sessions`: one line item for the package
    fn session_form(&self, order: &Order, urls: &CheckoutUrls) -> PaymentResult<Vec<(String, String)>> {
        let unit_amount = to_minor_units(order.package_price)?;
        let success_url = format!(
            "{}&session_id={{CHECKOUT_SESSION_ID}}",
            urls.success_url(order.id, PaymentProvider::Stripe)
        );

        let params = [
            ("mode", "payment".to_string()),
            ("success_url", success_url),
            (
                "cancel_url",
                urls.cancel_url(order.id, PaymentProvider::Stripe),
            ),
            ("customer_email", order.customer.email.clone()),
            (
                "line_items[0][price_data][currency]",
                CURRENCY.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                order.package_name.clone(),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            ("metadata[order_id]", order.id.to_string()),
            ("metadata[order_number]", order.order_number.clone()),
            ("metadata[customer_name]", order.customer.name.clone()),
        ];

        Ok(params
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect())
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
impl PaymentStrategy for StripeCheckoutStrategy {
    #[instrument(skip(self, order, urls), fields(order_id = %order.id))]
    async fn create_checkout(
        &self,
        order: &Order,
        urls: &CheckoutUrls,
    ) -> PaymentResult<CheckoutSession> {
        let form_params = self.session_form(order, urls)?;
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        debug!(
            "Creating Stripe checkout session: order_number={}, package={}",
            order.order_number, order.package_name
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header(
                "Idempotency-Key",
                format!("{}-{}", order.order_number, order.id),
            )
            .form(&form_params)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            error!("Stripe API error: status={}, body={}", status, body);

            // Parse Stripe error
            if let Ok(error_response) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(PaymentError::provider(PROVIDER, error_response.error.message));
            }

            return Err(PaymentError::provider(
                PROVIDER,
                format!("HTTP {}: {}", status, body),
            ));
        }

        let session: StripeCheckoutSessionResponse =
            serde_json::from_str(&body).map_err(|e| {
                PaymentError::provider(PROVIDER, format!("Failed to parse Stripe response: {}", e))
            })?;

        let checkout_url = session.url.ok_or_else(|| {
            PaymentError::provider(PROVIDER, format!("Session {} has no checkout url", session.id))
        })?;

        info!(
            "Created Stripe checkout session: id={}, url={}",
            session.id, checkout_url
        );

        Ok(CheckoutSession {
            provider: PaymentProvider::Stripe,
            external_id: session.id,
            public_id: None,
            checkout_url,
        })
    }

    #[instrument(skip(self, request))]
    async fn parse_completion_event(
        &self,
        request: WebhookRequest<'_>,
    ) -> PaymentResult<WebhookEvent> {
        let secret = self.config.webhook_secret.as_deref().ok_or_else(|| {
            PaymentError::Authenticity("STRIPE_WEBHOOK_SECRET not configured".to_string())
        })?;
        let signature = request.signature.ok_or_else(|| {
            PaymentError::Authenticity("Missing Stripe-Signature header".to_string())
        })?;

        webhook::verify_signature(secret, request.payload, signature)?;
        webhook::parse_event(request.payload)
    }

    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeCheckoutSessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
}
