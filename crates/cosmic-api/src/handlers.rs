//! # Request Handlers
//!
//! Axum request handlers for the checkout API.

use crate::payment_config::PaymentConfig;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use cosmic_core::{
    CheckoutOutcome, CheckoutRequest, OrderId, OrderSummary, PaymentError, PaymentProvider,
    PaymentResult, WebhookOutcome, WebhookRequest,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Successful checkout: where to send the customer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    /// Stripe checkout session id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revolut_order_id: Option<String>,
    pub checkout_url: String,
    pub order_id: OrderId,
    pub order_number: String,
    pub provider: PaymentProvider,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        let (session_id, revolut_order_id) = match outcome.session.provider {
            PaymentProvider::Stripe => (Some(outcome.session.external_id), None),
            PaymentProvider::Revolut => (None, Some(outcome.session.external_id)),
        };

        Self {
            success: true,
            session_id,
            revolut_order_id,
            checkout_url: outcome.session.checkout_url,
            order_id: outcome.order.id,
            order_number: outcome.order.order_number,
            provider: outcome.session.provider,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub success: bool,
    pub order: OrderSummary,
}

/// Error response for checkout and status endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn status_of(err: &PaymentError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn payment_error_to_response(err: PaymentError) -> ApiError {
    (status_of(&err), Json(ErrorResponse::new(err.to_string())))
}

fn json_body(payload: Result<Json<CheckoutRequest>, JsonRejection>) -> Result<CheckoutRequest, ApiError> {
    payload.map(|Json(request)| request).map_err(|rejection| {
        payment_error_to_response(PaymentError::Validation(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "cosmic-checkout",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Non-secret provider configuration
pub async fn payment_config(State(state): State<AppState>) -> Json<PaymentConfig> {
    Json(state.payment_config.clone())
}

async fn run_checkout(
    state: &AppState,
    request: CheckoutRequest,
    provider: Option<PaymentProvider>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .checkout(&request, provider)
        .await
        .map_err(|e| {
            if e.status_code() >= 500 {
                error!("Checkout failed: {}", e);
            } else {
                warn!("Checkout rejected: {}", e);
            }
            payment_error_to_response(e)
        })?;

    Ok(Json(CheckoutResponse::from(outcome)))
}

/// Checkout with the provider named by `paymentMethod`
#[instrument(skip(state, payload))]
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    run_checkout(&state, json_body(payload)?, None).await
}

/// Create a Stripe checkout session
#[instrument(skip(state, payload))]
pub async fn create_stripe_session(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    run_checkout(&state, json_body(payload)?, Some(PaymentProvider::Stripe)).await
}

/// Create a Revolut merchant order
#[instrument(skip(state, payload))]
pub async fn create_revolut_order(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    run_checkout(&state, json_body(payload)?, Some(PaymentProvider::Revolut)).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Map a reconciliation result onto the webhook contract: anything that is
/// not an authenticity or storage failure is acknowledged.
fn webhook_response(
    provider: PaymentProvider,
    result: PaymentResult<WebhookOutcome>,
) -> (StatusCode, Json<serde_json::Value>) {
    match result {
        Ok(outcome) => {
            if let WebhookOutcome::Ignored(reason) = &outcome {
                info!("{} webhook acknowledged without change: {}", provider, reason);
            }
            (StatusCode::OK, Json(serde_json::json!({ "received": true })))
        }
        Err(e) => {
            let status = status_of(&e);
            if status.is_server_error() {
                error!("{} webhook failed: {}", provider, e);
            } else {
                warn!("{} webhook rejected: {}", provider, e);
            }
            (status, Json(serde_json::json!({ "error": e.to_string() })))
        }
    }
}

/// Handle Stripe webhook
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = WebhookRequest::new(&body).with_signature(header(&headers, "stripe-signature"));
    let result = state
        .reconciler
        .handle_webhook(PaymentProvider::Stripe, request)
        .await;
    webhook_response(PaymentProvider::Stripe, result)
}

/// Handle Revolut webhook
#[instrument(skip(state, headers, body))]
pub async fn revolut_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = WebhookRequest::new(&body)
        .with_signature(header(&headers, "revolut-signature"))
        .with_timestamp(header(&headers, "revolut-request-timestamp"));
    let result = state
        .reconciler
        .handle_webhook(PaymentProvider::Revolut, request)
        .await;
    webhook_response(PaymentProvider::Revolut, result)
}

/// Poll an order's status
#[instrument(skip(state))]
pub async fn order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order_id: OrderId = order_id
        .parse()
        .map_err(|_| payment_error_to_response(PaymentError::not_found(&order_id)))?;

    let order = state
        .reconciler
        .order_status(order_id)
        .await
        .map_err(payment_error_to_response)?;

    Ok(Json(OrderStatusResponse {
        success: true,
        order,
    }))
}
