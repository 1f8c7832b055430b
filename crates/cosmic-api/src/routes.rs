//! # Routes
//!
//! Axum router configuration for the checkout API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Checkout:
///   - POST /api/checkout - Checkout with the body's `paymentMethod`
///   - POST /api/checkout/stripe/create-session - Stripe checkout session
///   - POST /api/checkout/revolut/create-order - Revolut merchant order
///
/// - Webhooks (raw body):
///   - POST /api/checkout/stripe/webhook
///   - POST /api/checkout/revolut/webhook
///
/// - Read-only:
///   - GET /api/config/payment - Public provider config
///   - GET /api/orders/{order_id}/status - Poll order state
///   - GET /health
pub fn create_router(state: AppState) -> Router {
    // The storefront may be served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let checkout_routes = Router::new()
        .route("/checkout", post(handlers::create_checkout))
        .route("/checkout/stripe/create-session", post(handlers::create_stripe_session))
        .route("/checkout/revolut/create-order", post(handlers::create_revolut_order));

    let webhook_routes = Router::new()
        .route("/checkout/stripe/webhook", post(handlers::stripe_webhook))
        .route("/checkout/revolut/webhook", post(handlers::revolut_webhook));

    let api_routes = Router::new()
        .merge(checkout_routes)
        .merge(webhook_routes)
        .route("/config/payment", get(handlers::payment_config))
        .route("/orders/{order_id}/status", get(handlers::order_status));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}
