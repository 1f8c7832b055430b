//! # Cosmic Checkout
//!
//! Order and payment service for the Cosmic Blueprint storefront.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables (either provider may be left out)
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_PUBLISHABLE_KEY=pk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//! export REVOLUT_API_KEY=...
//! export REVOLUT_MERCHANT_ID=...
//!
//! # Run the server
//! cosmic-checkout
//! ```

use cosmic_api::{routes, AppConfig, AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    // Initialize logging
    let json = config.json_logs();
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    if !json {
        print_banner();
    }

    let addr = config.socket_addr()?;
    let is_prod = config.is_production();

    // Initialize application state
    let state = AppState::from_config(config).await?;

    info!("Environment: {}", state.config.environment);
    info!(
        "Payment providers: {:?}",
        state.orchestrator.providers()
    );

    // Create router
    let app = routes::create_router(state);

    info!("Cosmic Checkout starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Checkout: POST http://{}/api/checkout", addr);
        info!("Webhooks: POST http://{}/api/checkout/{{stripe,revolut}}/webhook", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

fn print_banner() {
    println!(
        r#"
  ✦ Cosmic Checkout ✦
  ━━━━━━━━━━━━━━━━━━━━
  Orders & payments for Cosmic Blueprint
  Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
