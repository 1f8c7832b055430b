//! # Application State
//!
//! Shared state for the Axum application.
//! Contains the order store, the checkout and webhook services, and the
//! public payment config.

use crate::payment_config::PaymentConfig;
use anyhow::Context;
use cosmic_core::{
    CheckoutOrchestrator, CheckoutUrls, InMemoryOrderStore, OrderStore, PackageCatalog,
    PaymentStrategySelector, Reconciler,
};
use cosmic_revolut::{RevolutConfig, RevolutOrderStrategy};
use cosmic_stripe::{StripeCheckoutStrategy, StripeConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Storefront base URL for provider redirects
    pub app_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// `json` for JSON logs, anything else for human-readable output
    pub log_format: String,
    /// Postgres connection string (used with the `postgres` feature)
    pub database_url: Option<String>,
    /// Package catalog seeded at start-up
    pub packages_file: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080),
            app_url: var("APP_URL").unwrap_or_else(|| "http://localhost:8080".to_string()),
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            log_format: var("LOG_FORMAT").unwrap_or_else(|| "pretty".to_string()),
            database_url: var("DATABASE_URL"),
            packages_file: var("PACKAGES_FILE")
                .unwrap_or_else(|| "config/packages.toml".to_string()),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: CheckoutOrchestrator,
    pub reconciler: Reconciler,
    pub payment_config: PaymentConfig,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn OrderStore>,
        strategies: PaymentStrategySelector,
        payment_config: PaymentConfig,
    ) -> Self {
        let urls = CheckoutUrls::new(&config.app_url);
        Self {
            orchestrator: CheckoutOrchestrator::new(store.clone(), strategies.clone(), urls),
            reconciler: Reconciler::new(store, strategies),
            config,
            payment_config,
        }
    }

    /// Wire providers, store and catalog from the environment
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let stripe = StripeConfig::from_env()?;
        let revolut = RevolutConfig::from_env()?;
        let payment_config = PaymentConfig::new(stripe.as_ref(), revolut.as_ref());

        let mut strategies = PaymentStrategySelector::new();
        match stripe {
            Some(stripe) => strategies.register(Arc::new(StripeCheckoutStrategy::new(stripe)?)),
            None => warn!("STRIPE_SECRET_KEY not set, Stripe checkout disabled"),
        }
        match revolut {
            Some(revolut) => {
                if revolut.webhook_secret.is_none() {
                    warn!("REVOLUT_WEBHOOK_SECRET not set, Revolut webhooks will not be verified");
                }
                strategies.register(Arc::new(RevolutOrderStrategy::new(revolut)?))
            }
            None => warn!("REVOLUT_API_KEY not set, Revolut checkout disabled"),
        }

        let store = open_store(&config).await?;
        seed_catalog(store.as_ref(), Path::new(&config.packages_file)).await?;

        Ok(Self::new(config, store, strategies, payment_config))
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn OrderStore>> {
    #[cfg(feature = "postgres")]
    {
        if let Some(url) = &config.database_url {
            let store = cosmic_core::PostgresOrderStore::connect(url)
                .await
                .context("Failed to open Postgres order store")?;
            info!("Using Postgres order store");
            return Ok(Arc::new(store));
        }
    }

    #[cfg(not(feature = "postgres"))]
    {
        if config.database_url.is_some() {
            warn!("DATABASE_URL is set but this build lacks the postgres feature");
        }
    }

    warn!("Using in-memory order store, orders are lost on restart");
    Ok(Arc::new(InMemoryOrderStore::new()))
}

/// Upsert every package in the catalog file. A missing file is not an error.
pub async fn seed_catalog(store: &dyn OrderStore, path: &Path) -> anyhow::Result<usize> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("No package catalog at {}, packages will be created on demand", path.display());
            return Ok(0);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let catalog = PackageCatalog::from_toml(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    for draft in &catalog.packages {
        let package = store.upsert_package(draft).await?;
        info!("Seeded package: {} ({} EUR)", package.name, package.price);
    }

    info!("Loaded {} packages from {}", catalog.len(), path.display());
    Ok(catalog.len())
}
