//! # cosmic-stripe
//!
//! Stripe card payments for cosmic-checkout.
//!
//! **StripeCheckoutStrategy** drives the Checkout Sessions API:
//! - one line item per order, priced from the package in euro cents
//! - customer email prefill
//! - `order_id` / `order_number` metadata for webhook correlation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cosmic_stripe::{StripeCheckoutStrategy, StripeConfig};
//! use cosmic_core::{CheckoutUrls, PaymentStrategy};
//!
//! // None when STRIPE_SECRET_KEY is unset
//! if let Some(config) = StripeConfig::from_env()? {
//!     let strategy = StripeCheckoutStrategy::new(config)?;
//!     let session = strategy.create_checkout(&order, &CheckoutUrls::new(app_url)).await?;
//!     // Redirect user to session.checkout_url
//! }
//! ```
//!
//! ## Webhook Handling
//!
//! Every webhook must carry a valid `Stripe-Signature` header; see
//! [`webhook::verify_signature`].

pub mod checkout;
pub mod config;
pub mod webhook;

// Re-exports
pub use checkout::StripeCheckoutStrategy;
pub use config::StripeConfig;
pub use webhook::signature_header;
