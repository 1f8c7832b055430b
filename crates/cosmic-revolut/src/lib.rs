//! # cosmic-revolut
//!
//! Revolut Merchant API strategy for cosmic-checkout.
//!
//! **RevolutOrderStrategy** creates a merchant order per checkout
//! (`merchant_order_ext_ref` = order number) and redirects the customer to
//! Revolut's hosted payment page. Completion arrives as an
//! `ORDER_COMPLETED` webhook keyed by the Revolut order id.
//!
//! ```rust,ignore
//! use cosmic_revolut::{RevolutConfig, RevolutOrderStrategy};
//!
//! if let Some(config) = RevolutConfig::from_env()? {
//!     selector.register(Arc::new(RevolutOrderStrategy::new(config)?));
//! }
//! ```

pub mod config;
pub mod orders;
pub mod webhook;

pub use config::RevolutConfig;
pub use orders::RevolutOrderStrategy;
pub use webhook::signature_header;
