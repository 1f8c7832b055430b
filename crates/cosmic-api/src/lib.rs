//! # cosmic-api
//!
//! HTTP API layer for cosmic-checkout.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/config/payment` | Public provider config |
//! | POST | `/api/checkout` | Checkout via `paymentMethod` |
//! | POST | `/api/checkout/stripe/create-session` | Stripe checkout |
//! | POST | `/api/checkout/revolut/create-order` | Revolut checkout |
//! | POST | `/api/checkout/stripe/webhook` | Stripe webhook |
//! | POST | `/api/checkout/revolut/webhook` | Revolut webhook |
//! | GET | `/api/orders/{order_id}/status` | Poll order status |

pub mod handlers;
pub mod payment_config;
pub mod routes;
pub mod state;

pub use payment_config::PaymentConfig;
pub use routes::create_router;
pub use state::{AppConfig, AppState};
