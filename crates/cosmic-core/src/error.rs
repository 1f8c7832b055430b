//! # Payment Error Types
//!
//! Typed error handling for the cosmic-checkout engine.
//! All checkout, storage and webhook operations return `Result<T, PaymentError>`.

use thiserror::Error;

/// Core error type for checkout and reconciliation
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Missing or malformed request fields
    #[error("{0}")]
    Validation(String),

    /// Order does not exist
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: String },

    /// Remote payment API failure or timeout
    #[error("Provider error [{provider}]: {message}")]
    Provider { provider: String, message: String },

    /// Webhook signature did not verify
    #[error("Webhook verification failed: {0}")]
    Authenticity(String),

    /// Webhook payload could not be parsed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Order store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Another order already holds this order number
    #[error("Order number already taken: {order_number}")]
    OrderNumberTaken { order_number: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PaymentError {
    /// Shorthand for a provider failure
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an unknown order
    pub fn not_found(order_id: impl ToString) -> Self {
        PaymentError::OrderNotFound {
            order_id: order_id.to_string(),
        }
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Validation(_) => 400,
            PaymentError::OrderNotFound { .. } => 404,
            PaymentError::Provider { .. } => 500,
            PaymentError::Authenticity(_) => 400,
            PaymentError::WebhookParse(_) => 400,
            PaymentError::Configuration(_) => 500,
            PaymentError::Storage(_) => 500,
            PaymentError::OrderNumberTaken { .. } => 409,
            PaymentError::Serialization(_) => 500,
        }
    }

    /// Webhook errors that must be acknowledged rather than retried by the provider
    pub fn is_unrecognized_event(&self) -> bool {
        matches!(
            self,
            PaymentError::WebhookParse(_) | PaymentError::OrderNotFound { .. }
        )
    }
}

/// Result type alias for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;
