//! # Revolut Webhook Handling
//!
//! Revolut posts order lifecycle events:
//!
//! ```json
//! { "event": "ORDER_COMPLETED", "order_id": "...", "merchant_order_ext_ref": "CR-..." }
//! ```
//!
//! Correlation goes through the stored Revolut order id. When a signing
//! secret is configured, the `Revolut-Signature` header (`v1=<hex>`) is an
//! HMAC-SHA256 of `v1.{Revolut-Request-Timestamp}.{body}`, and the
//! timestamp (unix millis) must be within 5 minutes of now.

use chrono::Utc;
use cosmic_core::{
    OrderSelector, PaymentError, PaymentProvider, PaymentResult, WebhookEvent, WebhookEventType,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_VERSION: &str = "v1";

/// Maximum age of a signed delivery (5 minutes, in milliseconds)
pub const SIGNATURE_TOLERANCE_MILLIS: i64 = 300_000;

fn signed_payload_mac(secret: &str, timestamp: &str, payload: &[u8]) -> PaymentResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Configuration(format!("Invalid webhook secret: {}", e)))?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Build a `Revolut-Signature` header value for `payload`
pub fn signature_header(secret: &str, timestamp: &str, payload: &[u8]) -> PaymentResult<String> {
    let mac = signed_payload_mac(secret, timestamp, payload)?;
    Ok(format!(
        "{}={}",
        SIGNATURE_VERSION,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify a `Revolut-Signature` header at time `now` (unix millis).
///
/// The header may carry several comma-separated signatures during secret
/// rotation; any match is accepted.
pub fn verify_signature_at(
    secret: &str,
    payload: &[u8],
    signature: Option<&str>,
    timestamp: Option<&str>,
    now_millis: i64,
) -> PaymentResult<()> {
    let signature = signature.ok_or_else(|| {
        PaymentError::Authenticity("Missing Revolut-Signature header".to_string())
    })?;
    let timestamp = timestamp.ok_or_else(|| {
        PaymentError::Authenticity("Missing Revolut-Request-Timestamp header".to_string())
    })?;

    let sent_at: i64 = timestamp.trim().parse().map_err(|_| {
        PaymentError::Authenticity("Invalid Revolut-Request-Timestamp header".to_string())
    })?;
    if (now_millis - sent_at).abs() > SIGNATURE_TOLERANCE_MILLIS {
        return Err(PaymentError::Authenticity(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let mac = signed_payload_mac(secret, timestamp, payload)?;
    let valid = signature
        .split(',')
        .filter_map(|part| part.trim().strip_prefix("v1="))
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|bytes| mac.clone().verify_slice(&bytes).is_ok());

    if !valid {
        return Err(PaymentError::Authenticity("Signature mismatch".to_string()));
    }
    Ok(())
}

pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature: Option<&str>,
    timestamp: Option<&str>,
) -> PaymentResult<()> {
    verify_signature_at(
        secret,
        payload,
        signature,
        timestamp,
        Utc::now().timestamp_millis(),
    )
}

#[derive(Debug, Deserialize)]
struct RevolutWebhookEvent {
    event: String,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    merchant_order_ext_ref: Option<String>,
}

/// Parse a Revolut event body. `verified` records whether the signature was checked.
pub fn parse_event(payload: &[u8], verified: bool) -> PaymentResult<WebhookEvent> {
    let event: RevolutWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
        PaymentError::WebhookParse(format!("Failed to parse webhook: {}", e))
    })?;

    debug!(
        "Parsed Revolut webhook: event={}, order_id={:?}, ext_ref={:?}",
        event.event, event.order_id, event.merchant_order_ext_ref
    );

    let event_type = match event.event.as_str() {
        "ORDER_COMPLETED" => WebhookEventType::PaymentCompleted,
        "ORDER_PAYMENT_FAILED" | "ORDER_PAYMENT_DECLINED" | "ORDER_CANCELLED" => {
            WebhookEventType::PaymentFailed
        }
        other => WebhookEventType::Unknown(other.to_string()),
    };

    // Revolut events carry no event id of their own
    let event_id = format!(
        "{}:{}",
        event.event,
        event.order_id.as_deref().unwrap_or("unknown")
    );

    Ok(WebhookEvent {
        event_id,
        event_type,
        provider: PaymentProvider::Revolut,
        selector: event.order_id.clone().map(OrderSelector::RevolutOrder),
        transaction_ref: event.order_id,
        verified,
    })
}
