//! # Stripe Webhook Handling
//!
//! Signature verification and event parsing for Stripe webhooks.
//!
//! Events the service acts on (enable these in the Stripe Dashboard):
//! `checkout.session.completed`, `checkout.session.async_payment_succeeded`,
//! `checkout.session.async_payment_failed` and `checkout.session.expired`.

use chrono::Utc;
use cosmic_core::{
    OrderSelector, PaymentError, PaymentProvider, PaymentResult, WebhookEvent, WebhookEventType,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, PartialEq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> PaymentResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        PaymentError::Authenticity("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(PaymentError::Authenticity(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn signed_payload_mac(secret: &str, timestamp: i64, payload: &[u8]) -> PaymentResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Configuration(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Build a `Stripe-Signature` header value for `payload`.
///
/// Used to sign fixtures and local replays the same way Stripe does.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> PaymentResult<String> {
    let mac = signed_payload_mac(secret, timestamp, payload)?;
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify a `Stripe-Signature` header against the raw body at time `now`
pub fn verify_signature_at(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> PaymentResult<()> {
    let parsed = parse_signature_header(header)?;

    if (now - parsed.timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::Authenticity(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let mac = signed_payload_mac(secret, parsed.timestamp, payload)?;
    let valid = parsed.signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if !valid {
        return Err(PaymentError::Authenticity(
            "Signature mismatch".to_string(),
        ));
    }
    Ok(())
}

pub fn verify_signature(secret: &str, payload: &[u8], header: &str) -> PaymentResult<()> {
    verify_signature_at(secret, payload, header, Utc::now().timestamp())
}

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeSessionObject,
}

/// The parts of a Checkout Session object we read
#[derive(Debug, Default, Deserialize)]
struct StripeSessionObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

impl StripeSessionObject {
    /// Internal order id from metadata, falling back to the session id
    fn selector(&self) -> Option<OrderSelector> {
        self.metadata
            .get("order_id")
            .and_then(|id| id.parse().ok())
            .map(OrderSelector::Id)
            .or_else(|| self.id.clone().map(OrderSelector::StripeSession))
    }

    fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }
}

/// Parse a (verified) Stripe event body
pub fn parse_event(payload: &[u8]) -> PaymentResult<WebhookEvent> {
    let event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
        PaymentError::WebhookParse(format!("Failed to parse webhook: {}", e))
    })?;

    debug!("Parsed Stripe webhook: id={}, type={}", event.id, event.event_type);

    let session = event.data.object;
    let event_type = match event.event_type.as_str() {
        "checkout.session.completed" if session.is_paid() => WebhookEventType::PaymentCompleted,
        "checkout.session.completed" => WebhookEventType::Unknown(format!(
            "checkout.session.completed (payment_status={})",
            session.payment_status.as_deref().unwrap_or("unknown")
        )),
        "checkout.session.async_payment_succeeded" => WebhookEventType::PaymentCompleted,
        "checkout.session.async_payment_failed" | "checkout.session.expired" => {
            WebhookEventType::PaymentFailed
        }
        other => WebhookEventType::Unknown(other.to_string()),
    };

    Ok(WebhookEvent {
        event_id: event.id,
        event_type,
        provider: PaymentProvider::Stripe,
        selector: session.selector(),
        transaction_ref: session.payment_intent.clone(),
        verified: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    fn completed(payment_status: &str, metadata: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "created": 1_700_000_000,
            "data": { "object": {
                "id": "cs_test_123",
                "object": "checkout.session",
                "payment_intent": "pi_test_456",
                "payment_status": payment_status,
                "metadata": metadata
            }}
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_signature_header() {
        let parsed = parse_signature_header("t=1234567890,v1=abc123,v0=zzz,v1=def456").unwrap();

        assert_eq!(parsed.timestamp, 1234567890);
        assert_eq!(parsed.signatures, vec!["abc123", "def456"]);
        assert!(parse_signature_header("v1=abc").is_err());
        assert!(parse_signature_header("t=1").is_err());
    }

    #[test]
    fn test_signature_round_trip() {
        let payload = completed("paid", json!({}));
        let header = signature_header(SECRET, 1_700_000_000, &payload).unwrap();

        assert!(verify_signature_at(SECRET, &payload, &header, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_signature_rejections() {
        let payload = completed("paid", json!({}));
        let header = signature_header(SECRET, 1_700_000_000, &payload).unwrap();

        let tampered = completed("paid", json!({ "order_id": "1" }));
        assert!(matches!(
            verify_signature_at(SECRET, &tampered, &header, 1_700_000_000),
            Err(PaymentError::Authenticity(_))
        ));
        assert!(verify_signature_at("whsec_other", &payload, &header, 1_700_000_000).is_err());
        assert!(verify_signature_at(SECRET, &payload, &header, 1_700_000_301).is_err());
        assert!(verify_signature_at(SECRET, &payload, "t=1700000000,v1=nothex", 1_700_000_000).is_err());
    }

    #[test]
    fn test_parse_completed_uses_metadata_order_id() {
        let event = parse_event(&completed("paid", json!({ "order_id": "42" }))).unwrap();

        assert_eq!(event.event_type, WebhookEventType::PaymentCompleted);
        assert_eq!(event.selector, Some(OrderSelector::Id(42)));
        assert_eq!(event.transaction_ref.as_deref(), Some("pi_test_456"));
        assert!(event.verified);
    }

    #[test]
    fn test_parse_completed_falls_back_to_session() {
        let event = parse_event(&completed("no_payment_required", json!({}))).unwrap();

        assert_eq!(event.event_type, WebhookEventType::PaymentCompleted);
        assert_eq!(
            event.selector,
            Some(OrderSelector::StripeSession("cs_test_123".to_string()))
        );
    }

    #[test]
    fn test_unpaid_completion_is_not_actionable() {
        let event = parse_event(&completed("unpaid", json!({ "order_id": "42" }))).unwrap();
        assert!(matches!(event.event_type, WebhookEventType::Unknown(_)));
    }

    #[test]
    fn test_failure_and_unknown_events() {
        let expired = serde_json::to_vec(&json!({
            "id": "evt_2",
            "type": "checkout.session.expired",
            "data": { "object": { "id": "cs_1", "metadata": { "order_id": "7" } } }
        }))
        .unwrap();
        assert_eq!(
            parse_event(&expired).unwrap().event_type,
            WebhookEventType::PaymentFailed
        );

        let other = serde_json::to_vec(&json!({
            "id": "evt_3",
            "type": "customer.created",
            "data": { "object": { "id": "cus_1" } }
        }))
        .unwrap();
        assert_eq!(
            parse_event(&other).unwrap().event_type,
            WebhookEventType::Unknown("customer.created".to_string())
        );

        assert!(matches!(
            parse_event(b"not json"),
            Err(PaymentError::WebhookParse(_))
        ));
    }
}
