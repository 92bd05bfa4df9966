//! Webhook signature verification and event parsing.
//!
//! Stripe signs every event delivery with the endpoint's `whsec_...` secret. The signature travels in the
//! `Stripe-Signature` header as `t=<unix timestamp>,v1=<hex hmac>`, where the HMAC-SHA256 is computed over
//! `"{t}.{raw body}"`. Verification fails closed: any missing, malformed, stale or mismatched signature rejects the
//! delivery before the payload is even parsed.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::data_objects::{CheckoutSession, PaymentIntent};

type HmacSha256 = Hmac<Sha256>;

/// Deliveries whose signature timestamp is further than this many seconds from the current time are rejected,
/// bounding the replay window for a captured payload.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("No signature header was provided")]
    MissingSignature,
    #[error("Malformed signature header: {0}")]
    MalformedSignature(String),
    #[error("Signature does not match the payload")]
    SignatureMismatch,
    #[error("Signature timestamp is outside the accepted tolerance")]
    StaleTimestamp,
    #[error("Could not parse event payload: {0}")]
    InvalidPayload(String),
}

/// Verify the `Stripe-Signature` header against the raw request body.
///
/// `now_unix` is injected rather than read from the clock so that callers (and tests) control the replay window.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
    tolerance_secs: i64,
    now_unix: i64,
) -> Result<(), WebhookError> {
    let (timestamp, signatures) = parse_signature_header(signature_header)?;
    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(WebhookError::StaleTimestamp);
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::MalformedSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();
    // Stripe may include several v1 entries during secret rotation. Any match accepts the delivery.
    let valid = signatures.iter().any(|sig| {
        hex::decode(sig).map(|raw| raw.as_slice() == expected.as_slice()).unwrap_or(false)
    });
    if valid {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

fn parse_signature_header(header: &str) -> Result<(i64, Vec<String>), WebhookError> {
    if header.trim().is_empty() {
        return Err(WebhookError::MissingSignature);
    }
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for element in header.split(',') {
        match element.trim().split_once('=') {
            Some(("t", value)) => {
                let t = value
                    .parse::<i64>()
                    .map_err(|e| WebhookError::MalformedSignature(format!("bad timestamp: {e}")))?;
                timestamp = Some(t);
            },
            Some(("v1", value)) => signatures.push(value.to_string()),
            // Unknown schemes (e.g. v0) are ignored, as per Stripe's verification guidance.
            Some(_) => {},
            None => return Err(WebhookError::MalformedSignature(format!("unparseable element '{element}'"))),
        }
    }
    let timestamp = timestamp.ok_or_else(|| WebhookError::MalformedSignature("no timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedSignature("no v1 signature".to_string()));
    }
    Ok((timestamp, signatures))
}

//--------------------------------------     WebhookEvent      -------------------------------------------------------
/// A verified, parsed webhook delivery. `id` is Stripe's unique event id and drives the idempotency ledger.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub created: i64,
    pub payload: EventPayload,
}

/// The event types this gateway reconciles, parsed once into a typed payload. Everything else lands in `Unhandled`
/// and is acknowledged without touching state, so Stripe stops redelivering events we do not care about.
#[derive(Debug, Clone)]
pub enum EventPayload {
    CheckoutSessionCompleted(CheckoutSession),
    CheckoutAsyncPaymentSucceeded(CheckoutSession),
    CheckoutAsyncPaymentFailed(CheckoutSession),
    PaymentIntentSucceeded(PaymentIntent),
    PaymentIntentFailed(PaymentIntent),
    Unhandled(String),
}

#[derive(Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: i64,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: serde_json::Value,
}

/// Parse a raw (already signature-verified) webhook body into a [`WebhookEvent`].
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let envelope: EventEnvelope =
        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    let EventEnvelope { id, event_type, created, data } = envelope;
    let payload = match event_type.as_str() {
        "checkout.session.completed" => EventPayload::CheckoutSessionCompleted(session_object(&event_type, data)?),
        "checkout.session.async_payment_succeeded" => {
            EventPayload::CheckoutAsyncPaymentSucceeded(session_object(&event_type, data)?)
        },
        "checkout.session.async_payment_failed" => {
            EventPayload::CheckoutAsyncPaymentFailed(session_object(&event_type, data)?)
        },
        "payment_intent.succeeded" => EventPayload::PaymentIntentSucceeded(intent_object(&event_type, data)?),
        "payment_intent.payment_failed" => EventPayload::PaymentIntentFailed(intent_object(&event_type, data)?),
        _ => EventPayload::Unhandled(event_type),
    };
    Ok(WebhookEvent { id, created, payload })
}

fn session_object(event_type: &str, data: EventData) -> Result<CheckoutSession, WebhookError> {
    serde_json::from_value(data.object)
        .map_err(|e| WebhookError::InvalidPayload(format!("{event_type}: {e}")))
}

fn intent_object(event_type: &str, data: EventData) -> Result<PaymentIntent, WebhookError> {
    serde_json::from_value(data.object)
        .map_err(|e| WebhookError::InvalidPayload(format!("{event_type}: {e}")))
}
