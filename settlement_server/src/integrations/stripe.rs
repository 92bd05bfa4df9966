//! Conversion from Stripe's webhook vocabulary into the engine's [`PaymentEvent`].
//!
//! Checkout-session events carry the payment intent inside the session object; payment-intent events carry it as the
//! object id. Either way, downstream reconciliation only ever sees the intent reference, which is the join key to
//! the local order.
use settlement_engine::db_types::{PaymentEvent, PaymentEventKind, PaymentRef};
use stripe_tools::{CheckoutSession, EventPayload, WebhookEvent};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Could not convert webhook event into a payment event. {0}.")]
pub struct EventConversionError(pub String);

/// Maps a parsed webhook event onto the engine's event type. Returns `Ok(None)` for event types this gateway does
/// not reconcile; those are acknowledged so the processor stops redelivering them.
pub fn payment_event_from_webhook(event: WebhookEvent) -> Result<Option<PaymentEvent>, EventConversionError> {
    let WebhookEvent { id, payload, .. } = event;
    let (payment_ref, kind) = match payload {
        EventPayload::CheckoutSessionCompleted(session) => {
            (session_intent(&id, session)?, PaymentEventKind::SessionCompleted)
        },
        EventPayload::CheckoutAsyncPaymentSucceeded(session) => {
            (session_intent(&id, session)?, PaymentEventKind::AsyncPaymentSucceeded)
        },
        EventPayload::CheckoutAsyncPaymentFailed(session) => {
            (session_intent(&id, session)?, PaymentEventKind::AsyncPaymentFailed)
        },
        EventPayload::PaymentIntentSucceeded(intent) => {
            (PaymentRef::from(intent.id), PaymentEventKind::PaymentConfirmed)
        },
        EventPayload::PaymentIntentFailed(intent) => (PaymentRef::from(intent.id), PaymentEventKind::PaymentFailed),
        EventPayload::Unhandled(_) => return Ok(None),
    };
    Ok(Some(PaymentEvent { event_id: id, payment_ref, kind }))
}

fn session_intent(event_id: &str, session: CheckoutSession) -> Result<PaymentRef, EventConversionError> {
    session.payment_intent.map(PaymentRef::from).ok_or_else(|| {
        EventConversionError(format!("Event {event_id}: session {} carries no payment intent", session.id))
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use stripe_tools::PaymentIntent;

    fn session(payment_intent: Option<&str>) -> CheckoutSession {
        CheckoutSession {
            id: "cs_1".to_string(),
            payment_intent: payment_intent.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn session_events_resolve_to_the_intent_reference() {
        let event = WebhookEvent {
            id: "evt_1".to_string(),
            created: 0,
            payload: EventPayload::CheckoutSessionCompleted(session(Some("pi_77"))),
        };
        let converted = payment_event_from_webhook(event).unwrap().unwrap();
        assert_eq!(converted.payment_ref, PaymentRef::from("pi_77"));
        assert_eq!(converted.kind, PaymentEventKind::SessionCompleted);
        assert_eq!(converted.event_id, "evt_1");
    }

    #[test]
    fn intent_events_use_the_object_id() {
        let intent = PaymentIntent { id: "pi_42".to_string(), ..Default::default() };
        let event =
            WebhookEvent { id: "evt_2".to_string(), created: 0, payload: EventPayload::PaymentIntentFailed(intent) };
        let converted = payment_event_from_webhook(event).unwrap().unwrap();
        assert_eq!(converted.payment_ref, PaymentRef::from("pi_42"));
        assert_eq!(converted.kind, PaymentEventKind::PaymentFailed);
    }

    #[test]
    fn a_session_without_an_intent_is_malformed() {
        let event = WebhookEvent {
            id: "evt_3".to_string(),
            created: 0,
            payload: EventPayload::CheckoutAsyncPaymentFailed(session(None)),
        };
        assert!(payment_event_from_webhook(event).is_err());
    }

    #[test]
    fn unhandled_event_types_convert_to_none() {
        let event = WebhookEvent {
            id: "evt_4".to_string(),
            created: 0,
            payload: EventPayload::Unhandled("invoice.created".to_string()),
        };
        assert!(payment_event_from_webhook(event).unwrap().is_none());
    }
}
