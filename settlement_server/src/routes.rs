//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Handlers are generic over the storage backend, so they are registered with a concrete turbofish
//! (e.g. `create_checkout_session::<SqliteDatabase>`) in [`crate::server`].
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use settlement_engine::{
    db_types::{OrderId, OrderStatus, PaymentRef},
    traits::{ListingCatalog, SettlementDatabase, TransitionOutcome},
    CheckoutRequest,
    SettlementApi,
};
use stripe_tools::{webhook, NewCheckoutSession, SessionStatus, StripeApi, StripeApiError};

use crate::{
    auth::BuyerClaims,
    config::ServerOptions,
    data_objects::{FulfillmentRequest, JsonResponse, NewSessionRequest, SessionResponse},
    errors::ServerError,
    integrations::stripe::payment_event_from_webhook,
};

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ------------------------------------------   Session creation  ----------------------------------------------
/// `POST /orders/sessions`
///
/// Creates the pending order locally, then asks the processor for a payment session, and finally pins the returned
/// payment-intent reference onto the order. If the processor call fails the order is left pending and unreferenced;
/// nothing exists on the processor side to reconcile, and the stale-checkout sweeper cancels the order later.
pub async fn create_checkout_session<B>(
    claims: BuyerClaims,
    body: web::Json<NewSessionRequest>,
    api: web::Data<SettlementApi<B>>,
    stripe: web::Data<StripeApi>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase + ListingCatalog + 'static,
{
    let NewSessionRequest { listing_id, quantity } = body.into_inner();
    debug!("💻️ Buyer {} requests a session for {quantity} x listing {listing_id}", claims.sub);
    let request = CheckoutRequest {
        buyer_id: claims.sub,
        listing_id: listing_id.clone(),
        quantity,
        commission_rate: options.commission_rate,
    };
    let (order, listing) = api.place_order(request).await?;
    let session_request = NewCheckoutSession {
        currency: order.currency.clone(),
        product_name: format!("Listing {listing_id}"),
        unit_amount: listing.unit_price,
        quantity,
        platform_fee: order.platform_commission,
        destination_account: listing.seller_account,
        order_id: order.order_id.as_str().to_string(),
    };
    let session = match stripe.create_checkout_session(&session_request).await {
        Ok(session) => session,
        Err(e) => {
            warn!(
                "💻️ Could not create a payment session for order {}. {e}. The order stays pending without a \
                 reference and will be swept if nothing arrives.",
                order.order_id
            );
            return Err(ServerError::PaymentProcessorError(e.to_string()));
        },
    };
    let payment_ref = session
        .payment_intent
        .as_deref()
        .map(PaymentRef::from)
        .ok_or_else(|| ServerError::PaymentProcessorError(format!("Session {} has no payment intent", session.id)))?;
    let order = api.attach_payment_ref(&order.order_id, &payment_ref).await?;
    info!("💻️ Session {} opened for order {}", session.id, order.order_id);
    let response =
        SessionResponse { session_handle: session.id, checkout_url: session.url, order_id: order.order_id };
    Ok(HttpResponse::Created().json(response))
}

// -------------------------------------------   Event ingestion  ----------------------------------------------
/// `POST /payments/events`
///
/// The signature middleware has already authenticated the payload by the time this handler runs. Responses follow
/// the processor's retry contract: a 2xx acknowledges the delivery and stops redelivery, anything else asks for a
/// retry. Only transient local failures answer with a non-2xx; everything that can never succeed is acknowledged as
/// a no-op so the processor does not retry in vain.
pub async fn payment_webhook<B>(body: web::Bytes, api: web::Data<SettlementApi<B>>) -> HttpResponse
where B: SettlementDatabase + 'static {
    let event = match webhook::parse_event(body.as_ref()) {
        Ok(event) => event,
        Err(e) => {
            warn!("🔔️ Discarding malformed payment event: {e}");
            return HttpResponse::Ok().json(JsonResponse::failure("Malformed event payload."));
        },
    };
    let event_id = event.id.clone();
    let payment_event = match payment_event_from_webhook(event) {
        Ok(Some(payment_event)) => payment_event,
        Ok(None) => {
            debug!("🔔️ Ignoring event [{event_id}]: not a type this gateway reconciles");
            return HttpResponse::Ok().json(JsonResponse::success("Event type ignored."));
        },
        Err(e) => {
            warn!("🔔️ Discarding unusable payment event [{event_id}]: {e}");
            return HttpResponse::Ok().json(JsonResponse::failure("Event carries no usable payment reference."));
        },
    };
    match api.reconcile_event(payment_event).await {
        Ok(TransitionOutcome::Applied(order)) => {
            HttpResponse::Ok().json(JsonResponse::success(format!("Order {} is now {}.", order.order_id, order.status)))
        },
        Ok(TransitionOutcome::OutOfOrder(_)) => HttpResponse::Ok().json(JsonResponse::success("Already settled.")),
        Ok(TransitionOutcome::Duplicate) => HttpResponse::Ok().json(JsonResponse::success("Already processed.")),
        Ok(TransitionOutcome::UnknownPaymentRef) => {
            HttpResponse::Ok().json(JsonResponse::success("Recorded; no matching order."))
        },
        Err(e) if e.is_transient() => {
            warn!("🔔️ Transient failure while reconciling event [{event_id}]: {e}. Requesting redelivery");
            HttpResponse::ServiceUnavailable().json(JsonResponse::failure("Temporary failure. Please redeliver."))
        },
        Err(e) => {
            warn!("🔔️ Unexpected error while handling payment event [{event_id}]: {e}");
            HttpResponse::Ok().json(JsonResponse::failure("Unexpected error handling event."))
        },
    }
}

// --------------------------------------------   Status probe   -----------------------------------------------
/// `GET /orders/sessions/{handle}/status`
///
/// A synchronous read against the processor, for clients that return from the redirect before the asynchronous
/// event has landed. This path never mutates the order. When the processor already reports a settled payment that
/// the local order does not reflect, the discrepancy is logged and nothing else; reconciliation stays the webhook
/// path's job, so there is only ever one writer to the state machine.
pub async fn session_status<B>(
    path: web::Path<String>,
    api: web::Data<SettlementApi<B>>,
    stripe: web::Data<StripeApi>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase + 'static,
{
    let handle = path.into_inner();
    trace!("💻️ Status probe for session {handle}");
    let session = stripe.fetch_checkout_session(&handle).await.map_err(|e| match e {
        StripeApiError::QueryError { status: 404, .. } => ServerError::NoRecordFound(format!("session {handle}")),
        e => ServerError::PaymentProcessorError(e.to_string()),
    })?;
    let status = SessionStatus::from(&session);
    if status.payment_status == "paid" {
        if let Some(payment_intent) = session.payment_intent.as_deref() {
            match api.db().fetch_order_by_payment_ref(&PaymentRef::from(payment_intent)).await {
                Ok(Some(order)) if order.status == OrderStatus::Pending => warn!(
                    "💻️ Session {handle} reports a settled payment but order {} is still Pending. The asynchronous \
                     event has not arrived (or has been lost); leaving the order for the webhook path to settle.",
                    order.order_id
                ),
                Ok(_) => {},
                Err(e) => warn!("💻️ Could not cross-check the local order for session {handle}: {e}"),
            }
        }
    }
    Ok(HttpResponse::Ok().json(status))
}

// ---------------------------------------------   Fulfilment   ------------------------------------------------
/// `POST /orders/{order_id}/status`
///
/// Drives the post-settlement half of the state machine (and pre-settlement cancellation). Only the order's buyer
/// may act on it. A `Paid` status can never be requested here; that transition belongs exclusively to the
/// reconciliation path.
pub async fn update_fulfillment<B>(
    claims: BuyerClaims,
    path: web::Path<String>,
    body: web::Json<FulfillmentRequest>,
    api: web::Data<SettlementApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase + 'static,
{
    let order_id = OrderId::from(path.into_inner());
    let target = body.into_inner().status;
    let order = api
        .db()
        .fetch_order_by_order_id(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("order {order_id}")))?;
    if order.buyer_id != claims.sub {
        return Err(ServerError::InsufficientPermissions(format!("Order {order_id} belongs to another buyer.")));
    }
    let updated = api.advance_fulfillment(&order_id, target).await?;
    info!("💻️ Order {} moved to {} on request of buyer {}", updated.order_id, updated.status, claims.sub);
    Ok(HttpResponse::Ok().json(updated))
}
