use std::fmt::Debug;

use chrono::Duration;
use log::*;
use psg_common::{split, CommissionRate, Money};

use crate::{
    db_types::{ListingSnapshot, NewOrder, Order, OrderId, OrderStatus, PaymentEvent, PaymentRef},
    events::{EventProducers, OrderAnnulledEvent, OrderSettledEvent},
    helpers::new_order_id,
    traits::{ListingCatalog, SettlementDatabase, TransitionOutcome},
    SettlementApiError,
};

/// A validated purchase request, ready to become a pending order.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub buyer_id: String,
    pub listing_id: String,
    pub quantity: i64,
    pub commission_rate: CommissionRate,
}

/// `SettlementApi` is the primary API for the order lifecycle: creating pending orders for a purchase, reconciling
/// payment-processor events into order state exactly once, and advancing settled orders through fulfilment.
pub struct SettlementApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for SettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B: Clone> Clone for SettlementApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> SettlementApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> SettlementApi<B>
where B: SettlementDatabase
{
    /// Reconcile a payment-processor event against the order it references.
    ///
    /// The state machine row for the event type is looked up, and the storage backend applies it atomically with the
    /// idempotency ledger write. Duplicates, late arrivals and unknown references all come back as successful
    /// outcomes; only storage failures bubble up, and those are retryable by the caller.
    pub async fn reconcile_event(&self, event: PaymentEvent) -> Result<TransitionOutcome, SettlementApiError> {
        let (expected, next) = event.kind.transition();
        let outcome = self.db.apply_payment_event(&event, expected, next).await?;
        match &outcome {
            TransitionOutcome::Applied(order) => {
                info!("🔄️ Event [{}] ({}): order {} is now {}", event.event_id, event.kind, order.order_id, next);
                match order.status {
                    OrderStatus::Paid => self.call_order_settled_hook(order).await,
                    OrderStatus::Cancelled => self.call_order_annulled_hook(order).await,
                    _ => {},
                }
            },
            TransitionOutcome::OutOfOrder(order) => {
                info!(
                    "🔄️ Event [{}] ({}) arrived for order {} in state {}. Nothing to do",
                    event.event_id, event.kind, order.order_id, order.status
                );
            },
            TransitionOutcome::Duplicate => {
                debug!("🔄️ Event [{}] has already been processed", event.event_id);
            },
            TransitionOutcome::UnknownPaymentRef => {
                warn!(
                    "🔄️ Event [{}] references payment {} which matches no order. Recorded for review",
                    event.event_id, event.payment_ref
                );
            },
        }
        Ok(outcome)
    }

    /// Attach the processor's payment reference to a freshly created order. This happens in its own short
    /// transaction after the processor call returns, and only succeeds while the order is still `Pending` with no
    /// reference, so the reference is set exactly once.
    pub async fn attach_payment_ref(
        &self,
        order_id: &OrderId,
        payment_ref: &PaymentRef,
    ) -> Result<Order, SettlementApiError> {
        let order = self.db.attach_payment_ref(order_id, payment_ref).await?;
        debug!("🔄️ Order {order_id} is now tracking payment {payment_ref}");
        Ok(order)
    }

    /// Advance an order along the fulfilment path. The target state determines the state the order must currently
    /// be in:
    ///
    /// | Target     | Required current state |
    /// |------------|------------------------|
    /// | Cancelled  | Pending                |
    /// | Shipped    | Paid                   |
    /// | Refunded   | Paid                   |
    /// | Delivered  | Shipped                |
    ///
    /// `Pending` and `Paid` are never valid targets here: an order only becomes `Paid` by observing a payment
    /// confirmation through [`Self::reconcile_event`].
    pub async fn advance_fulfillment(
        &self,
        order_id: &OrderId,
        target: OrderStatus,
    ) -> Result<Order, SettlementApiError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| SettlementApiError::OrderNotFound(order_id.clone()))?;
        let expected = match target {
            OrderStatus::Cancelled => OrderStatus::Pending,
            OrderStatus::Shipped | OrderStatus::Refunded => OrderStatus::Paid,
            OrderStatus::Delivered => OrderStatus::Shipped,
            OrderStatus::Pending | OrderStatus::Paid => {
                return Err(SettlementApiError::TransitionForbidden { from: order.status, to: target })
            },
        };
        match self.db.advance_order_status(order_id, expected, target).await? {
            Some(updated) => {
                info!("🔄️ Order {order_id} moved to {} via fulfilment", updated.status);
                if matches!(updated.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
                    self.call_order_annulled_hook(&updated).await;
                }
                Ok(updated)
            },
            // The CAS missed: the order moved between the read and the write, or was never in `expected`.
            None => {
                let current = self
                    .db
                    .fetch_order_by_order_id(order_id)
                    .await?
                    .map(|o| o.status)
                    .unwrap_or(order.status);
                Err(SettlementApiError::TransitionForbidden { from: current, to: target })
            },
        }
    }

    /// Cancel pending orders whose processor call never produced a payment reference. These checkouts can never be
    /// settled by an event, so after `older_than` of inactivity they are swept into `Cancelled`.
    pub async fn sweep_stale_checkouts(&self, older_than: Duration) -> Result<Vec<Order>, SettlementApiError> {
        let cancelled = self.db.cancel_stale_checkouts(older_than).await?;
        for order in &cancelled {
            self.call_order_annulled_hook(order).await;
        }
        Ok(cancelled)
    }

    async fn call_order_settled_hook(&self, order: &Order) {
        for emitter in &self.producers.order_settled_producer {
            debug!("🔄️ Notifying order settled hook subscribers");
            let event = OrderSettledEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_order_annulled_hook(&self, order: &Order) {
        for emitter in &self.producers.order_annulled_producer {
            debug!("🔄️ Notifying order annulled hook subscribers");
            let event = OrderAnnulledEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }
}

impl<B> SettlementApi<B>
where B: SettlementDatabase + ListingCatalog
{
    /// Turn a purchase request into a pending order.
    ///
    /// The listing price is snapshotted, the commission split computed, and the order created with its line item in
    /// one local transaction. The processor has not been contacted yet when this returns; the caller follows up with
    /// the payment-session call and [`Self::attach_payment_ref`]. If that second step never happens the order stays
    /// `Pending` with no reference and the stale-checkout sweeper cancels it later. That split is deliberate: a
    /// local commit followed by a failed external call leaves nothing to reconcile, whereas the reverse order could
    /// leak a live payment session with no order to settle into.
    pub async fn place_order(
        &self,
        request: CheckoutRequest,
    ) -> Result<(Order, ListingSnapshot), SettlementApiError> {
        let CheckoutRequest { buyer_id, listing_id, quantity, commission_rate } = request;
        if quantity < 1 {
            return Err(SettlementApiError::InvalidQuantity(quantity));
        }
        let listing = self
            .db
            .fetch_listing(&listing_id)
            .await?
            .filter(|l| l.active)
            .ok_or_else(|| SettlementApiError::ListingUnavailable(listing_id.clone()))?;
        if !listing.payouts_enabled {
            return Err(SettlementApiError::SellerNotOnboarded(listing_id));
        }
        let total: Money = listing.unit_price * quantity;
        let commission = split(total, commission_rate);
        let order = NewOrder::new(new_order_id(), buyer_id, total, commission.platform_fee).with_item(
            listing.listing_id.clone(),
            quantity,
            listing.unit_price,
        );
        let order = self.db.create_order(order).await?;
        info!(
            "🔄️ Order {} created for buyer {}: {} total, {} platform commission",
            order.order_id, order.buyer_id, order.total_amount, order.platform_commission
        );
        Ok((order, listing))
    }
}
