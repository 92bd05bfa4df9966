use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use psg_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        OrderId        -------------------------------------------------------
/// The server-generated opaque identifier for an order. Clients and processor metadata carry this id around; the
/// numeric row id never leaves the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       PaymentRef       ------------------------------------------------------
/// The payment processor's opaque payment-intent identifier. This is the join key between inbound payment events and
/// local orders. Set exactly once on an order and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentRef(pub String);

impl<S: Into<String>> From<S> for PaymentRef {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for PaymentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PaymentRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      OrderStatus       ------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order has been created; no payment confirmation has been observed.
    Pending,
    /// A payment confirmation has been observed for the order.
    Paid,
    /// The seller has handed the order to the carrier.
    Shipped,
    /// The buyer has received the order.
    Delivered,
    /// The order was cancelled before payment settled, or the payment failed.
    Cancelled,
    /// The order was refunded after payment.
    Refunded,
}

impl OrderStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Delivered | OrderStatus::Refunded)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "Pending"),
            OrderStatus::Paid => write!(f, "Paid"),
            OrderStatus::Shipped => write!(f, "Shipped"),
            OrderStatus::Delivered => write!(f, "Delivered"),
            OrderStatus::Cancelled => write!(f, "Cancelled"),
            OrderStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatus::Pending
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------         Order          ------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub buyer_id: String,
    pub total_amount: Money,
    pub platform_commission: Money,
    /// The processor's payment-intent id. `None` until the payment session has been created.
    pub payment_ref: Option<PaymentRef>,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewOrder        ------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub buyer_id: String,
    /// The full price the buyer pays, snapshotted at purchase time.
    pub total_amount: Money,
    /// The platform's cut of `total_amount`, computed at creation and immutable thereafter.
    pub platform_commission: Money,
    pub currency: String,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, buyer_id: String, total_amount: Money, platform_commission: Money) -> Self {
        Self {
            order_id,
            buyer_id,
            total_amount,
            platform_commission,
            currency: psg_common::DEFAULT_CURRENCY_CODE.to_string(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, listing_id: String, quantity: i64, unit_price: Money) -> Self {
        self.items.push(NewOrderItem { listing_id, quantity, unit_price });
        self
    }
}

//--------------------------------------       OrderItem        ------------------------------------------------------
/// A line of an order. `unit_price` is the price snapshot taken when the order was placed; it does not track later
/// changes to the listing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub listing_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub listing_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

//--------------------------------------     ProcessedEvent     ------------------------------------------------------
/// A row in the idempotency ledger. At most one row ever exists per processor event id; the table is append-only.
#[derive(Debug, Clone, FromRow)]
pub struct ProcessedEvent {
    pub event_id: String,
    /// The order the event resolved to, or `None` for events referencing a payment the engine has never seen.
    pub order_id: Option<i64>,
    pub received_at: DateTime<Utc>,
}

//--------------------------------------    ListingSnapshot     ------------------------------------------------------
/// The read-only view of a catalog listing this subsystem consumes. Catalog management lives elsewhere; the only
/// fields that matter here are the current price and whether the seller can actually be paid.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub listing_id: String,
    /// The seller's payout account id at the payment processor.
    pub seller_account: String,
    pub unit_price: Money,
    pub active: bool,
    pub payouts_enabled: bool,
}

//--------------------------------------     PaymentEvent       ------------------------------------------------------
/// A payment-processor notification, already verified and parsed at the ingest boundary, reduced to the three facts
/// reconciliation needs: which delivery this is, which payment it concerns, and what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub event_id: String,
    pub payment_ref: PaymentRef,
    pub kind: PaymentEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    /// The hosted payment session completed with a settled payment.
    SessionCompleted,
    /// A delayed payment method (e.g. bank debit) eventually succeeded.
    AsyncPaymentSucceeded,
    /// A delayed payment method eventually failed.
    AsyncPaymentFailed,
    /// The payment intent itself was confirmed.
    PaymentConfirmed,
    /// The payment intent failed.
    PaymentFailed,
}

impl PaymentEventKind {
    /// The state machine row for this event type: the state the order must be in, and the state it moves to.
    /// Every payment event settles or annuls a `Pending` order; anything already past `Pending` treats the event as
    /// a benign no-op.
    pub fn transition(&self) -> (OrderStatus, OrderStatus) {
        match self {
            PaymentEventKind::SessionCompleted
            | PaymentEventKind::AsyncPaymentSucceeded
            | PaymentEventKind::PaymentConfirmed => (OrderStatus::Pending, OrderStatus::Paid),
            PaymentEventKind::AsyncPaymentFailed | PaymentEventKind::PaymentFailed => {
                (OrderStatus::Pending, OrderStatus::Cancelled)
            },
        }
    }
}

impl Display for PaymentEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentEventKind::SessionCompleted => write!(f, "session completed"),
            PaymentEventKind::AsyncPaymentSucceeded => write!(f, "async payment succeeded"),
            PaymentEventKind::AsyncPaymentFailed => write!(f, "async payment failed"),
            PaymentEventKind::PaymentConfirmed => write!(f, "payment confirmed"),
            PaymentEventKind::PaymentFailed => write!(f, "payment failed"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
    }

    #[test]
    fn every_payment_event_acts_on_pending_orders() {
        use PaymentEventKind::*;
        for kind in [SessionCompleted, AsyncPaymentSucceeded, AsyncPaymentFailed, PaymentConfirmed, PaymentFailed] {
            let (expected, next) = kind.transition();
            assert_eq!(expected, OrderStatus::Pending);
            assert!(matches!(next, OrderStatus::Paid | OrderStatus::Cancelled));
        }
    }

    #[test]
    fn success_events_settle_and_failure_events_annul() {
        assert_eq!(PaymentEventKind::SessionCompleted.transition().1, OrderStatus::Paid);
        assert_eq!(PaymentEventKind::AsyncPaymentSucceeded.transition().1, OrderStatus::Paid);
        assert_eq!(PaymentEventKind::PaymentConfirmed.transition().1, OrderStatus::Paid);
        assert_eq!(PaymentEventKind::AsyncPaymentFailed.transition().1, OrderStatus::Cancelled);
        assert_eq!(PaymentEventKind::PaymentFailed.transition().1, OrderStatus::Cancelled);
    }
}
