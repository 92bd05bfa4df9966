use chrono::Duration;
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderItem, OrderStatus, PaymentEvent, PaymentRef, ProcessedEvent},
    traits::TransitionOutcome,
};

/// This trait defines the storage behaviour for the settlement engine.
///
/// The contract revolves around two hard guarantees:
/// * A payment reference is attached to an order at most once, while the order is still `Pending`.
/// * An event is applied at most once, and the idempotency ledger row commits in the same transaction as the order
///   mutation it accounts for. A crash between the two cannot produce a processed-but-unapplied (or
///   applied-but-unrecorded) event.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Creates a new `Pending` order together with its items in a single atomic transaction.
    async fn create_order(&self, order: NewOrder) -> Result<Order, SettlementDbError>;

    /// Returns the order with the given public order id, if one exists.
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, SettlementDbError>;

    /// Returns the order carrying the given payment reference, if one exists. This is the reconciliation lookup; an
    /// absent order is an ordinary result here, not an error.
    async fn fetch_order_by_payment_ref(
        &self,
        payment_ref: &PaymentRef,
    ) -> Result<Option<Order>, SettlementDbError>;

    /// Returns the items belonging to the given order.
    async fn fetch_order_items(&self, order: &Order) -> Result<Vec<OrderItem>, SettlementDbError>;

    /// Attaches the processor's payment reference to an order. The write only succeeds while the order is still
    /// `Pending` with no reference attached; any other state is an error, so the reference is set exactly once.
    async fn attach_payment_ref(
        &self,
        order_id: &OrderId,
        payment_ref: &PaymentRef,
    ) -> Result<Order, SettlementDbError>;

    /// Applies a payment event in a single atomic transaction:
    /// 1. If the event id is already in the ledger, nothing happens and `Duplicate` is returned.
    /// 2. If no order carries the event's payment reference, a ledger row with no order is written and
    ///    `UnknownPaymentRef` is returned.
    /// 3. Otherwise the ledger row is written and the order status is advanced from `expected` to `next` with a
    ///    compare-and-set; a miss leaves the order untouched and returns `OutOfOrder`.
    ///
    /// Storage failures roll the whole transaction back and record nothing, so the delivery stays retryable.
    async fn apply_payment_event(
        &self,
        event: &PaymentEvent,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<TransitionOutcome, SettlementDbError>;

    /// Advances an order from `expected` to `next` with a compare-and-set. Returns the updated order, or `None` when
    /// the order was not in the expected state. Used by the fulfilment flow; payment events go through
    /// [`Self::apply_payment_event`] instead.
    async fn advance_order_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>, SettlementDbError>;

    /// Returns the ledger row for the given processor event id, if the event has been processed.
    async fn fetch_processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>, SettlementDbError>;

    /// Cancels `Pending` orders that never received a payment reference and have not been touched for longer than
    /// `older_than`. These are checkouts whose processor call failed or timed out; without a reference no event can
    /// ever settle them. Returns the cancelled orders.
    async fn cancel_stale_checkouts(&self, older_than: Duration) -> Result<Vec<Order>, SettlementDbError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementDbError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettlementDbError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("Order {0} is not awaiting a payment reference")]
    PaymentRefNotAttachable(OrderId),
    #[error("Payment reference {0} is already attached to another order")]
    DuplicatePaymentRef(PaymentRef),
}

impl SettlementDbError {
    /// True for failures worth retrying: lock contention, pool exhaustion, storage unavailability. The remaining
    /// variants describe requests that can never succeed and must not be redelivered.
    pub fn is_transient(&self) -> bool {
        matches!(self, SettlementDbError::DatabaseError(_))
    }
}

impl From<sqlx::Error> for SettlementDbError {
    fn from(e: sqlx::Error) -> Self {
        SettlementDbError::DatabaseError(e.to_string())
    }
}
