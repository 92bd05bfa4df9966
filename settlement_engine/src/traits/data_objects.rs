use crate::db_types::Order;

/// The result of trying to apply a payment event to the order it references. Only `Applied` mutates anything; the
/// other outcomes exist so that duplicate, late and unresolvable deliveries can all be acknowledged as successes.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The precondition held and the order moved to its new status.
    Applied(Order),
    /// The order was already past the expected state. Nothing was mutated, but the event was recorded as processed.
    /// Carries the order as it stood when the event arrived.
    OutOfOrder(Order),
    /// The event id was already in the idempotency ledger.
    Duplicate,
    /// No order carries the referenced payment. The event was recorded against no order and flagged for review.
    UnknownPaymentRef,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}
