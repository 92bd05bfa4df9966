use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatus},
    traits::SettlementDbError,
};

#[derive(Debug, Clone, Error)]
pub enum SettlementApiError {
    #[error("{0}")]
    DatabaseError(#[from] SettlementDbError),
    #[error("Listing {0} does not exist or is not for sale")]
    ListingUnavailable(String),
    #[error("The seller for listing {0} cannot receive payouts yet")]
    SellerNotOnboarded(String),
    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("An order in state {from} cannot move to {to}")]
    TransitionForbidden { from: OrderStatus, to: OrderStatus },
}

impl SettlementApiError {
    /// Transient errors should surface as retryable to whoever bears the retry policy. Everything else is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            SettlementApiError::DatabaseError(e) => e.is_transient(),
            _ => false,
        }
    }
}
