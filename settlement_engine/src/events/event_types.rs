use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatus};

/// Emitted when a payment confirmation settles an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSettledEvent {
    pub order: Order,
}

impl OrderSettledEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when an order leaves the happy path: a failed payment, a cancellation or a refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatus,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}
