use std::fmt::Display;

use serde::{Deserialize, Serialize};
use settlement_engine::db_types::{OrderId, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionRequest {
    pub listing_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    /// The processor's session id. The client uses this to resume checkout and to poll the status endpoint.
    pub session_handle: String,
    /// The hosted checkout page the buyer should be redirected to.
    pub checkout_url: Option<String>,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}
