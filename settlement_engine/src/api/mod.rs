mod errors;
mod settlement_api;

pub use errors::SettlementApiError;
pub use settlement_api::{CheckoutRequest, SettlementApi};
