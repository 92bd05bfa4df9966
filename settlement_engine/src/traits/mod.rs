//! The behaviour contracts a storage backend must satisfy to drive the settlement engine.
mod data_objects;
mod listing_catalog;
mod settlement_database;

pub use data_objects::TransitionOutcome;
pub use listing_catalog::ListingCatalog;
pub use settlement_database::{SettlementDatabase, SettlementDbError};
