use crate::{db_types::ListingSnapshot, traits::SettlementDbError};

/// Read-only access to the marketplace catalog. Listing management belongs to another subsystem; the settlement
/// engine only ever snapshots a price and checks the seller's payout capability at purchase time.
#[allow(async_fn_in_trait)]
pub trait ListingCatalog: Clone {
    /// Returns the listing with the given id, or `None` if it does not exist.
    async fn fetch_listing(&self, listing_id: &str) -> Result<Option<ListingSnapshot>, SettlementDbError>;
}
