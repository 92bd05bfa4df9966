use sqlx::SqliteConnection;

use crate::{db_types::ListingSnapshot, traits::SettlementDbError};

pub async fn fetch_listing(
    listing_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ListingSnapshot>, sqlx::Error> {
    let listing =
        sqlx::query_as("SELECT * FROM listings WHERE listing_id = $1").bind(listing_id).fetch_optional(conn).await?;
    Ok(listing)
}

/// Writes a listing snapshot. The catalog subsystem owns this data; this entry point exists for the catalog sync
/// job and for test fixtures.
pub async fn upsert_listing(listing: &ListingSnapshot, conn: &mut SqliteConnection) -> Result<(), SettlementDbError> {
    sqlx::query(
        r#"
            INSERT INTO listings (listing_id, seller_account, unit_price, active, payouts_enabled)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (listing_id) DO UPDATE SET
                seller_account = excluded.seller_account,
                unit_price = excluded.unit_price,
                active = excluded.active,
                payouts_enabled = excluded.payouts_enabled,
                updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(&listing.listing_id)
    .bind(&listing.seller_account)
    .bind(listing.unit_price.value())
    .bind(listing.active)
    .bind(listing.payouts_enabled)
    .execute(conn)
    .await?;
    Ok(())
}
