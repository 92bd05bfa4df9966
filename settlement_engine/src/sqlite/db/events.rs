use sqlx::SqliteConnection;

use crate::{db_types::ProcessedEvent, traits::SettlementDbError};

pub async fn fetch_processed(
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ProcessedEvent>, sqlx::Error> {
    let event = sqlx::query_as("SELECT * FROM processed_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(conn)
        .await?;
    Ok(event)
}

/// Appends a row to the idempotency ledger. Returns `false` if the event id is already recorded, which is how a
/// concurrent duplicate delivery loses the race: the PRIMARY KEY makes the second insert a no-op the caller can
/// observe and roll back around.
pub async fn insert_processed(
    event_id: &str,
    order_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<bool, SettlementDbError> {
    let result = sqlx::query("INSERT INTO processed_events (event_id, order_id) VALUES ($1, $2)")
        .bind(event_id)
        .bind(order_id)
        .execute(conn)
        .await;
    match result {
        Ok(_) => Ok(true),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
        Err(e) => Err(e.into()),
    }
}
