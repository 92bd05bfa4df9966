use chrono::Duration;
use log::*;
use settlement_engine::{db_types::Order, events::EventProducers, SettlementApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the stale-checkout sweeper. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// A pending order that never received a payment reference belongs to a checkout whose processor call failed or
/// timed out. No event can ever settle it, so after `older_than` of inactivity it is cancelled here. Orders that do
/// carry a reference are never touched; their events may simply be late.
pub fn start_sweeper(db: SqliteDatabase, producers: EventProducers, older_than: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        let api = SettlementApi::new(db, producers);
        info!("🕰️ Stale checkout sweeper started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running stale checkout sweep");
            match api.sweep_stale_checkouts(older_than).await {
                Ok(cancelled) if cancelled.is_empty() => trace!("🕰️ No stale checkouts found"),
                Ok(cancelled) => {
                    info!("🕰️ {} stale checkouts cancelled: {}", cancelled.len(), order_list(&cancelled));
                },
                Err(e) => {
                    error!("🕰️ Error running stale checkout sweep: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] order_id: {} buyer: {}", o.id, o.order_id, o.buyer_id))
        .collect::<Vec<String>>()
        .join(", ")
}
