//! `SqliteDatabase` is a concrete implementation of a settlement engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the traits defined in the [`crate::traits`] module.
use std::fmt::Debug;

use chrono::Duration;
use log::*;
use sqlx::SqlitePool;

use super::db::{events, listings, orders};
use crate::{
    db_types::{
        ListingSnapshot,
        NewOrder,
        Order,
        OrderId,
        OrderItem,
        OrderStatus,
        PaymentEvent,
        PaymentRef,
        ProcessedEvent,
    },
    traits::{ListingCatalog, SettlementDatabase, SettlementDbError, TransitionOutcome},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SettlementDbError> {
        let pool = super::db::new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Entry point for the catalog sync job and for test fixtures. The settlement flows themselves never write
    /// listings.
    pub async fn upsert_listing(&self, listing: &ListingSnapshot) -> Result<(), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        listings::upsert_listing(listing, &mut conn).await
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_id, order.id);
        Ok(order)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_payment_ref(
        &self,
        payment_ref: &PaymentRef,
    ) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_payment_ref(payment_ref, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order: &Order) -> Result<Vec<OrderItem>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order.id, &mut conn).await?;
        Ok(items)
    }

    async fn attach_payment_ref(
        &self,
        order_id: &OrderId,
        payment_ref: &PaymentRef,
    ) -> Result<Order, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        match orders::attach_payment_ref(order_id, payment_ref, &mut tx).await? {
            Some(order) => {
                tx.commit().await?;
                debug!("🗃️ Payment reference {payment_ref} attached to order {order_id}");
                Ok(order)
            },
            None => {
                // Distinguish a missing order from one that is past the point of accepting a reference.
                let existing = orders::fetch_order_by_order_id(order_id, &mut tx).await?;
                match existing {
                    Some(_) => Err(SettlementDbError::PaymentRefNotAttachable(order_id.clone())),
                    None => Err(SettlementDbError::OrderNotFound(order_id.clone())),
                }
            },
        }
    }

    async fn apply_payment_event(
        &self,
        event: &PaymentEvent,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<TransitionOutcome, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        if events::fetch_processed(&event.event_id, &mut tx).await?.is_some() {
            trace!("🗃️ Event [{}] is already in the ledger", event.event_id);
            return Ok(TransitionOutcome::Duplicate);
        }
        let order = orders::fetch_order_by_payment_ref(&event.payment_ref, &mut tx).await?;
        let outcome = match order {
            None => {
                if !events::insert_processed(&event.event_id, None, &mut tx).await? {
                    return Ok(TransitionOutcome::Duplicate);
                }
                TransitionOutcome::UnknownPaymentRef
            },
            Some(order) => {
                // The ledger insert goes first so that a concurrent duplicate loses before any status write. An
                // early return drops the transaction, rolling everything back.
                if !events::insert_processed(&event.event_id, Some(order.id), &mut tx).await? {
                    return Ok(TransitionOutcome::Duplicate);
                }
                match orders::update_status_if(order.id, expected, next, &mut tx).await? {
                    Some(updated) => TransitionOutcome::Applied(updated),
                    None => TransitionOutcome::OutOfOrder(order),
                }
            },
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn advance_order_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::OrderNotFound(order_id.clone()))?;
        let updated = orders::update_status_if(order.id, expected, next, &mut tx).await?;
        tx.commit().await?;
        if let Some(order) = &updated {
            debug!("🗃️ Order {} moved from {expected} to {}", order.order_id, order.status);
        }
        Ok(updated)
    }

    async fn fetch_processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let event = events::fetch_processed(event_id, &mut conn).await?;
        Ok(event)
    }

    async fn cancel_stale_checkouts(&self, older_than: Duration) -> Result<Vec<Order>, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let cancelled = orders::cancel_stale_checkouts(older_than, &mut tx).await?;
        tx.commit().await?;
        Ok(cancelled)
    }

    async fn close(&mut self) -> Result<(), SettlementDbError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ListingCatalog for SqliteDatabase {
    async fn fetch_listing(&self, listing_id: &str) -> Result<Option<ListingSnapshot>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let listing = listings::fetch_listing(listing_id, &mut conn).await?;
        Ok(listing)
    }
}
