use chrono::Duration;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderItem, OrderStatus, PaymentRef},
    traits::SettlementDbError,
};

/// Inserts a new order and its line items using the given connection. This is not atomic on its own. You can embed
/// this call inside a transaction if you need atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, SettlementDbError> {
    let NewOrder { order_id, buyer_id, total_amount, platform_commission, currency, items } = order;
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                buyer_id,
                total_amount,
                platform_commission,
                currency
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(buyer_id)
    .bind(total_amount.value())
    .bind(platform_commission.value())
    .bind(currency)
    .fetch_one(&mut *conn)
    .await?;
    for item in items {
        sqlx::query(
            r#"
                INSERT INTO order_items (order_id, listing_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4);
            "#,
        )
        .bind(order.id)
        .bind(item.listing_id)
        .bind(item.quantity)
        .bind(item.unit_price.value())
        .execute(&mut *conn)
        .await?;
    }
    debug!("📝️ Order {} inserted with id {}", order.order_id, order.id);
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_payment_ref(
    payment_ref: &PaymentRef,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE payment_ref = $1")
        .bind(payment_ref.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Attaches the payment reference to the order, provided the order is still `Pending` and no reference has been set.
/// Returns `None` when those preconditions do not hold. The UNIQUE constraint on `payment_ref` rejects a reference
/// that already belongs to another order.
pub async fn attach_payment_ref(
    order_id: &OrderId,
    payment_ref: &PaymentRef,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SettlementDbError> {
    let result = sqlx::query_as(
        "UPDATE orders SET payment_ref = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND status = \
         'Pending' AND payment_ref IS NULL RETURNING *",
    )
    .bind(payment_ref.as_str())
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            SettlementDbError::DuplicatePaymentRef(payment_ref.clone())
        },
        _ => SettlementDbError::from(e),
    })?;
    Ok(result)
}

/// Compare-and-set status advance: the update only lands when the order is still in the `expected` state. Returns
/// `None` on a miss, leaving the row untouched. This is the mutual-exclusion point for the whole state machine.
pub(crate) async fn update_status_if(
    id: i64,
    expected: OrderStatus,
    next: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SettlementDbError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND status = $3 RETURNING *",
    )
    .bind(next.to_string())
    .bind(id)
    .bind(expected.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Cancels pending orders that never received a payment reference and have been idle for longer than `limit`.
/// Referenced pending orders are left alone; their events may still arrive.
pub(crate) async fn cancel_stale_checkouts(
    limit: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SettlementDbError> {
    let rows = sqlx::query_as(
        format!(
            "UPDATE orders SET updated_at = CURRENT_TIMESTAMP, status = 'Cancelled' WHERE status = 'Pending' AND \
             payment_ref IS NULL AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at)) > {} RETURNING *;",
            limit.num_seconds()
        )
        .as_str(),
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
