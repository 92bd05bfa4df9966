pub mod prepare_env;

use psg_common::Money;
use settlement_engine::{
    db_types::{ListingSnapshot, Order, OrderId, PaymentEvent, PaymentEventKind, PaymentRef},
    events::EventProducers,
    SettlementApi,
    SqliteDatabase,
};

use crate::support::prepare_env::{prepare_test_env, random_db_path};

pub async fn setup() -> SettlementApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    SettlementApi::new(db, EventProducers::default())
}

pub async fn tear_down(mut api: SettlementApi<SqliteDatabase>) {
    use settlement_engine::traits::SettlementDatabase;
    use sqlx::migrate::MigrateDatabase;
    let url = api.db().url().to_string();
    if let Err(e) = api.db_mut().close().await {
        log::error!("🚀️ Failed to close database: {e}");
    }
    sqlx::Sqlite::drop_database(&url).await.unwrap();
}

pub async fn seed_listing(api: &SettlementApi<SqliteDatabase>, listing_id: &str, unit_price: Money) {
    let listing = ListingSnapshot {
        listing_id: listing_id.to_string(),
        seller_account: format!("acct_{listing_id}"),
        unit_price,
        active: true,
        payouts_enabled: true,
    };
    api.db().upsert_listing(&listing).await.expect("Error seeding listing");
}

/// Creates a `Pending` order for a fresh listing and attaches the given payment reference, so tests can deliver
/// events against it straight away.
pub async fn tracked_order(
    api: &SettlementApi<SqliteDatabase>,
    listing_id: &str,
    unit_price: Money,
    payment_ref: &str,
) -> Order {
    use psg_common::CommissionRate;
    use settlement_engine::CheckoutRequest;
    seed_listing(api, listing_id, unit_price).await;
    let request = CheckoutRequest {
        buyer_id: "buyer-1".to_string(),
        listing_id: listing_id.to_string(),
        quantity: 1,
        commission_rate: CommissionRate::from_basis_points(500).unwrap(),
    };
    let (order, _listing) = api.place_order(request).await.expect("Error placing order");
    api.attach_payment_ref(&order.order_id, &PaymentRef::from(payment_ref))
        .await
        .expect("Error attaching payment ref")
}

pub fn event(event_id: &str, payment_ref: &str, kind: PaymentEventKind) -> PaymentEvent {
    PaymentEvent { event_id: event_id.to_string(), payment_ref: PaymentRef::from(payment_ref), kind }
}

pub async fn fetch_order(api: &SettlementApi<SqliteDatabase>, order_id: &OrderId) -> Order {
    use settlement_engine::traits::SettlementDatabase;
    api.db().fetch_order_by_order_id(order_id).await.expect("Error fetching order").expect("Order should exist")
}
