//! Tests for the fire-and-forget settlement hooks.
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use psg_common::Money;
use settlement_engine::{
    db_types::PaymentEventKind,
    events::{EventHandlers, EventHooks},
    SettlementApi,
};

mod support;
use support::prepare_env::{prepare_test_env, random_db_path};
use support::{event, tear_down, tracked_order};

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn settlement_and_annulment_fire_their_hooks() {
    let settled = HookCalled::default();
    let annulled = HookCalled::default();
    let settled_copy = settled.clone();
    let annulled_copy = annulled.clone();

    let mut hooks = EventHooks::default();
    hooks.on_order_settled(move |ev| {
        let counter = settled_copy.clone();
        Box::pin(async move {
            log::info!("🪝️ {:?}", ev.order.order_id);
            counter.called();
        })
    });
    hooks.on_order_annulled(move |ev| {
        let counter = annulled_copy.clone();
        Box::pin(async move {
            log::info!("🪝️ {:?} -> {}", ev.order.order_id, ev.status);
            counter.called();
        })
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = settlement_engine::SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let api = SettlementApi::new(db, producers);

    tracked_order(&api, "listing-1", Money::from_units(10), "pi_hook_paid").await;
    tracked_order(&api, "listing-2", Money::from_units(10), "pi_hook_failed").await;
    api.reconcile_event(event("evt_h1", "pi_hook_paid", PaymentEventKind::SessionCompleted)).await.unwrap();
    api.reconcile_event(event("evt_h2", "pi_hook_failed", PaymentEventKind::PaymentFailed)).await.unwrap();
    // A duplicate must not fire the hook again.
    api.reconcile_event(event("evt_h1", "pi_hook_paid", PaymentEventKind::SessionCompleted)).await.unwrap();

    // Hooks are fire-and-forget; give the handler tasks a moment to drain.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(settled.count(), 1);
    assert_eq!(annulled.count(), 1);
    tear_down(api).await;
}
