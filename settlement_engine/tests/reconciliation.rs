//! Integration tests for the event reconciliation flow: idempotence, ordering, unknown references and race safety.
use psg_common::Money;
use settlement_engine::{
    db_types::{OrderStatus, PaymentEvent, PaymentEventKind},
    traits::{SettlementDatabase, TransitionOutcome},
    SettlementApi,
    SettlementApiError,
    SqliteDatabase,
};

mod support;
use support::{event, fetch_order, setup, tear_down, tracked_order};

async fn ledger_rows(api: &SettlementApi<SqliteDatabase>) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM processed_events")
        .fetch_one(api.db().pool())
        .await
        .expect("Error counting ledger rows")
}

async fn order_rows(api: &SettlementApi<SqliteDatabase>) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders").fetch_one(api.db().pool()).await.expect("Error counting orders")
}

/// Deliver an event the way the processor would: retrying for as long as the engine reports a transient failure.
async fn deliver(api: &SettlementApi<SqliteDatabase>, event: &PaymentEvent) -> TransitionOutcome {
    loop {
        match api.reconcile_event(event.clone()).await {
            Ok(outcome) => return outcome,
            Err(e) if e.is_transient() => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
            Err(e) => panic!("Unexpected terminal error: {e}"),
        }
    }
}

#[tokio::test]
async fn a_completed_session_settles_a_pending_order() {
    let api = setup().await;
    let order = tracked_order(&api, "listing-1", Money::from_units(100), "pi_settle_1").await;
    assert_eq!(order.status, OrderStatus::Pending);

    let outcome = deliver(&api, &event("evt_1", "pi_settle_1", PaymentEventKind::SessionCompleted)).await;
    assert!(outcome.is_applied());
    let order = fetch_order(&api, &order.order_id).await;
    assert_eq!(order.status, OrderStatus::Paid);
    let ledger = api.db().fetch_processed_event("evt_1").await.unwrap().expect("Ledger row should exist");
    assert_eq!(ledger.order_id, Some(order.id));
    tear_down(api).await;
}

#[tokio::test]
async fn duplicate_deliveries_are_applied_exactly_once() {
    let api = setup().await;
    let order = tracked_order(&api, "listing-1", Money::from_units(100), "pi_dup_1").await;

    let ev = event("evt_dup", "pi_dup_1", PaymentEventKind::PaymentConfirmed);
    let first = deliver(&api, &ev).await;
    let second = deliver(&api, &ev).await;
    let third = deliver(&api, &ev).await;

    assert!(first.is_applied());
    assert!(matches!(second, TransitionOutcome::Duplicate));
    assert!(matches!(third, TransitionOutcome::Duplicate));
    assert_eq!(fetch_order(&api, &order.order_id).await.status, OrderStatus::Paid);
    assert_eq!(ledger_rows(&api).await, 1);
    tear_down(api).await;
}

#[tokio::test]
async fn the_first_applied_event_wins_when_deliveries_conflict() {
    let api = setup().await;
    let order = tracked_order(&api, "listing-1", Money::from_units(50), "pi_conflict").await;

    // The failure arrives first (out of causal order); the success must then be a benign no-op.
    let failed = deliver(&api, &event("evt_f", "pi_conflict", PaymentEventKind::AsyncPaymentFailed)).await;
    let completed = deliver(&api, &event("evt_s", "pi_conflict", PaymentEventKind::SessionCompleted)).await;

    assert!(failed.is_applied());
    match completed {
        TransitionOutcome::OutOfOrder(o) => assert_eq!(o.status, OrderStatus::Cancelled),
        other => panic!("Expected a benign no-op, got {other:?}"),
    }
    assert_eq!(fetch_order(&api, &order.order_id).await.status, OrderStatus::Cancelled);
    // Both events were recorded, so neither will be redelivered.
    assert_eq!(ledger_rows(&api).await, 2);
    tear_down(api).await;
}

#[tokio::test]
async fn replaying_a_history_in_any_order_gives_the_same_final_state() {
    // A settled order's real event history: the session completion and the intent confirmation, plus redeliveries.
    let history = [
        ("evt_a", PaymentEventKind::SessionCompleted),
        ("evt_b", PaymentEventKind::PaymentConfirmed),
        ("evt_a", PaymentEventKind::SessionCompleted),
        ("evt_b", PaymentEventKind::PaymentConfirmed),
    ];
    let permutations: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];
    for order_of_delivery in permutations {
        let api = setup().await;
        let order = tracked_order(&api, "listing-1", Money::from_units(10), "pi_replay").await;
        for idx in order_of_delivery {
            let (id, kind) = history[idx];
            deliver(&api, &event(id, "pi_replay", kind)).await;
        }
        assert_eq!(fetch_order(&api, &order.order_id).await.status, OrderStatus::Paid);
        assert_eq!(ledger_rows(&api).await, 2);
        tear_down(api).await;
    }
}

#[tokio::test]
async fn unknown_payment_refs_are_acknowledged_without_touching_orders() {
    let api = setup().await;
    let outcome = deliver(&api, &event("evt_orphan", "pi_never_seen", PaymentEventKind::SessionCompleted)).await;
    assert!(matches!(outcome, TransitionOutcome::UnknownPaymentRef));
    assert_eq!(order_rows(&api).await, 0);
    let ledger = api.db().fetch_processed_event("evt_orphan").await.unwrap().expect("Ledger row should exist");
    assert_eq!(ledger.order_id, None);
    // A redelivery of the same orphan is a duplicate, not a second row.
    let again = deliver(&api, &event("evt_orphan", "pi_never_seen", PaymentEventKind::SessionCompleted)).await;
    assert!(matches!(again, TransitionOutcome::Duplicate));
    assert_eq!(ledger_rows(&api).await, 1);
    tear_down(api).await;
}

#[tokio::test]
async fn an_order_cannot_skip_the_payment_confirmation() {
    let api = setup().await;
    let order = tracked_order(&api, "listing-1", Money::from_units(10), "pi_skip").await;
    // Fulfilment cannot move a Pending order anywhere but Cancelled, and can never mint a Paid state.
    for target in [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Refunded] {
        let err = api.advance_fulfillment(&order.order_id, target).await.unwrap_err();
        assert!(matches!(err, SettlementApiError::TransitionForbidden { .. }), "{target} should be forbidden");
    }
    assert_eq!(fetch_order(&api, &order.order_id).await.status, OrderStatus::Pending);
    tear_down(api).await;
}

#[tokio::test]
async fn concurrent_conflicting_deliveries_produce_exactly_one_winner() {
    let api = setup().await;
    let order = tracked_order(&api, "listing-1", Money::from_units(75), "pi_race").await;

    let success = event("evt_race_s", "pi_race", PaymentEventKind::SessionCompleted);
    let failure = event("evt_race_f", "pi_race", PaymentEventKind::AsyncPaymentFailed);
    let api_a = api.clone();
    let api_b = api.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { deliver(&api_a, &success).await }),
        tokio::spawn(async move { deliver(&api_b, &failure).await }),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let winners = [&a, &b].iter().filter(|o| o.is_applied()).count();
    assert_eq!(winners, 1, "exactly one of the two conflicting events may win: {a:?} / {b:?}");
    let final_status = fetch_order(&api, &order.order_id).await.status;
    match (&a, &b) {
        (TransitionOutcome::Applied(o), TransitionOutcome::OutOfOrder(_)) => assert_eq!(final_status, o.status),
        (TransitionOutcome::OutOfOrder(_), TransitionOutcome::Applied(o)) => assert_eq!(final_status, o.status),
        other => panic!("Unexpected outcome pair: {other:?}"),
    }
    assert!(matches!(final_status, OrderStatus::Paid | OrderStatus::Cancelled));
    assert_eq!(ledger_rows(&api).await, 2);
    tear_down(api).await;
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_record_one_ledger_row() {
    let api = setup().await;
    let order = tracked_order(&api, "listing-1", Money::from_units(20), "pi_dup_race").await;

    let ev = event("evt_same", "pi_dup_race", PaymentEventKind::SessionCompleted);
    let ev_clone = ev.clone();
    let api_a = api.clone();
    let api_b = api.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { deliver(&api_a, &ev).await }),
        tokio::spawn(async move { deliver(&api_b, &ev_clone).await }),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(outcomes.iter().filter(|o| o.is_applied()).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| matches!(o, TransitionOutcome::Duplicate)).count(), 1);
    assert_eq!(fetch_order(&api, &order.order_id).await.status, OrderStatus::Paid);
    assert_eq!(ledger_rows(&api).await, 1);
    tear_down(api).await;
}
