//! Endpoint tests that exercise the HTTP surface against a real SQLite store: webhook signature enforcement, the
//! reconciliation contract of the events endpoint, and buyer authentication.
use actix_web::{test, web, App};
use chrono::Utc;
use hmac::{Hmac, Mac};
use psg_common::{CommissionRate, Money, Secret};
use settlement_engine::{
    db_types::{ListingSnapshot, OrderStatus, PaymentRef},
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::SettlementDatabase,
    CheckoutRequest,
    SettlementApi,
    SqliteDatabase,
};
use sha2::Sha256;
use stripe_tools::{StripeApi, StripeConfig};

use crate::{
    auth::{issue_access_token, BuyerClaims},
    config::{AuthConfig, ServerOptions},
    middleware::{SignatureMiddlewareFactory, SIGNATURE_HEADER},
    routes::{create_checkout_session, payment_webhook, update_fulfillment},
};

type HmacSha256 = Hmac<Sha256>;

const WEBHOOK_SECRET: &str = "whsec_endpoint_test_secret";
const JWT_SECRET: &str = "0123456789abcdef0123456789abcdef";

async fn test_api() -> SettlementApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    SettlementApi::new(db, EventProducers::default())
}

async fn tracked_order(api: &SettlementApi<SqliteDatabase>, buyer_id: &str, payment_ref: &str) {
    let listing = ListingSnapshot {
        listing_id: "listing-e2e".to_string(),
        seller_account: "acct_e2e".to_string(),
        unit_price: Money::from_units(100),
        active: true,
        payouts_enabled: true,
    };
    api.db().upsert_listing(&listing).await.unwrap();
    let request = CheckoutRequest {
        buyer_id: buyer_id.to_string(),
        listing_id: "listing-e2e".to_string(),
        quantity: 1,
        commission_rate: CommissionRate::from_basis_points(500).unwrap(),
    };
    let (order, _) = api.place_order(request).await.unwrap();
    api.attach_payment_ref(&order.order_id, &PaymentRef::from(payment_ref)).await.unwrap();
}

fn sign(payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn bearer(sub: &str) -> String {
    let claims = BuyerClaims { sub: sub.to_string(), exp: (Utc::now().timestamp() + 3_600) as usize };
    format!("Bearer {}", issue_access_token(&claims, JWT_SECRET).unwrap())
}

#[actix_web::test]
async fn event_deliveries_are_verified_and_reconciled() {
    let api = test_api().await;
    tracked_order(&api, "buyer-e2e", "pi_endpoint").await;
    let order = api.db().fetch_order_by_payment_ref(&PaymentRef::from("pi_endpoint")).await.unwrap().unwrap();

    let app = test::init_service(
        App::new().app_data(web::Data::new(api.clone())).service(
            web::scope("/payments")
                .wrap(SignatureMiddlewareFactory::new(
                    SIGNATURE_HEADER,
                    Secret::new(WEBHOOK_SECRET.to_string()),
                    300,
                    true,
                ))
                .service(web::resource("/events").route(web::post().to(payment_webhook::<SqliteDatabase>))),
        ),
    )
    .await;

    let body = serde_json::json!({
        "id": "evt_endpoint_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_endpoint_1",
            "payment_intent": "pi_endpoint",
            "status": "complete",
            "payment_status": "paid"
        }}
    })
    .to_string();

    // No signature header: rejected, no state touched.
    let req = test::TestRequest::post().uri("/payments/events").set_payload(body.clone()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);

    // Wrong secret: rejected, no state touched.
    let mut mac = HmacSha256::new_from_slice(b"not_the_secret").unwrap();
    let ts = Utc::now().timestamp();
    mac.update(format!("{ts}.").as_bytes());
    mac.update(body.as_bytes());
    let forged = format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()));
    let req = test::TestRequest::post()
        .uri("/payments/events")
        .insert_header((SIGNATURE_HEADER, forged))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);
    let current = api.db().fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(current.status, OrderStatus::Pending);
    assert!(api.db().fetch_processed_event("evt_endpoint_1").await.unwrap().is_none());

    // Valid signature: the order settles.
    let req = test::TestRequest::post()
        .uri("/payments/events")
        .insert_header((SIGNATURE_HEADER, sign(body.as_bytes(), Utc::now().timestamp())))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let current = api.db().fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(current.status, OrderStatus::Paid);

    // A redelivery acknowledges without applying twice.
    let req = test::TestRequest::post()
        .uri("/payments/events")
        .insert_header((SIGNATURE_HEADER, sign(body.as_bytes(), Utc::now().timestamp())))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);

    // An event type this gateway ignores is acknowledged so redelivery stops.
    let ignored = serde_json::json!({"id": "evt_other", "type": "invoice.created", "data": {"object": {}}}).to_string();
    let req = test::TestRequest::post()
        .uri("/payments/events")
        .insert_header((SIGNATURE_HEADER, sign(ignored.as_bytes(), Utc::now().timestamp())))
        .set_payload(ignored)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
}

#[actix_web::test]
async fn session_creation_requires_a_buyer_token() {
    let api = test_api().await;
    let stripe = StripeApi::new(StripeConfig::default()).unwrap();
    let auth = AuthConfig { jwt_secret: Secret::new(JWT_SECRET.to_string()) };
    let options =
        ServerOptions { commission_rate: CommissionRate::from_basis_points(500).unwrap() };
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(api.clone()))
            .app_data(web::Data::new(stripe))
            .app_data(web::Data::new(auth))
            .app_data(web::Data::new(options))
            .service(
                web::scope("/orders").service(
                    web::resource("/sessions").route(web::post().to(create_checkout_session::<SqliteDatabase>)),
                ),
            ),
    )
    .await;

    let body = serde_json::json!({"listing_id": "listing-none", "quantity": 1});
    let req = test::TestRequest::post().uri("/orders/sessions").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    let req = test::TestRequest::post()
        .uri("/orders/sessions")
        .insert_header(("Authorization", "Bearer not.a.token"))
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    // An authenticated request for a listing that does not exist fails validation, not authentication.
    let req = test::TestRequest::post()
        .uri("/orders/sessions")
        .insert_header(("Authorization", bearer("buyer-e2e")))
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn only_the_orders_buyer_may_drive_fulfilment() {
    let api = test_api().await;
    tracked_order(&api, "buyer-owner", "pi_fulfil").await;
    let order = api.db().fetch_order_by_payment_ref(&PaymentRef::from("pi_fulfil")).await.unwrap().unwrap();
    // Settle it so Shipped becomes reachable.
    api.reconcile_event(settlement_engine::db_types::PaymentEvent {
        event_id: "evt_fulfil".to_string(),
        payment_ref: PaymentRef::from("pi_fulfil"),
        kind: settlement_engine::db_types::PaymentEventKind::SessionCompleted,
    })
    .await
    .unwrap();

    let auth = AuthConfig { jwt_secret: Secret::new(JWT_SECRET.to_string()) };
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(api.clone()))
            .app_data(web::Data::new(auth))
            .service(web::scope("/orders").service(
                web::resource("/{order_id}/status").route(web::post().to(update_fulfillment::<SqliteDatabase>)),
            )),
    )
    .await;

    let uri = format!("/orders/{}/status", order.order_id.as_str());
    let body = serde_json::json!({"status": "Shipped"});

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("Authorization", bearer("buyer-impostor")))
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("Authorization", bearer("buyer-owner")))
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let current = api.db().fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(current.status, OrderStatus::Shipped);

    // Minting Paid by hand is never allowed.
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("Authorization", bearer("buyer-owner")))
        .set_json(&serde_json::json!({"status": "Paid"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 409);
}
