use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::info;
use settlement_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    SettlementApi,
    SqliteDatabase,
};
use stripe_tools::StripeApi;

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    middleware::{SignatureMiddlewareFactory, SIGNATURE_HEADER},
    routes::{create_checkout_session, health, payment_webhook, session_status, update_fulfillment},
    sweeper::start_sweeper,
};

pub async fn run_server(config: ServerConfig, hooks: EventHooks) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(32, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _sweeper = start_sweeper(db.clone(), producers.clone(), config.stale_checkout_timeout);
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let stripe_api =
        StripeApi::new(config.stripe.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let options = ServerOptions::from_config(&config);
    let host = config.host.clone();
    let port = config.port;
    info!("💻️ Listening on {host}:{port}");
    let srv = HttpServer::new(move || {
        let api = SettlementApi::new(db.clone(), producers.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("psg::access_log"))
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(stripe_api.clone()))
            .app_data(web::Data::new(config.auth.clone()))
            .app_data(web::Data::new(options));
        let orders_scope = web::scope("/orders")
            .service(web::resource("/sessions").route(web::post().to(create_checkout_session::<SqliteDatabase>)))
            .service(
                web::resource("/sessions/{handle}/status").route(web::get().to(session_status::<SqliteDatabase>)),
            )
            .service(web::resource("/{order_id}/status").route(web::post().to(update_fulfillment::<SqliteDatabase>)));
        // Event deliveries carry no bearer token; the signature over the raw body is the only authentication.
        let payments_scope = web::scope("/payments")
            .wrap(SignatureMiddlewareFactory::new(
                SIGNATURE_HEADER,
                config.stripe.webhook_secret.clone(),
                config.signature_tolerance_secs,
                config.signature_checks,
            ))
            .service(web::resource("/events").route(web::post().to(payment_webhook::<SqliteDatabase>)));
        app.service(health).service(orders_scope).service(payments_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
