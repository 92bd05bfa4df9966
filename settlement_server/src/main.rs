use dotenvy::dotenv;
use log::info;
use settlement_engine::events::EventHooks;
use settlement_server::{config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();

    // Notification delivery is a fire-and-forget sink. Until a real mailer is wired in, settlements and annulments
    // are just logged.
    let mut hooks = EventHooks::default();
    hooks.on_order_settled(|event| {
        Box::pin(async move {
            info!("📧️ Order {} settled for {}.", event.order.order_id, event.order.total_amount);
        })
    });
    hooks.on_order_annulled(|event| {
        Box::pin(async move {
            info!("📧️ Order {} was annulled ({}).", event.order.order_id, event.status);
        })
    });

    info!("🚀️ Starting server on {}:{}", config.host, config.port);
    match run_server(config, hooks).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}
