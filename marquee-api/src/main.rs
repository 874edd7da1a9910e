use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use marquee_api::{app, worker, AppState};
use marquee_core::ReservationStore;
use marquee_reserve::ExpirySweeper;
use marquee_store::{DbClient, PostgresReservationStore, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = marquee_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let store: Arc<dyn ReservationStore> = Arc::new(PostgresReservationStore::new(db.pool.clone()));
    let redis = Arc::new(RedisClient::new(&config.redis.url).expect("Failed to create Redis client"));

    let state = AppState::new(store, redis, config.business_rules.clone());

    let sweeper = ExpirySweeper::new(
        state.inventory.clone(),
        Duration::from_secs(config.business_rules.sweep_interval_seconds),
    );
    tokio::spawn(worker::start_expiry_sweeper(sweeper));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
