use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use groupdesk_api::{
    app,
    state::{bootstrap_admin, inventory_policy, AppState, AuthConfig},
    worker,
};
use groupdesk_core::{FlightGroupRepository, InventoryLedger, JobQueue};
use groupdesk_inventory::InventoryService;
use groupdesk_store::{
    app_config::Config, DbClient, RedisClient, StoreAgencyRepository, StoreFlightGroupRepository,
    StoreInventoryLedger, StoreUserRepository,
};
use tokio::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groupdesk_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting GroupDesk API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis job queues
    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let jobs: Arc<dyn JobQueue> = Arc::new(redis);

    let lock_timeout_ms = config.inventory.lock_timeout_ms;
    let groups: Arc<dyn FlightGroupRepository> =
        Arc::new(StoreFlightGroupRepository::new(db.pool.clone(), lock_timeout_ms));
    let ledger: Arc<dyn InventoryLedger> =
        Arc::new(StoreInventoryLedger::new(db.pool.clone(), lock_timeout_ms));
    let inventory = InventoryService::new(
        groups.clone(),
        ledger,
        jobs.clone(),
        inventory_policy(&config.inventory)?,
    );

    let app_state = AppState {
        agencies: Arc::new(StoreAgencyRepository::new(db.pool.clone())),
        users: Arc::new(StoreUserRepository::new(db.pool.clone())),
        groups,
        inventory: inventory.clone(),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.expose().clone(),
            expiration: config.auth.jwt_expiration_seconds,
            bcrypt_cost: config.auth.bcrypt_cost,
        },
    };

    if let Some(seed) = &config.bootstrap {
        bootstrap_admin(&app_state, seed)
            .await
            .context("Failed to bootstrap administrator")?;
    }

    worker::spawn_all(
        inventory,
        jobs,
        Duration::from_secs(config.inventory.expiry_sweep_seconds),
        Duration::from_millis(config.jobs.poll_interval_ms),
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
