//! Inventory ledger server binary

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use ledger_server::{
    config::StoreBackend,
    create_app, init_tracing,
    services::Reconciler,
    store::{LedgerStore, MemoryLedgerStore, PgLedgerStore},
    AppState, Config,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load().context("failed to load configuration")?;

    init_tracing(&config.log_format);

    tracing::info!("Starting Inventory Ledger Server");
    tracing::info!("Environment: {}", config.environment);

    let store = build_store(&config).await?;

    let reconcile_interval = Duration::from_secs(config.ledger.reconcile_interval_secs);
    let reconcile_tenants = config.ledger.reconcile_tenants.clone();
    let port = config.server.port;
    let host = config.server.host.clone();

    // Create application state
    let state = AppState::new(store, config)?;
    let reconciler = Reconciler::spawn(state.inventory.clone(), reconcile_tenants, reconcile_interval);

    // Build application
    let app = create_app(state);

    // Start server
    let ip = host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("invalid server.host {}", host))?;
    let addr = SocketAddr::new(ip, port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(reconciler) = reconciler {
        reconciler.shutdown().await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Select the ledger store from configuration
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.storage.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryLedgerStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .context("database.url is not set")?;

            // Create database connection pool
            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(url)
                .await?;
            tracing::info!("Database connection established");

            let store = PgLedgerStore::new(db_pool);

            // Run migrations in development
            if config.environment == "development" {
                tracing::info!("Running database migrations...");
                store.migrate().await?;
                tracing::info!("Migrations completed");
            }

            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
