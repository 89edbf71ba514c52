//! Inventory ledger server
//!
//! Items, an append-only movement ledger that drives their on-hand
//! quantities, and stock alerts derived from current state.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use error::{AppError, AppResult};
use external::HttpFileStorage;
use services::InventoryService;
use store::LedgerStore;

/// Default log filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "ledger_server=debug,tower_http=debug,sqlx=warn";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub inventory: InventoryService,
    pub store: Arc<dyn LedgerStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the inventory service to `store`, with file storage when an
    /// endpoint is configured
    pub fn new(store: Arc<dyn LedgerStore>, config: Config) -> AppResult<Self> {
        let mut inventory = InventoryService::new(store.clone(), config.ledger_settings());

        match (&config.storage.file_endpoint, &config.storage.file_api_key) {
            (Some(endpoint), Some(api_key)) => {
                let storage = HttpFileStorage::new(endpoint.clone(), api_key.clone())?;
                inventory = inventory.with_file_storage(Arc::new(storage));
            }
            (Some(_), None) => {
                return Err(AppError::Configuration(
                    "storage.file_api_key is required with storage.file_endpoint".to_string(),
                ));
            }
            _ => tracing::info!("File storage not configured; attachments are disabled"),
        }

        Ok(Self {
            inventory,
            store,
            config: Arc::new(config),
        })
    }
}

/// Install the global tracing subscriber
pub fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Inventory Ledger API v1"
}
