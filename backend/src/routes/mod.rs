//! Route definitions for the inventory ledger

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - inventory ledger
        .nest("/inventory", inventory_routes(state))
}

/// Inventory ledger routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Items
        .route("/items", get(handlers::list_items).post(handlers::create_item))
        .route(
            "/items/:item_id",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
        // Movements
        .route(
            "/items/:item_id/movements",
            get(handlers::list_item_movements).post(handlers::record_movement),
        )
        .route("/items/:item_id/history", get(handlers::item_history))
        .route("/movements", get(handlers::list_movements))
        // Reservations
        .route("/items/:item_id/reserve", post(handlers::reserve_stock))
        .route("/items/:item_id/release", post(handlers::release_stock))
        // Alerts
        .route("/alerts", get(handlers::list_alerts))
        .route("/alerts/:alert_id/acknowledge", post(handlers::acknowledge_alert))
        .route("/alerts/:alert_id/resolve", post(handlers::resolve_alert))
        // Reconciliation
        .route("/reconcile", post(handlers::reconcile))
        .route("/items/:item_id/verify", get(handlers::verify_item))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
