//! HTTP handlers for inventory ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{InventoryAlert, InventoryItem, InventoryMovement, PaginatedResponse};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser, INVENTORY_READ, INVENTORY_WRITE};
use crate::services::inventory::{
    BalanceCheck, CreateItemInput, ItemHistory, ListItemsQuery, ListMovementsQuery,
    ReconciliationReport, RecordMovementInput, ReserveInput, UpdateItemInput,
};
use crate::store::RecordedMovement;
use crate::AppState;

// ============================================================================
// Items
// ============================================================================

/// Create an item
pub async fn create_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateItemInput>,
) -> AppResult<(StatusCode, Json<InventoryItem>)> {
    check_permission(&current_user.0, INVENTORY_WRITE)?;
    let item = state
        .inventory
        .create_item(current_user.0.tenant_id, current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// List items
pub async fn list_items(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListItemsQuery>,
) -> AppResult<Json<PaginatedResponse<InventoryItem>>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let items = state
        .inventory
        .list_items(current_user.0.tenant_id, query)
        .await?;
    Ok(Json(items))
}

/// Get an item
pub async fn get_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<InventoryItem>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let item = state
        .inventory
        .get_item(current_user.0.tenant_id, item_id)
        .await?;
    Ok(Json(item))
}

/// Update an item
pub async fn update_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<Json<InventoryItem>> {
    check_permission(&current_user.0, INVENTORY_WRITE)?;
    let item = state
        .inventory
        .update_item(current_user.0.tenant_id, item_id, input)
        .await?;
    Ok(Json(item))
}

/// Soft delete an item
pub async fn delete_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    check_permission(&current_user.0, INVENTORY_WRITE)?;
    state
        .inventory
        .delete_item(current_user.0.tenant_id, item_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Movements
// ============================================================================

/// Record a movement against an item
pub async fn record_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<RecordMovementInput>,
) -> AppResult<(StatusCode, Json<RecordedMovement>)> {
    check_permission(&current_user.0, INVENTORY_WRITE)?;
    let recorded = state
        .inventory
        .record_movement(
            current_user.0.tenant_id,
            current_user.0.user_id,
            item_id,
            input,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

/// Movements of one item, newest first by default
pub async fn list_item_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Query(query): Query<ListMovementsQuery>,
) -> AppResult<Json<Vec<InventoryMovement>>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let query = ListMovementsQuery {
        item_id: Some(item_id),
        ..query
    };
    let movements = state
        .inventory
        .list_movements(current_user.0.tenant_id, query)
        .await?;
    Ok(Json(movements))
}

/// Full history of an item, including soft deleted ones
pub async fn item_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<ItemHistory>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let history = state
        .inventory
        .item_history(current_user.0.tenant_id, item_id)
        .await?;
    Ok(Json(history))
}

/// Movement feed across items
pub async fn list_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListMovementsQuery>,
) -> AppResult<Json<Vec<InventoryMovement>>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let movements = state
        .inventory
        .list_movements(current_user.0.tenant_id, query)
        .await?;
    Ok(Json(movements))
}

// ============================================================================
// Reservations
// ============================================================================

pub async fn reserve_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<ReserveInput>,
) -> AppResult<Json<InventoryItem>> {
    check_permission(&current_user.0, INVENTORY_WRITE)?;
    let item = state
        .inventory
        .reserve_stock(
            current_user.0.tenant_id,
            current_user.0.user_id,
            item_id,
            input,
        )
        .await?;
    Ok(Json(item))
}

pub async fn release_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<ReserveInput>,
) -> AppResult<Json<InventoryItem>> {
    check_permission(&current_user.0, INVENTORY_WRITE)?;
    let item = state
        .inventory
        .release_stock(
            current_user.0.tenant_id,
            current_user.0.user_id,
            item_id,
            input,
        )
        .await?;
    Ok(Json(item))
}

// ============================================================================
// Alerts
// ============================================================================

/// Current alerts
pub async fn list_alerts(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<InventoryAlert>>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let alerts = state.inventory.alerts(current_user.0.tenant_id).await?;
    Ok(Json(alerts))
}

pub async fn acknowledge_alert(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(alert_id): Path<Uuid>,
) -> AppResult<Json<Vec<InventoryAlert>>> {
    check_permission(&current_user.0, INVENTORY_WRITE)?;
    let alerts = state
        .inventory
        .acknowledge_alert(current_user.0.tenant_id, current_user.0.user_id, alert_id)
        .await?;
    Ok(Json(alerts))
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(alert_id): Path<Uuid>,
) -> AppResult<Json<Vec<InventoryAlert>>> {
    check_permission(&current_user.0, INVENTORY_WRITE)?;
    let alerts = state
        .inventory
        .resolve_alert(current_user.0.tenant_id, current_user.0.user_id, alert_id)
        .await?;
    Ok(Json(alerts))
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Reconcile the caller's tenant now
pub async fn reconcile(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ReconciliationReport>> {
    check_permission(&current_user.0, INVENTORY_WRITE)?;
    let report = state.inventory.reconcile(current_user.0.tenant_id).await?;
    Ok(Json(report))
}

/// Check one item's stored balance against its movements
pub async fn verify_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<BalanceCheck>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let check = state
        .inventory
        .verify_item(current_user.0.tenant_id, item_id)
        .await?;
    Ok(Json(check))
}
