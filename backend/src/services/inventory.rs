//! Inventory ledger service
//!
//! Items, the movements that change their quantities, reservations, and the
//! alerts derived from current stock. The caller's tenant and user are passed
//! into every operation; the service holds no ambient identity.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    derive_alerts, replay_balance, validate_movement, validate_new_item, validate_patch,
    Attributes, InventoryAlert, InventoryItem, InventoryMovement, ItemFilter, ItemPatch,
    ItemSort, MovementMetadata, MovementType, NewInventoryItem, NewMovement, OverdrawPolicy,
    PaginatedResponse, Pagination, PaginationMeta, SortOrder, DEFAULT_MIN_STOCK_LEVEL,
    DEFAULT_REORDER_POINT, DEFAULT_REORDER_QUANTITY,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::external::{FileStorage, FileUpload};
use crate::store::{
    AllocationChange, ItemQuery, LedgerStore, MovementQuery, RecordedMovement, StoreError,
};

/// Ledger behaviour the service is configured with
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub overdraw_policy: OverdrawPolicy,
    /// Feed size when the caller gives no limit
    pub movement_feed_limit: u32,
    pub max_movement_feed_limit: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            overdraw_policy: OverdrawPolicy::Clamp,
            movement_feed_limit: 50,
            max_movement_feed_limit: 500,
        }
    }
}

/// Inventory service
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn LedgerStore>,
    storage: Option<Arc<dyn FileStorage>>,
    settings: LedgerSettings,
}

/// Input for creating an item
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateItemInput {
    #[validate(length(min = 1, max = 64, message = "SKU must be 1-64 characters"))]
    pub sku: String,
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(length(max = 64))]
    pub barcode: Option<String>,
    pub attributes: Option<Attributes>,
    pub cost: Option<Decimal>,
    pub price: Option<Decimal>,
    #[validate(length(max = 200))]
    pub supplier_name: Option<String>,
    #[validate(length(max = 200))]
    pub supplier_contact: Option<String>,
    #[validate(length(max = 100))]
    pub location: Option<String>,
    pub on_hand_qty: Option<i32>,
    pub allocated_qty: Option<i32>,
    pub min_stock_level: Option<i32>,
    pub reorder_point: Option<i32>,
    pub reorder_quantity: Option<i32>,
}

impl CreateItemInput {
    /// Apply the documented defaults
    fn into_new_item(self) -> NewInventoryItem {
        NewInventoryItem {
            name: self.name.unwrap_or_else(|| self.sku.clone()),
            sku: self.sku,
            category: self.category,
            barcode: self.barcode,
            attributes: self.attributes.unwrap_or_default(),
            cost: self.cost.unwrap_or(Decimal::ZERO),
            price: self.price.unwrap_or(Decimal::ZERO),
            supplier_name: self.supplier_name,
            supplier_contact: self.supplier_contact,
            location: self.location,
            on_hand_qty: self.on_hand_qty.unwrap_or(0),
            allocated_qty: self.allocated_qty.unwrap_or(0),
            min_stock_level: self.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL),
            reorder_point: self.reorder_point.unwrap_or(DEFAULT_REORDER_POINT),
            reorder_quantity: self.reorder_quantity.unwrap_or(DEFAULT_REORDER_QUANTITY),
        }
    }
}

/// Input for updating an item.
///
/// The quantity fields exist only so that a request carrying them is
/// rejected instead of silently dropped.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateItemInput {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub sku: Option<String>,
    #[validate(length(max = 64))]
    pub barcode: Option<String>,
    pub attributes: Option<Attributes>,
    pub cost: Option<Decimal>,
    pub price: Option<Decimal>,
    #[validate(length(max = 200))]
    pub supplier_name: Option<String>,
    #[validate(length(max = 200))]
    pub supplier_contact: Option<String>,
    #[validate(length(max = 100))]
    pub location: Option<String>,
    pub min_stock_level: Option<i32>,
    pub reorder_point: Option<i32>,
    pub reorder_quantity: Option<i32>,
    pub on_hand_qty: Option<i32>,
    pub allocated_qty: Option<i32>,
    pub available_qty: Option<i32>,
}

impl UpdateItemInput {
    fn into_patch(self) -> AppResult<ItemPatch> {
        let quantity_field = [
            ("on_hand_qty", self.on_hand_qty),
            ("allocated_qty", self.allocated_qty),
            ("available_qty", self.available_qty),
        ]
        .into_iter()
        .find_map(|(field, value)| value.map(|_| field));

        if let Some(field) = quantity_field {
            return Err(AppError::validation(
                field,
                "Quantities change only through movements and reservations",
            ));
        }

        Ok(ItemPatch {
            name: self.name,
            category: self.category,
            sku: self.sku,
            barcode: self.barcode,
            attributes: self.attributes,
            cost: self.cost,
            price: self.price,
            supplier_name: self.supplier_name,
            supplier_contact: self.supplier_contact,
            location: self.location,
            min_stock_level: self.min_stock_level,
            reorder_point: self.reorder_point,
            reorder_quantity: self.reorder_quantity,
        })
    }
}

/// Query parameters for listing items
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListItemsQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    pub sort: Option<ItemSort>,
    pub order: Option<SortOrder>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListItemsQuery {
    fn into_item_query(self) -> ItemQuery {
        let defaults = Pagination::default();
        ItemQuery {
            filter: ItemFilter {
                search: self.search,
                category: self.category,
                include_deleted: self.include_deleted,
            },
            sort: self.sort.unwrap_or_default(),
            order: self.order.unwrap_or_default(),
            pagination: Pagination::new(
                self.page.unwrap_or(defaults.page),
                self.per_page.unwrap_or(defaults.per_page),
            ),
        }
    }
}

/// File attached to a movement, e.g. a supplier invoice
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AttachmentInput {
    #[validate(length(min = 1, max = 255, message = "File name must be 1-255 characters"))]
    pub file_name: String,
    pub content_type: Option<String>,
    #[validate(length(min = 1, message = "Attachment content is empty"))]
    pub content_base64: String,
}

/// Input for recording a movement
#[derive(Debug, Clone, Deserialize)]
pub struct RecordMovementInput {
    pub movement_type: MovementType,
    pub quantity: i32,
    #[serde(flatten)]
    pub metadata: MovementMetadata,
    pub attachment: Option<AttachmentInput>,
}

/// Query parameters for the movement feed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMovementsQuery {
    pub item_id: Option<Uuid>,
    pub limit: Option<u32>,
    pub order: Option<SortOrder>,
}

/// Input for reserving or releasing stock
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReserveInput {
    #[validate(range(min = 1, message = "Quantity must be greater than zero"))]
    pub quantity: i32,
}

/// An item together with its full movement history, oldest first
#[derive(Debug, Clone, Serialize)]
pub struct ItemHistory {
    pub item: InventoryItem,
    pub movements: Vec<InventoryMovement>,
}

/// Stored balance compared with the balance rebuilt from movements
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BalanceCheck {
    pub item_id: Uuid,
    pub sku: String,
    pub stored_qty: i32,
    pub replayed_qty: i32,
    pub movement_count: usize,
    pub last_movement_id: Option<Uuid>,
}

impl BalanceCheck {
    pub fn is_consistent(&self) -> bool {
        self.stored_qty == self.replayed_qty
    }
}

/// Outcome of a reconciliation pass over one tenant
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub tenant_id: Uuid,
    pub checked_items: usize,
    pub discrepancies: Vec<BalanceCheck>,
    pub checked_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(store: Arc<dyn LedgerStore>, settings: LedgerSettings) -> Self {
        Self {
            store,
            storage: None,
            settings,
        }
    }

    /// Enable movement attachments
    pub fn with_file_storage(mut self, storage: Arc<dyn FileStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Create an item; a non-zero opening quantity is written as an ADJUST
    pub async fn create_item(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        input: CreateItemInput,
    ) -> AppResult<InventoryItem> {
        input.validate()?;
        let new_item = input.into_new_item();
        validate_new_item(&new_item).map_err(|(field, msg)| AppError::validation(field, msg))?;

        let item = self
            .store
            .insert_item(tenant_id, new_item, Some(user_id))
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            item_id = %item.id,
            "Created item {} with {} on hand",
            item.sku,
            item.on_hand_qty()
        );

        Ok(item)
    }

    /// Get a live item
    pub async fn get_item(&self, tenant_id: Uuid, item_id: Uuid) -> AppResult<InventoryItem> {
        self.store
            .get_item(tenant_id, item_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound("Item".to_string()))
    }

    /// List items with filters, sorting and pagination
    pub async fn list_items(
        &self,
        tenant_id: Uuid,
        query: ListItemsQuery,
    ) -> AppResult<PaginatedResponse<InventoryItem>> {
        let query = query.into_item_query();
        let (items, total) = self.store.list_items(tenant_id, &query).await?;

        Ok(PaginatedResponse {
            data: items,
            pagination: PaginationMeta::new(&query.pagination, total),
        })
    }

    /// Update descriptive, commercial and threshold fields of a live item
    pub async fn update_item(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        input: UpdateItemInput,
    ) -> AppResult<InventoryItem> {
        input.validate()?;
        let patch = input.into_patch()?;
        validate_patch(&patch).map_err(|(field, msg)| AppError::validation(field, msg))?;

        let item = self.store.update_item(tenant_id, item_id, &patch).await?;
        tracing::debug!(tenant_id = %tenant_id, item_id = %item_id, "Updated item {}", item.sku);
        Ok(item)
    }

    /// Soft delete an item. Deleting an already deleted item succeeds.
    pub async fn delete_item(&self, tenant_id: Uuid, item_id: Uuid) -> AppResult<()> {
        let deleted = self.store.soft_delete_item(tenant_id, item_id).await?;
        if deleted {
            tracing::info!(tenant_id = %tenant_id, item_id = %item_id, "Soft deleted item");
        } else {
            tracing::debug!(tenant_id = %tenant_id, item_id = %item_id, "Item already deleted");
        }
        Ok(())
    }

    // ========================================================================
    // Movements
    // ========================================================================

    /// Record a movement and apply it to the item's on-hand quantity.
    ///
    /// The movement and the balance change are written together. An attached
    /// file is uploaded afterwards; if that fails the movement still stands.
    pub async fn record_movement(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        item_id: Uuid,
        input: RecordMovementInput,
    ) -> AppResult<RecordedMovement> {
        validate_movement(input.movement_type, input.quantity, &input.metadata)
            .map_err(|(field, msg)| AppError::validation(field, msg))?;

        let attachment = match input.attachment {
            Some(attachment) => Some(decode_attachment(attachment)?),
            None => None,
        };

        let movement = NewMovement {
            movement_type: input.movement_type,
            quantity: input.quantity,
            metadata: input.metadata,
            performed_by: Some(user_id),
        };

        let mut recorded = self
            .store
            .record_movement(tenant_id, item_id, movement, self.settings.overdraw_policy)
            .await
            .map_err(|e| {
                if let StoreError::BalanceNotApplied { movement_id, .. } = &e {
                    tracing::error!(
                        tenant_id = %tenant_id,
                        item_id = %item_id,
                        movement_id = %movement_id,
                        "Movement may be recorded without its balance update: {}",
                        e
                    );
                }
                AppError::from(e)
            })?;

        let movement = &recorded.movement;
        if movement.was_clamped() {
            tracing::warn!(
                tenant_id = %tenant_id,
                item_id = %item_id,
                "OUT of {} exceeded on-hand {}; balance floored at zero",
                movement.quantity,
                movement.previous_qty
            );
        }
        tracing::info!(
            tenant_id = %tenant_id,
            item_id = %item_id,
            movement_id = %movement.id,
            "Recorded {} {}: {} -> {}",
            movement.movement_type,
            movement.quantity,
            movement.previous_qty,
            movement.resulting_qty
        );

        if let Some((upload, bytes)) = attachment {
            if let Some(enriched) = self
                .attach(tenant_id, recorded.movement.id, upload, bytes)
                .await
            {
                recorded.movement = enriched;
            }
        }

        Ok(recorded)
    }

    /// Best-effort upload of a movement attachment; failures are logged only
    async fn attach(
        &self,
        tenant_id: Uuid,
        movement_id: Uuid,
        attachment: AttachmentInput,
        size_bytes: i64,
    ) -> Option<InventoryMovement> {
        let Some(storage) = &self.storage else {
            tracing::warn!(
                movement_id = %movement_id,
                "Attachment {} dropped: no file storage configured",
                attachment.file_name
            );
            return None;
        };

        let upload = FileUpload {
            file_name: attachment.file_name,
            content_type: attachment
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            content_base64: attachment.content_base64,
            size_bytes,
            folder: format!("movements/{}", tenant_id),
        };

        let stored = match storage.upload(upload).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(movement_id = %movement_id, "Attachment upload failed: {}", e);
                return None;
            }
        };

        match self.store.attach_file(tenant_id, movement_id, &stored).await {
            Ok(movement) => Some(movement),
            Err(e) => {
                tracing::warn!(
                    movement_id = %movement_id,
                    "Uploaded {} but could not link it to the movement: {}",
                    stored.url,
                    e
                );
                None
            }
        }
    }

    /// Movement feed, newest first unless asked otherwise
    pub async fn list_movements(
        &self,
        tenant_id: Uuid,
        query: ListMovementsQuery,
    ) -> AppResult<Vec<InventoryMovement>> {
        if let Some(item_id) = query.item_id {
            self.ensure_item_exists(tenant_id, item_id).await?;
        }

        let limit = query
            .limit
            .unwrap_or(self.settings.movement_feed_limit)
            .clamp(1, self.settings.max_movement_feed_limit);

        let movements = self
            .store
            .list_movements(
                tenant_id,
                &MovementQuery {
                    item_id: query.item_id,
                    limit: Some(limit),
                    order: query.order.unwrap_or_default(),
                },
            )
            .await?;

        Ok(movements)
    }

    /// An item, deleted or not, with every movement it has ever had
    pub async fn item_history(&self, tenant_id: Uuid, item_id: Uuid) -> AppResult<ItemHistory> {
        let item = self
            .store
            .get_item(tenant_id, item_id, true)
            .await?
            .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
        let movements = self.movements_of(tenant_id, item_id).await?;

        Ok(ItemHistory { item, movements })
    }

    async fn movements_of(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
    ) -> AppResult<Vec<InventoryMovement>> {
        let movements = self
            .store
            .list_movements(
                tenant_id,
                &MovementQuery {
                    item_id: Some(item_id),
                    limit: None,
                    order: SortOrder::Asc,
                },
            )
            .await?;
        Ok(movements)
    }

    async fn ensure_item_exists(&self, tenant_id: Uuid, item_id: Uuid) -> AppResult<()> {
        self.store
            .get_item(tenant_id, item_id, true)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Item".to_string()))
    }

    // ========================================================================
    // Reservations
    // ========================================================================

    /// Reserve stock against an open order
    pub async fn reserve_stock(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        item_id: Uuid,
        input: ReserveInput,
    ) -> AppResult<InventoryItem> {
        input.validate()?;
        let item = self
            .store
            .change_allocation(tenant_id, item_id, AllocationChange::Reserve(input.quantity))
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            item_id = %item_id,
            user_id = %user_id,
            "Reserved {} of {}; {} available",
            input.quantity,
            item.sku,
            item.available_qty()
        );
        Ok(item)
    }

    /// Release a reservation
    pub async fn release_stock(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        item_id: Uuid,
        input: ReserveInput,
    ) -> AppResult<InventoryItem> {
        input.validate()?;
        let item = self
            .store
            .change_allocation(tenant_id, item_id, AllocationChange::Release(input.quantity))
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            item_id = %item_id,
            user_id = %user_id,
            "Released {} of {}; {} allocated",
            input.quantity,
            item.sku,
            item.allocated_qty()
        );
        Ok(item)
    }

    // ========================================================================
    // Alerts
    // ========================================================================

    /// Alerts for the tenant's live items, recomputed on every call
    pub async fn alerts(&self, tenant_id: Uuid) -> AppResult<Vec<InventoryAlert>> {
        let items = self.store.active_items(tenant_id).await?;
        Ok(derive_alerts(&items))
    }

    /// Acknowledge an alert. Alerts hold no state, so this only checks that
    /// the alert is currently raised and returns the current set.
    pub async fn acknowledge_alert(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        alert_id: Uuid,
    ) -> AppResult<Vec<InventoryAlert>> {
        let alerts = self.current_alert(tenant_id, alert_id).await?;
        tracing::info!(tenant_id = %tenant_id, user_id = %user_id, "Alert {} acknowledged", alert_id);
        Ok(alerts)
    }

    /// Resolve an alert; see [`InventoryService::acknowledge_alert`]
    pub async fn resolve_alert(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        alert_id: Uuid,
    ) -> AppResult<Vec<InventoryAlert>> {
        let alerts = self.current_alert(tenant_id, alert_id).await?;
        tracing::info!(tenant_id = %tenant_id, user_id = %user_id, "Alert {} resolved", alert_id);
        Ok(alerts)
    }

    async fn current_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
    ) -> AppResult<Vec<InventoryAlert>> {
        let alerts = self.alerts(tenant_id).await?;
        if !alerts.iter().any(|a| a.id == alert_id) {
            return Err(AppError::NotFound("Alert".to_string()));
        }
        Ok(alerts)
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    async fn check_balance(
        &self,
        tenant_id: Uuid,
        item: &InventoryItem,
    ) -> AppResult<BalanceCheck> {
        let movements = self.movements_of(tenant_id, item.id).await?;
        Ok(BalanceCheck {
            item_id: item.id,
            sku: item.sku.clone(),
            stored_qty: item.on_hand_qty(),
            replayed_qty: replay_balance(&movements),
            movement_count: movements.len(),
            last_movement_id: movements.last().map(|m| m.id),
        })
    }

    /// Rebuild every live item's balance from its movements and report the
    /// items whose stored balance disagrees.
    pub async fn reconcile(&self, tenant_id: Uuid) -> AppResult<ReconciliationReport> {
        let items = self.store.active_items(tenant_id).await?;
        let mut discrepancies = Vec::new();

        for item in &items {
            let check = self.check_balance(tenant_id, item).await?;
            if !check.is_consistent() {
                tracing::error!(
                    tenant_id = %tenant_id,
                    item_id = %check.item_id,
                    "Balance mismatch on {}: stored {}, movements give {}",
                    check.sku,
                    check.stored_qty,
                    check.replayed_qty
                );
                discrepancies.push(check);
            }
        }

        tracing::info!(
            tenant_id = %tenant_id,
            "Reconciled {} items, {} mismatched",
            items.len(),
            discrepancies.len()
        );

        Ok(ReconciliationReport {
            tenant_id,
            checked_items: items.len(),
            discrepancies,
            checked_at: Utc::now(),
        })
    }

    /// Check one item; a mismatch is reported as a partial application
    pub async fn verify_item(&self, tenant_id: Uuid, item_id: Uuid) -> AppResult<BalanceCheck> {
        let item = self.get_item(tenant_id, item_id).await?;
        let check = self.check_balance(tenant_id, &item).await?;

        if !check.is_consistent() {
            tracing::error!(
                tenant_id = %tenant_id,
                item_id = %item_id,
                "Balance mismatch on {}: stored {}, movements give {}",
                check.sku,
                check.stored_qty,
                check.replayed_qty
            );
            return Err(AppError::PartialApplication {
                item_id,
                movement_id: check.last_movement_id,
                message: format!(
                    "stored on-hand {} does not match {} rebuilt from {} movements",
                    check.stored_qty, check.replayed_qty, check.movement_count
                ),
            });
        }

        Ok(check)
    }
}

/// Validate an attachment and work out its decoded size
fn decode_attachment(attachment: AttachmentInput) -> AppResult<(AttachmentInput, i64)> {
    attachment.validate()?;
    let bytes = STANDARD
        .decode(attachment.content_base64.trim())
        .map_err(|_| AppError::validation("attachment", "Attachment is not valid base64"))?;
    let size = i64::try_from(bytes.len())
        .map_err(|_| AppError::validation("attachment", "Attachment is too large"))?;
    Ok((attachment, size))
}
