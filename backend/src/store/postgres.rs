//! PostgreSQL ledger store
//!
//! Movements are applied inside a transaction that holds a row lock on the
//! item, so concurrent movements against one item serialize instead of
//! overwriting each other's balance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    resolve_occurred_at, Attributes, InventoryItem, InventoryMovement, ItemPatch, MovementType,
    NewInventoryItem, NewMovement, OverdrawPolicy, StockLevels, StoredFile,
};
use sqlx::{types::Json, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    AllocationChange, ItemQuery, LedgerStore, MovementQuery, RecordedMovement, StoreError,
    StoreResult, OPENING_BALANCE_REASON,
};

const ITEM_COLUMNS: &str = "id, tenant_id, sku, name, category, barcode, attributes, cost, price, \
     supplier_name, supplier_contact, location, on_hand_qty, allocated_qty, \
     min_stock_level, reorder_point, reorder_quantity, created_at, updated_at, deleted_at";

const MOVEMENT_COLUMNS: &str = "id, tenant_id, item_id, sequence, movement_type::text AS movement_type, \
     quantity, previous_qty, resulting_qty, unit_cost, from_location, to_location, \
     reference_type, reference_id, reason, notes, attachment_url, attachment_size_bytes, \
     attachment_name, performed_by, occurred_at, created_at";

/// PostgreSQL unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Ledger store backed by PostgreSQL
#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
}

/// Row for item queries
#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    tenant_id: Uuid,
    sku: String,
    name: String,
    category: Option<String>,
    barcode: Option<String>,
    attributes: Json<Attributes>,
    cost: Decimal,
    price: Decimal,
    supplier_name: Option<String>,
    supplier_contact: Option<String>,
    location: Option<String>,
    on_hand_qty: i32,
    allocated_qty: i32,
    min_stock_level: i32,
    reorder_point: i32,
    reorder_quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<ItemRow> for InventoryItem {
    fn from(r: ItemRow) -> Self {
        InventoryItem {
            id: r.id,
            tenant_id: r.tenant_id,
            sku: r.sku,
            name: r.name,
            category: r.category,
            barcode: r.barcode,
            attributes: r.attributes.0,
            cost: r.cost,
            price: r.price,
            supplier_name: r.supplier_name,
            supplier_contact: r.supplier_contact,
            location: r.location,
            stock: StockLevels::new(r.on_hand_qty, r.allocated_qty),
            min_stock_level: r.min_stock_level,
            reorder_point: r.reorder_point,
            reorder_quantity: r.reorder_quantity,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

/// Row for movement queries
#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    tenant_id: Uuid,
    item_id: Uuid,
    sequence: i64,
    movement_type: String,
    quantity: i32,
    previous_qty: i32,
    resulting_qty: i32,
    unit_cost: Option<Decimal>,
    from_location: Option<String>,
    to_location: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<String>,
    reason: Option<String>,
    notes: Option<String>,
    attachment_url: Option<String>,
    attachment_size_bytes: Option<i64>,
    attachment_name: Option<String>,
    performed_by: Option<Uuid>,
    occurred_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for InventoryMovement {
    type Error = StoreError;

    fn try_from(r: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = MovementType::from_str(&r.movement_type).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Decode(
                format!("unknown movement type {}", r.movement_type).into(),
            ))
        })?;

        let attachment = match (r.attachment_url, r.attachment_name) {
            (Some(url), Some(name)) => Some(StoredFile {
                url,
                size_bytes: r.attachment_size_bytes.unwrap_or(0),
                name,
            }),
            _ => None,
        };

        Ok(InventoryMovement {
            id: r.id,
            tenant_id: r.tenant_id,
            item_id: r.item_id,
            sequence: r.sequence,
            movement_type,
            quantity: r.quantity,
            previous_qty: r.previous_qty,
            resulting_qty: r.resulting_qty,
            unit_cost: r.unit_cost,
            from_location: r.from_location,
            to_location: r.to_location,
            reference_type: r.reference_type,
            reference_id: r.reference_id,
            reason: r.reason,
            notes: r.notes,
            attachment,
            performed_by: r.performed_by,
            occurred_at: r.occurred_at,
            created_at: r.created_at,
        })
    }
}

/// Map a unique violation on the live-SKU index to `DuplicateSku`
fn map_sku_conflict(err: sqlx::Error, sku: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::DuplicateSku(sku.to_string());
        }
    }
    StoreError::Database(err)
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Run the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.db).await
    }

    async fn lock_live_item(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        item_id: Uuid,
    ) -> StoreResult<ItemRow> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items \
             WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL FOR UPDATE"
        );
        sqlx::query_as::<_, ItemRow>(&sql)
            .bind(item_id)
            .bind(tenant_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::NotFound("Item"))
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_movement(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        item_id: Uuid,
        movement: &NewMovement,
        previous_qty: i32,
        resulting_qty: i32,
    ) -> StoreResult<MovementRow> {
        let metadata = &movement.metadata;
        let sql = format!(
            r#"
            INSERT INTO inventory_movements (
                tenant_id, item_id, movement_type, quantity, previous_qty, resulting_qty,
                unit_cost, from_location, to_location, reference_type, reference_id,
                reason, notes, performed_by, occurred_at
            )
            VALUES ($1, $2, $3::inventory_movement_type, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, COALESCE($15, NOW()))
            RETURNING {MOVEMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(tenant_id)
            .bind(item_id)
            .bind(movement.movement_type.as_str())
            .bind(movement.quantity)
            .bind(previous_qty)
            .bind(resulting_qty)
            .bind(metadata.unit_cost)
            .bind(&metadata.from_location)
            .bind(&metadata.to_location)
            .bind(&metadata.reference_type)
            .bind(&metadata.reference_id)
            .bind(&metadata.reason)
            .bind(&metadata.notes)
            .bind(movement.performed_by)
            .bind(metadata.occurred_at)
            .fetch_one(&mut **tx)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn insert_item(
        &self,
        tenant_id: Uuid,
        item: NewInventoryItem,
        performed_by: Option<Uuid>,
    ) -> StoreResult<InventoryItem> {
        let mut tx = self.db.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO inventory_items (
                tenant_id, sku, name, category, barcode, attributes, cost, price,
                supplier_name, supplier_contact, location, on_hand_qty, allocated_qty,
                min_stock_level, reorder_point, reorder_quantity
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(tenant_id)
            .bind(&item.sku)
            .bind(&item.name)
            .bind(&item.category)
            .bind(&item.barcode)
            .bind(Json(&item.attributes))
            .bind(item.cost)
            .bind(item.price)
            .bind(&item.supplier_name)
            .bind(&item.supplier_contact)
            .bind(&item.location)
            .bind(item.on_hand_qty)
            .bind(item.allocated_qty)
            .bind(item.min_stock_level)
            .bind(item.reorder_point)
            .bind(item.reorder_quantity)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sku_conflict(e, &item.sku))?;

        // Opening balance goes through the ledger so replay starts from zero
        if item.on_hand_qty > 0 {
            let opening = NewMovement {
                movement_type: MovementType::Adjust,
                quantity: item.on_hand_qty,
                metadata: shared::MovementMetadata {
                    unit_cost: Some(item.cost),
                    reason: Some(OPENING_BALANCE_REASON.to_string()),
                    ..Default::default()
                },
                performed_by,
            };
            Self::insert_movement(&mut tx, tenant_id, row.id, &opening, 0, item.on_hand_qty)
                .await?;
        }

        tx.commit().await?;
        Ok(row.into())
    }

    async fn get_item(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        include_deleted: bool,
    ) -> StoreResult<Option<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items \
             WHERE id = $1 AND tenant_id = $2 AND ($3 OR deleted_at IS NULL)"
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(item_id)
            .bind(tenant_id)
            .bind(include_deleted)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_items(
        &self,
        tenant_id: Uuid,
        query: &ItemQuery,
    ) -> StoreResult<(Vec<InventoryItem>, u64)> {
        let filter = &query.filter;
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

        const WHERE_CLAUSE: &str = "WHERE tenant_id = $1 \
             AND ($2 OR deleted_at IS NULL) \
             AND ($3::text IS NULL OR category = $3) \
             AND ($4::text IS NULL OR name ILIKE $4 OR sku ILIKE $4 OR barcode ILIKE $4)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM inventory_items {WHERE_CLAUSE}"
        ))
        .bind(tenant_id)
        .bind(filter.include_deleted)
        .bind(&filter.category)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        // Sort column and direction come from closed enums, never from input text
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items {WHERE_CLAUSE} \
             ORDER BY {} {}, id LIMIT $5 OFFSET $6",
            query.sort.column(),
            query.order.as_sql(),
        );
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(tenant_id)
            .bind(filter.include_deleted)
            .bind(&filter.category)
            .bind(&search)
            .bind(i64::from(query.pagination.limit()))
            .bind(query.pagination.offset() as i64)
            .fetch_all(&self.db)
            .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total.max(0) as u64))
    }

    async fn active_items(&self, tenant_id: Uuid) -> StoreResult<Vec<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items \
             WHERE tenant_id = $1 AND deleted_at IS NULL ORDER BY sku"
        );
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_item(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        patch: &ItemPatch,
    ) -> StoreResult<InventoryItem> {
        let sql = format!(
            r#"
            UPDATE inventory_items
            SET name = COALESCE($3, name),
                category = COALESCE($4, category),
                sku = COALESCE($5, sku),
                barcode = COALESCE($6, barcode),
                attributes = COALESCE($7, attributes),
                cost = COALESCE($8, cost),
                price = COALESCE($9, price),
                supplier_name = COALESCE($10, supplier_name),
                supplier_contact = COALESCE($11, supplier_contact),
                location = COALESCE($12, location),
                min_stock_level = COALESCE($13, min_stock_level),
                reorder_point = COALESCE($14, reorder_point),
                reorder_quantity = COALESCE($15, reorder_quantity),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let sku = patch.sku.clone().unwrap_or_default();
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(item_id)
            .bind(tenant_id)
            .bind(&patch.name)
            .bind(&patch.category)
            .bind(&patch.sku)
            .bind(&patch.barcode)
            .bind(patch.attributes.as_ref().map(Json))
            .bind(patch.cost)
            .bind(patch.price)
            .bind(&patch.supplier_name)
            .bind(&patch.supplier_contact)
            .bind(&patch.location)
            .bind(patch.min_stock_level)
            .bind(patch.reorder_point)
            .bind(patch.reorder_quantity)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_sku_conflict(e, &sku))?
            .ok_or(StoreError::NotFound("Item"))?;

        Ok(row.into())
    }

    async fn soft_delete_item(&self, tenant_id: Uuid, item_id: Uuid) -> StoreResult<bool> {
        let deleted_at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            WITH target AS (
                SELECT id, deleted_at FROM inventory_items
                WHERE id = $1 AND tenant_id = $2
                FOR UPDATE
            ),
            marked AS (
                UPDATE inventory_items i
                SET deleted_at = NOW(), updated_at = NOW()
                FROM target t
                WHERE i.id = t.id AND t.deleted_at IS NULL
                RETURNING i.id
            )
            SELECT t.deleted_at FROM target t
            "#,
        )
        .bind(item_id)
        .bind(tenant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound("Item"))?;

        // deleted_at from the pre-update snapshot: set means it was already deleted
        Ok(deleted_at.is_none())
    }

    async fn record_movement(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        mut movement: NewMovement,
        policy: OverdrawPolicy,
    ) -> StoreResult<RecordedMovement> {
        let mut tx = self.db.begin().await?;

        let current = Self::lock_live_item(&mut tx, tenant_id, item_id).await?;
        let previous_qty = current.on_hand_qty;
        let resulting_qty = movement
            .movement_type
            .apply(previous_qty, movement.quantity, policy)?;

        // Stable while the item row is locked
        let latest = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(occurred_at) FROM inventory_movements WHERE tenant_id = $1 AND item_id = $2",
        )
        .bind(tenant_id)
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await?;
        movement.metadata.occurred_at = Some(resolve_occurred_at(
            movement.metadata.occurred_at,
            latest,
            Utc::now(),
        )?);

        let movement_row =
            Self::insert_movement(&mut tx, tenant_id, item_id, &movement, previous_qty, resulting_qty)
                .await?;

        let sql = format!(
            "UPDATE inventory_items SET on_hand_qty = $1, updated_at = NOW() \
             WHERE id = $2 AND tenant_id = $3 RETURNING {ITEM_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(resulting_qty)
            .bind(item_id)
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await;

        let item_row = match updated {
            Ok(row) => row,
            Err(update_err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    return Err(StoreError::BalanceNotApplied {
                        item_id,
                        movement_id: movement_row.id,
                        message: format!(
                            "balance update failed ({update_err}) and rollback failed ({rollback_err})"
                        ),
                    });
                }
                return Err(update_err.into());
            }
        };

        tx.commit().await?;

        Ok(RecordedMovement {
            movement: movement_row.try_into()?,
            item: item_row.into(),
        })
    }

    async fn change_allocation(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        change: AllocationChange,
    ) -> StoreResult<InventoryItem> {
        let mut tx = self.db.begin().await?;

        let current = Self::lock_live_item(&mut tx, tenant_id, item_id).await?;
        let stock = StockLevels::new(current.on_hand_qty, current.allocated_qty);
        let stock = match change {
            AllocationChange::Reserve(quantity) => stock.reserve(quantity)?,
            AllocationChange::Release(quantity) => stock.release(quantity)?,
        };

        let sql = format!(
            "UPDATE inventory_items SET allocated_qty = $1, updated_at = NOW() \
             WHERE id = $2 AND tenant_id = $3 RETURNING {ITEM_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(stock.allocated_qty())
            .bind(item_id)
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn list_movements(
        &self,
        tenant_id: Uuid,
        query: &MovementQuery,
    ) -> StoreResult<Vec<InventoryMovement>> {
        let direction = query.order.as_sql();
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements \
             WHERE tenant_id = $1 AND ($2::uuid IS NULL OR item_id = $2) \
             ORDER BY occurred_at {direction}, sequence {direction} \
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(tenant_id)
            .bind(query.item_id)
            .bind(query.limit.map(i64::from))
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(InventoryMovement::try_from).collect()
    }

    async fn attach_file(
        &self,
        tenant_id: Uuid,
        movement_id: Uuid,
        file: &StoredFile,
    ) -> StoreResult<InventoryMovement> {
        let sql = format!(
            "UPDATE inventory_movements \
             SET attachment_url = $3, attachment_size_bytes = $4, attachment_name = $5 \
             WHERE id = $1 AND tenant_id = $2 AND attachment_url IS NULL \
             RETURNING {MOVEMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(movement_id)
            .bind(tenant_id)
            .bind(&file.url)
            .bind(file.size_bytes)
            .bind(&file.name)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound("Movement"))?;

        row.try_into()
    }
}
