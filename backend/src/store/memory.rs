//! In-memory ledger store for tests and local development

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    resolve_occurred_at, InventoryItem, InventoryMovement, ItemPatch, ItemSort, MovementType,
    NewInventoryItem, NewMovement, OverdrawPolicy, SortOrder, StockLevels, StoredFile,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AllocationChange, ItemQuery, LedgerStore, MovementQuery, RecordedMovement, StoreError,
    StoreResult, OPENING_BALANCE_REASON,
};

#[derive(Debug, Default)]
struct State {
    items: HashMap<Uuid, InventoryItem>,
    movements: Vec<InventoryMovement>,
    next_sequence: i64,
}

impl State {
    fn live_item_mut(&mut self, tenant_id: Uuid, item_id: Uuid) -> StoreResult<&mut InventoryItem> {
        self.items
            .get_mut(&item_id)
            .filter(|item| item.tenant_id == tenant_id && !item.is_deleted())
            .ok_or(StoreError::NotFound("Item"))
    }

    fn sku_taken(&self, tenant_id: Uuid, sku: &str, except: Option<Uuid>) -> bool {
        self.items.values().any(|item| {
            item.tenant_id == tenant_id
                && !item.is_deleted()
                && item.sku == sku
                && Some(item.id) != except
        })
    }

    fn append(&mut self, movement: InventoryMovement) -> InventoryMovement {
        self.movements.push(movement.clone());
        movement
    }

    fn latest_occurred_at(&self, tenant_id: Uuid, item_id: Uuid) -> Option<DateTime<Utc>> {
        self.movements
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.item_id == item_id)
            .map(|m| m.occurred_at)
            .max()
    }

    fn next_sequence(&mut self) -> i64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}

/// Ledger store kept in process memory.
///
/// One write guard covers each whole operation, so a movement and its
/// balance update are always observed together.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: RwLock<State>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare_items(a: &InventoryItem, b: &InventoryItem, sort: ItemSort) -> Ordering {
    let primary = match sort {
        ItemSort::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        ItemSort::Sku => a.sku.cmp(&b.sku),
        ItemSort::OnHandQty => a.on_hand_qty().cmp(&b.on_hand_qty()),
        ItemSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_item(
        &self,
        tenant_id: Uuid,
        item: NewInventoryItem,
        performed_by: Option<Uuid>,
    ) -> StoreResult<InventoryItem> {
        let mut state = self.state.write().await;

        if state.sku_taken(tenant_id, &item.sku, None) {
            return Err(StoreError::DuplicateSku(item.sku));
        }

        let now = Utc::now();
        let record = InventoryItem {
            id: Uuid::new_v4(),
            tenant_id,
            sku: item.sku,
            name: item.name,
            category: item.category,
            barcode: item.barcode,
            attributes: item.attributes,
            cost: item.cost,
            price: item.price,
            supplier_name: item.supplier_name,
            supplier_contact: item.supplier_contact,
            location: item.location,
            stock: StockLevels::new(item.on_hand_qty, item.allocated_qty),
            min_stock_level: item.min_stock_level,
            reorder_point: item.reorder_point,
            reorder_quantity: item.reorder_quantity,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        if item.on_hand_qty > 0 {
            let sequence = state.next_sequence();
            state.append(InventoryMovement {
                id: Uuid::new_v4(),
                tenant_id,
                item_id: record.id,
                sequence,
                movement_type: MovementType::Adjust,
                quantity: item.on_hand_qty,
                previous_qty: 0,
                resulting_qty: item.on_hand_qty,
                unit_cost: Some(record.cost),
                from_location: None,
                to_location: None,
                reference_type: None,
                reference_id: None,
                reason: Some(OPENING_BALANCE_REASON.to_string()),
                notes: None,
                attachment: None,
                performed_by,
                occurred_at: now,
                created_at: now,
            });
        }

        state.items.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_item(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        include_deleted: bool,
    ) -> StoreResult<Option<InventoryItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .get(&item_id)
            .filter(|item| item.tenant_id == tenant_id && (include_deleted || !item.is_deleted()))
            .cloned())
    }

    async fn list_items(
        &self,
        tenant_id: Uuid,
        query: &ItemQuery,
    ) -> StoreResult<(Vec<InventoryItem>, u64)> {
        let state = self.state.read().await;
        let mut matching: Vec<&InventoryItem> = state
            .items
            .values()
            .filter(|item| item.tenant_id == tenant_id && query.filter.matches(item))
            .collect();

        matching.sort_by(|a, b| {
            let ordering = compare_items(a, b, query.sort);
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.pagination.offset() as usize)
            .take(query.pagination.limit() as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn active_items(&self, tenant_id: Uuid) -> StoreResult<Vec<InventoryItem>> {
        let state = self.state.read().await;
        let mut items: Vec<InventoryItem> = state
            .items
            .values()
            .filter(|item| item.tenant_id == tenant_id && !item.is_deleted())
            .cloned()
            .collect();
        items.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(items)
    }

    async fn update_item(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        patch: &ItemPatch,
    ) -> StoreResult<InventoryItem> {
        let mut state = self.state.write().await;
        state.live_item_mut(tenant_id, item_id)?;

        if let Some(sku) = &patch.sku {
            if state.sku_taken(tenant_id, sku, Some(item_id)) {
                return Err(StoreError::DuplicateSku(sku.clone()));
            }
        }

        let item = state.live_item_mut(tenant_id, item_id)?;
        patch.apply_to(item);
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn soft_delete_item(&self, tenant_id: Uuid, item_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&item_id)
            .filter(|item| item.tenant_id == tenant_id)
            .ok_or(StoreError::NotFound("Item"))?;

        if item.is_deleted() {
            return Ok(false);
        }
        let now = Utc::now();
        item.deleted_at = Some(now);
        item.updated_at = now;
        Ok(true)
    }

    async fn record_movement(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        movement: NewMovement,
        policy: OverdrawPolicy,
    ) -> StoreResult<RecordedMovement> {
        let mut state = self.state.write().await;

        let previous_qty = state.live_item_mut(tenant_id, item_id)?.on_hand_qty();
        let resulting_qty = movement
            .movement_type
            .apply(previous_qty, movement.quantity, policy)?;

        let now = Utc::now();
        let occurred_at = resolve_occurred_at(
            movement.metadata.occurred_at,
            state.latest_occurred_at(tenant_id, item_id),
            now,
        )?;
        let sequence = state.next_sequence();
        let metadata = movement.metadata;
        let recorded = state.append(InventoryMovement {
            id: Uuid::new_v4(),
            tenant_id,
            item_id,
            sequence,
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            previous_qty,
            resulting_qty,
            unit_cost: metadata.unit_cost,
            from_location: metadata.from_location,
            to_location: metadata.to_location,
            reference_type: metadata.reference_type,
            reference_id: metadata.reference_id,
            reason: metadata.reason,
            notes: metadata.notes,
            attachment: None,
            performed_by: movement.performed_by,
            occurred_at,
            created_at: now,
        });

        let item = state.live_item_mut(tenant_id, item_id)?;
        item.stock = item.stock.with_on_hand(resulting_qty);
        item.updated_at = now;

        Ok(RecordedMovement {
            movement: recorded,
            item: item.clone(),
        })
    }

    async fn change_allocation(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        change: AllocationChange,
    ) -> StoreResult<InventoryItem> {
        let mut state = self.state.write().await;
        let item = state.live_item_mut(tenant_id, item_id)?;

        item.stock = match change {
            AllocationChange::Reserve(quantity) => item.stock.reserve(quantity)?,
            AllocationChange::Release(quantity) => item.stock.release(quantity)?,
        };
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn list_movements(
        &self,
        tenant_id: Uuid,
        query: &MovementQuery,
    ) -> StoreResult<Vec<InventoryMovement>> {
        let state = self.state.read().await;
        let mut movements: Vec<InventoryMovement> = state
            .movements
            .iter()
            .filter(|m| m.tenant_id == tenant_id)
            .filter(|m| query.item_id.map_or(true, |id| m.item_id == id))
            .cloned()
            .collect();

        movements.sort_by_key(|m| (m.occurred_at, m.sequence));
        if query.order == SortOrder::Desc {
            movements.reverse();
        }
        if let Some(limit) = query.limit {
            movements.truncate(limit as usize);
        }
        Ok(movements)
    }

    async fn attach_file(
        &self,
        tenant_id: Uuid,
        movement_id: Uuid,
        file: &StoredFile,
    ) -> StoreResult<InventoryMovement> {
        let mut state = self.state.write().await;
        let movement = state
            .movements
            .iter_mut()
            .find(|m| m.id == movement_id && m.tenant_id == tenant_id && m.attachment.is_none())
            .ok_or(StoreError::NotFound("Movement"))?;

        movement.attachment = Some(file.clone());
        Ok(movement.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{MovementMetadata, Pagination};

    fn movement(movement_type: MovementType, quantity: i32) -> NewMovement {
        NewMovement {
            movement_type,
            quantity,
            metadata: MovementMetadata::default(),
            performed_by: None,
        }
    }

    #[tokio::test]
    async fn test_opening_balance_is_a_movement() {
        let store = MemoryLedgerStore::new();
        let tenant = Uuid::new_v4();
        let mut new_item = NewInventoryItem::with_sku("OPEN-1");
        new_item.on_hand_qty = 12;

        let item = store.insert_item(tenant, new_item, None).await.unwrap();
        let movements = store
            .list_movements(
                tenant,
                &MovementQuery {
                    item_id: Some(item.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::Adjust);
        assert_eq!(movements[0].resulting_qty, 12);
        assert_eq!(movements[0].reason.as_deref(), Some(OPENING_BALANCE_REASON));
    }

    #[tokio::test]
    async fn test_rejected_movement_writes_nothing() {
        let store = MemoryLedgerStore::new();
        let tenant = Uuid::new_v4();
        let item = store
            .insert_item(tenant, NewInventoryItem::with_sku("REJ-1"), None)
            .await
            .unwrap();

        let result = store
            .record_movement(tenant, item.id, movement(MovementType::Out, 3), OverdrawPolicy::Reject)
            .await;
        assert!(matches!(result, Err(StoreError::Rule(_))));

        let movements = store
            .list_movements(tenant, &MovementQuery::default())
            .await
            .unwrap();
        assert!(movements.is_empty());
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = MemoryLedgerStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let item = store
            .insert_item(a, NewInventoryItem::with_sku("SHARED"), None)
            .await
            .unwrap();

        // the same SKU is free in another tenant
        store
            .insert_item(b, NewInventoryItem::with_sku("SHARED"), None)
            .await
            .unwrap();

        assert!(store.get_item(b, item.id, true).await.unwrap().is_none());
        let (page, total) = store.list_items(b, &ItemQuery::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_ne!(page[0].id, item.id);
    }

    #[tokio::test]
    async fn test_list_items_sorts_and_pages() {
        let store = MemoryLedgerStore::new();
        let tenant = Uuid::new_v4();
        for sku in ["C", "A", "B"] {
            store
                .insert_item(tenant, NewInventoryItem::with_sku(sku), None)
                .await
                .unwrap();
        }

        let query = ItemQuery {
            sort: ItemSort::Sku,
            order: SortOrder::Asc,
            pagination: Pagination::new(1, 2),
            ..Default::default()
        };
        let (page, total) = store.list_items(tenant, &query).await.unwrap();
        assert_eq!(total, 3);
        let skus: Vec<&str> = page.iter().map(|i| i.sku.as_str()).collect();
        assert_eq!(skus, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_attach_file_only_once() {
        let store = MemoryLedgerStore::new();
        let tenant = Uuid::new_v4();
        let item = store
            .insert_item(tenant, NewInventoryItem::with_sku("DOC-1"), None)
            .await
            .unwrap();
        let recorded = store
            .record_movement(tenant, item.id, movement(MovementType::In, 5), OverdrawPolicy::Clamp)
            .await
            .unwrap();

        let file = StoredFile {
            url: "https://files.example.com/inv-1.pdf".to_string(),
            size_bytes: 1024,
            name: "inv-1.pdf".to_string(),
        };
        let attached = store
            .attach_file(tenant, recorded.movement.id, &file)
            .await
            .unwrap();
        assert_eq!(attached.attachment, Some(file.clone()));

        assert!(store
            .attach_file(tenant, recorded.movement.id, &file)
            .await
            .is_err());
    }
}
