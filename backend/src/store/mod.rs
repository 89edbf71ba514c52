//! Persistent store behind the inventory ledger
//!
//! The ledger talks to its store only through [`LedgerStore`]. Every
//! implementation must apply a movement and its balance update as one unit of
//! change: a reader never observes one without the other.

use async_trait::async_trait;
use serde::Serialize;
use shared::{
    InventoryItem, InventoryMovement, ItemFilter, ItemPatch, ItemSort, LedgerRuleError,
    NewInventoryItem, NewMovement, OverdrawPolicy, Pagination, SortOrder, StoredFile,
};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Reason recorded on the movement that carries an item's opening balance
pub const OPENING_BALANCE_REASON: &str = "opening balance";

/// Store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("SKU {0} already exists")]
    DuplicateSku(String),

    #[error(transparent)]
    Rule(#[from] LedgerRuleError),

    /// The movement row may exist without its balance update
    #[error("movement {movement_id} recorded but balance of item {item_id} not confirmed: {message}")]
    BalanceNotApplied {
        item_id: Uuid,
        movement_id: Uuid,
        message: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A movement together with the item state it produced
#[derive(Debug, Clone, Serialize)]
pub struct RecordedMovement {
    pub movement: InventoryMovement,
    pub item: InventoryItem,
}

/// Change to an item's allocated quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationChange {
    Reserve(i32),
    Release(i32),
}

/// Movement feed query
#[derive(Debug, Clone, Default)]
pub struct MovementQuery {
    /// Restrict to one item; the global feed when absent
    pub item_id: Option<Uuid>,
    /// Maximum rows; unbounded when absent
    pub limit: Option<u32>,
    /// Ordered by `(occurred_at, sequence)`
    pub order: SortOrder,
}

/// Item listing query
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    pub filter: ItemFilter,
    pub sort: ItemSort,
    pub order: SortOrder,
    pub pagination: Pagination,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Check the store is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// Insert an item. A non-zero opening `on_hand_qty` is written as an
    /// `ADJUST` movement in the same unit of change.
    async fn insert_item(
        &self,
        tenant_id: Uuid,
        item: NewInventoryItem,
        performed_by: Option<Uuid>,
    ) -> StoreResult<InventoryItem>;

    async fn get_item(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        include_deleted: bool,
    ) -> StoreResult<Option<InventoryItem>>;

    /// One page of items plus the total number of matching items
    async fn list_items(
        &self,
        tenant_id: Uuid,
        query: &ItemQuery,
    ) -> StoreResult<(Vec<InventoryItem>, u64)>;

    /// All live items of a tenant
    async fn active_items(&self, tenant_id: Uuid) -> StoreResult<Vec<InventoryItem>>;

    /// Apply a patch to a live item and refresh `updated_at`
    async fn update_item(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        patch: &ItemPatch,
    ) -> StoreResult<InventoryItem>;

    /// Soft delete. Returns `false` when the item was already deleted.
    async fn soft_delete_item(&self, tenant_id: Uuid, item_id: Uuid) -> StoreResult<bool>;

    /// Append a movement and apply its effect to the item's on-hand quantity
    async fn record_movement(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        movement: NewMovement,
        policy: OverdrawPolicy,
    ) -> StoreResult<RecordedMovement>;

    async fn change_allocation(
        &self,
        tenant_id: Uuid,
        item_id: Uuid,
        change: AllocationChange,
    ) -> StoreResult<InventoryItem>;

    async fn list_movements(
        &self,
        tenant_id: Uuid,
        query: &MovementQuery,
    ) -> StoreResult<Vec<InventoryMovement>>;

    /// Attach a stored file to a movement that has none yet
    async fn attach_file(
        &self,
        tenant_id: Uuid,
        movement_id: Uuid,
        file: &StoredFile,
    ) -> StoreResult<InventoryMovement>;
}
