//! Inventory item models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerRuleError;

/// Default on-hand level the business wants to keep
pub const DEFAULT_MIN_STOCK_LEVEL: i32 = 10;
/// Default on-hand threshold at or below which restocking is due
pub const DEFAULT_REORDER_POINT: i32 = 5;
/// Default quantity suggested when restocking
pub const DEFAULT_REORDER_QUANTITY: i32 = 20;

/// Free-form item attributes (color, size, pack...).
///
/// The schema is documented per category, not enforced by the ledger.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Units that can be newly committed: `max(on_hand - allocated, 0)`
pub fn available_quantity(on_hand_qty: i32, allocated_qty: i32) -> i32 {
    on_hand_qty.saturating_sub(allocated_qty).max(0)
}

/// Quantity state of an item.
///
/// `available_qty` is always derived from the other two and cannot be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawStockLevels")]
pub struct StockLevels {
    on_hand_qty: i32,
    allocated_qty: i32,
    available_qty: i32,
}

#[derive(Deserialize)]
struct RawStockLevels {
    #[serde(default)]
    on_hand_qty: i32,
    #[serde(default)]
    allocated_qty: i32,
}

impl From<RawStockLevels> for StockLevels {
    fn from(raw: RawStockLevels) -> Self {
        StockLevels::new(raw.on_hand_qty, raw.allocated_qty)
    }
}

impl Default for StockLevels {
    fn default() -> Self {
        StockLevels::new(0, 0)
    }
}

impl StockLevels {
    pub fn new(on_hand_qty: i32, allocated_qty: i32) -> Self {
        Self {
            on_hand_qty,
            allocated_qty,
            available_qty: available_quantity(on_hand_qty, allocated_qty),
        }
    }

    pub fn on_hand_qty(&self) -> i32 {
        self.on_hand_qty
    }

    pub fn allocated_qty(&self) -> i32 {
        self.allocated_qty
    }

    pub fn available_qty(&self) -> i32 {
        self.available_qty
    }

    pub fn with_on_hand(self, on_hand_qty: i32) -> Self {
        Self::new(on_hand_qty, self.allocated_qty)
    }

    pub fn with_allocated(self, allocated_qty: i32) -> Self {
        Self::new(self.on_hand_qty, allocated_qty)
    }

    /// Reserve `quantity` against open orders; cannot exceed what is available
    pub fn reserve(self, quantity: i32) -> Result<Self, LedgerRuleError> {
        if quantity <= 0 {
            return Err(LedgerRuleError::InvalidReservation { quantity });
        }
        if quantity > self.available_qty {
            return Err(LedgerRuleError::InsufficientAvailable {
                requested: quantity,
                available: self.available_qty,
            });
        }
        Ok(self.with_allocated(self.allocated_qty + quantity))
    }

    /// Release a reservation; allocated floors at zero
    pub fn release(self, quantity: i32) -> Result<Self, LedgerRuleError> {
        if quantity <= 0 {
            return Err(LedgerRuleError::InvalidReservation { quantity });
        }
        Ok(self.with_allocated((self.allocated_qty - quantity).max(0)))
    }
}

/// A stocked product record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    /// Unit acquisition price
    pub cost: Decimal,
    /// Unit sale price
    pub price: Decimal,
    pub supplier_name: Option<String>,
    pub supplier_contact: Option<String>,
    /// Warehouse/location label
    pub location: Option<String>,
    #[serde(flatten)]
    pub stock: StockLevels,
    pub min_stock_level: i32,
    pub reorder_point: i32,
    pub reorder_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl InventoryItem {
    pub fn on_hand_qty(&self) -> i32 {
        self.stock.on_hand_qty()
    }

    pub fn allocated_qty(&self) -> i32 {
        self.stock.allocated_qty()
    }

    pub fn available_qty(&self) -> i32 {
        self.stock.available_qty()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields for a new item, with defaults already applied
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewInventoryItem {
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub barcode: Option<String>,
    pub attributes: Attributes,
    pub cost: Decimal,
    pub price: Decimal,
    pub supplier_name: Option<String>,
    pub supplier_contact: Option<String>,
    pub location: Option<String>,
    /// Opening balance, recorded as an ADJUST movement
    pub on_hand_qty: i32,
    pub allocated_qty: i32,
    pub min_stock_level: i32,
    pub reorder_point: i32,
    pub reorder_quantity: i32,
}

impl NewInventoryItem {
    /// A new item with only a SKU; every other field takes its default
    pub fn with_sku(sku: impl Into<String>) -> Self {
        let sku = sku.into();
        Self {
            name: sku.clone(),
            sku,
            category: None,
            barcode: None,
            attributes: Attributes::new(),
            cost: Decimal::ZERO,
            price: Decimal::ZERO,
            supplier_name: None,
            supplier_contact: None,
            location: None,
            on_hand_qty: 0,
            allocated_qty: 0,
            min_stock_level: DEFAULT_MIN_STOCK_LEVEL,
            reorder_point: DEFAULT_REORDER_POINT,
            reorder_quantity: DEFAULT_REORDER_QUANTITY,
        }
    }
}

/// Partial update of an item's descriptive, commercial and threshold fields.
///
/// Quantities are deliberately absent: they only change through movements
/// and reservations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub attributes: Option<Attributes>,
    pub cost: Option<Decimal>,
    pub price: Option<Decimal>,
    pub supplier_name: Option<String>,
    pub supplier_contact: Option<String>,
    pub location: Option<String>,
    pub min_stock_level: Option<i32>,
    pub reorder_point: Option<i32>,
    pub reorder_quantity: Option<i32>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        *self == ItemPatch::default()
    }

    /// Apply the present fields onto `item`
    pub fn apply_to(&self, item: &mut InventoryItem) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(category) = &self.category {
            item.category = Some(category.clone());
        }
        if let Some(sku) = &self.sku {
            item.sku = sku.clone();
        }
        if let Some(barcode) = &self.barcode {
            item.barcode = Some(barcode.clone());
        }
        if let Some(attributes) = &self.attributes {
            item.attributes = attributes.clone();
        }
        if let Some(cost) = self.cost {
            item.cost = cost;
        }
        if let Some(price) = self.price {
            item.price = price;
        }
        if let Some(supplier_name) = &self.supplier_name {
            item.supplier_name = Some(supplier_name.clone());
        }
        if let Some(supplier_contact) = &self.supplier_contact {
            item.supplier_contact = Some(supplier_contact.clone());
        }
        if let Some(location) = &self.location {
            item.location = Some(location.clone());
        }
        if let Some(min_stock_level) = self.min_stock_level {
            item.min_stock_level = min_stock_level;
        }
        if let Some(reorder_point) = self.reorder_point {
            item.reorder_point = reorder_point;
        }
        if let Some(reorder_quantity) = self.reorder_quantity {
            item.reorder_quantity = reorder_quantity;
        }
    }
}

/// Filters for listing items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFilter {
    /// Case-insensitive match on name, SKU or barcode
    pub search: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl ItemFilter {
    pub fn matches(&self, item: &InventoryItem) -> bool {
        if item.is_deleted() && !self.include_deleted {
            return false;
        }
        if let Some(category) = &self.category {
            if item.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        match &self.search {
            Some(term) if !term.trim().is_empty() => {
                let term = term.trim().to_lowercase();
                item.name.to_lowercase().contains(&term)
                    || item.sku.to_lowercase().contains(&term)
                    || item
                        .barcode
                        .as_deref()
                        .is_some_and(|b| b.to_lowercase().contains(&term))
            }
            _ => true,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_item(sku: &str, on_hand_qty: i32, reorder_point: i32) -> InventoryItem {
    let now = Utc::now();
    InventoryItem {
        id: Uuid::new_v4(),
        tenant_id: Uuid::nil(),
        sku: sku.to_string(),
        name: format!("Item {}", sku),
        category: None,
        barcode: None,
        attributes: Attributes::new(),
        cost: Decimal::ZERO,
        price: Decimal::ZERO,
        supplier_name: None,
        supplier_contact: None,
        location: None,
        stock: StockLevels::new(on_hand_qty, 0),
        min_stock_level: DEFAULT_MIN_STOCK_LEVEL,
        reorder_point,
        reorder_quantity: DEFAULT_REORDER_QUANTITY,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}
