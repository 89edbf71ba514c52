//! Derived stock alerts

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::InventoryItem;

/// Namespace for alert ids, so the same item state always yields the same id
const ALERT_NAMESPACE: Uuid = Uuid::from_u128(0x6c1d_2f5e_8a47_4b0e_9d3a_51f7_c0e2_a914);

/// Kind of stock alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    OutOfStock,
    LowStock,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::OutOfStock => "OUT_OF_STOCK",
            AlertType::LowStock => "LOW_STOCK",
        }
    }

    pub fn priority(&self) -> AlertPriority {
        match self {
            AlertType::OutOfStock => AlertPriority::High,
            AlertType::LowStock => AlertPriority::Medium,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert priority; orders `High` before `Medium`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertPriority {
    High,
    Medium,
}

/// A stock alert computed from current item state. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryAlert {
    pub id: Uuid,
    pub item_id: Uuid,
    pub sku: String,
    pub item_name: String,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub on_hand_qty: i32,
    pub reorder_point: i32,
    pub suggested_reorder_qty: i32,
    pub message: String,
}

/// Stable id of the alert of `alert_type` raised for `item_id`
pub fn alert_id(item_id: Uuid, alert_type: AlertType) -> Uuid {
    let mut name = item_id.as_bytes().to_vec();
    name.extend_from_slice(alert_type.as_str().as_bytes());
    Uuid::new_v5(&ALERT_NAMESPACE, &name)
}

/// The alert an item currently warrants, if any
pub fn alert_for(item: &InventoryItem) -> Option<InventoryAlert> {
    if item.is_deleted() {
        return None;
    }

    let on_hand = item.on_hand_qty();
    let alert_type = if on_hand <= 0 {
        AlertType::OutOfStock
    } else if on_hand <= item.reorder_point {
        AlertType::LowStock
    } else {
        return None;
    };

    let message = match alert_type {
        AlertType::OutOfStock => format!("{} ({}) is out of stock", item.name, item.sku),
        AlertType::LowStock => format!(
            "{} ({}) is low on stock: {} left, reorder point {}",
            item.name, item.sku, on_hand, item.reorder_point
        ),
    };

    Some(InventoryAlert {
        id: alert_id(item.id, alert_type),
        item_id: item.id,
        sku: item.sku.clone(),
        item_name: item.name.clone(),
        alert_type,
        priority: alert_type.priority(),
        on_hand_qty: on_hand,
        reorder_point: item.reorder_point,
        suggested_reorder_qty: item.reorder_quantity,
        message,
    })
}

/// Derive the alert set for `items`: at most one alert per active item,
/// high priority first, then by SKU.
pub fn derive_alerts<'a, I>(items: I) -> Vec<InventoryAlert>
where
    I: IntoIterator<Item = &'a InventoryItem>,
{
    let mut alerts: Vec<InventoryAlert> = items.into_iter().filter_map(alert_for).collect();
    alerts.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.sku.cmp(&b.sku))
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    alerts
}
