//! WebAssembly module for the Inventory Ledger
//!
//! Lets the dashboard compute the same derived views as the server:
//! - Stock alerts from a list of items
//! - The balance a movement would produce before it is submitted
//! - Available quantity and balance replay

use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::debug_1(&JsValue::from_str("inventory ledger module loaded"));
}

fn js_error(message: String) -> JsValue {
    js_sys::Error::new(&message).into()
}

fn alerts_for_json(items_json: &str) -> Result<String, String> {
    let items: Vec<InventoryItem> =
        serde_json::from_str(items_json).map_err(|e| format!("Invalid items JSON: {}", e))?;
    let alerts = derive_alerts(&items);
    serde_json::to_string(&alerts).map_err(|e| format!("Failed to encode alerts: {}", e))
}

fn preview(
    on_hand_qty: i32,
    movement_type: &str,
    quantity: i32,
    reject_overdraw: bool,
) -> Result<i32, String> {
    let movement_type = MovementType::from_str(movement_type)
        .ok_or_else(|| format!("Unknown movement type: {}", movement_type))?;
    let policy = if reject_overdraw {
        OverdrawPolicy::Reject
    } else {
        OverdrawPolicy::Clamp
    };
    movement_type
        .apply(on_hand_qty, quantity, policy)
        .map_err(|e| e.to_string())
}

fn replay_json(movements_json: &str) -> Result<i32, String> {
    let movements: Vec<InventoryMovement> = serde_json::from_str(movements_json)
        .map_err(|e| format!("Invalid movements JSON: {}", e))?;
    Ok(replay_balance(&movements))
}

/// Derive alerts for a JSON array of items; returns a JSON array of alerts
#[wasm_bindgen]
pub fn derive_alerts_json(items_json: &str) -> Result<String, JsValue> {
    alerts_for_json(items_json).map_err(js_error)
}

/// On-hand quantity after applying a movement, or an error describing why
/// the ledger would refuse it
#[wasm_bindgen]
pub fn preview_movement(
    on_hand_qty: i32,
    movement_type: &str,
    quantity: i32,
    reject_overdraw: bool,
) -> Result<i32, JsValue> {
    preview(on_hand_qty, movement_type, quantity, reject_overdraw).map_err(js_error)
}

/// Units that can be newly committed
#[wasm_bindgen(js_name = available_quantity)]
pub fn available_quantity_js(on_hand_qty: i32, allocated_qty: i32) -> i32 {
    available_quantity(on_hand_qty, allocated_qty)
}

/// Rebuild a balance from a JSON array of movements
#[wasm_bindgen]
pub fn replay_balance_json(movements_json: &str) -> Result<i32, JsValue> {
    replay_json(movements_json).map_err(js_error)
}

/// Check a SKU before submitting a form; returns the problem, if any
#[wasm_bindgen]
pub fn check_sku(sku: &str) -> Option<String> {
    validate_sku(sku).err().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_json(sku: &str, on_hand: i32, deleted: bool) -> String {
        format!(
            r#"{{
                "id": "{}",
                "tenant_id": "00000000-0000-0000-0000-000000000000",
                "sku": "{}",
                "name": "Item {}",
                "category": null,
                "barcode": null,
                "cost": "0",
                "price": "0",
                "supplier_name": null,
                "supplier_contact": null,
                "location": null,
                "on_hand_qty": {},
                "allocated_qty": 0,
                "min_stock_level": 10,
                "reorder_point": 5,
                "reorder_quantity": 20,
                "created_at": "2026-01-01T00:00:00Z",
                "updated_at": "2026-01-01T00:00:00Z",
                "deleted_at": {}
            }}"#,
            uuid_for(sku),
            sku,
            sku,
            on_hand,
            if deleted { r#""2026-02-01T00:00:00Z""# } else { "null" }
        )
    }

    fn uuid_for(sku: &str) -> String {
        format!("00000000-0000-0000-0000-{:012}", sku.len())
    }

    #[test]
    fn test_alerts_from_json() {
        let json = format!(
            "[{}, {}, {}]",
            item_json("A", 3, false),
            item_json("BB", 0, false),
            item_json("CCC", 0, true)
        );
        let alerts: Vec<InventoryAlert> =
            serde_json::from_str(&alerts_for_json(&json).unwrap()).unwrap();

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].sku, "BB");
        assert_eq!(alerts[0].alert_type, AlertType::OutOfStock);
        assert_eq!(alerts[1].sku, "A");
        assert_eq!(alerts[1].priority, AlertPriority::Medium);
    }

    #[test]
    fn test_alerts_reject_bad_json() {
        assert!(alerts_for_json("{not json").is_err());
    }

    #[test]
    fn test_preview_movement() {
        assert_eq!(preview(20, "OUT", 16, false), Ok(4));
        assert_eq!(preview(4, "out", 10, false), Ok(0));
        assert!(preview(4, "OUT", 10, true).is_err());
        assert_eq!(preview(0, "ADJUST", 25, false), Ok(25));
        assert_eq!(preview(7, "TRANSFER", 3, false), Ok(7));
        assert!(preview(7, "IN", 0, false).is_err());
        assert!(preview(7, "RETURN", 1, false).is_err());
    }

    #[test]
    fn test_available_quantity() {
        assert_eq!(available_quantity_js(10, 4), 6);
        assert_eq!(available_quantity_js(2, 9), 0);
    }

    #[test]
    fn test_check_sku() {
        assert!(check_sku("MUG-001").is_none());
        assert!(check_sku("MUG 001").is_some());
    }
}
