//! Boundary validation for ledger inputs
//!
//! These checks run before anything reaches the store, so a rejected input
//! never leaves a partial write behind.

use rust_decimal::Decimal;

use crate::models::{ItemPatch, MovementMetadata, MovementType, NewInventoryItem};

/// Longest SKU the ledger accepts
pub const MAX_SKU_LENGTH: usize = 64;

/// Validate SKU format: 1-64 characters, no whitespace
pub fn validate_sku(sku: &str) -> Result<(), &'static str> {
    if sku.is_empty() {
        return Err("SKU is required");
    }
    if sku.chars().count() > MAX_SKU_LENGTH {
        return Err("SKU must be at most 64 characters");
    }
    if sku.chars().any(char::is_whitespace) {
        return Err("SKU cannot contain whitespace");
    }
    Ok(())
}

/// Validate a unit cost or price
pub fn validate_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    Ok(())
}

/// Validate a stock quantity or threshold
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity < 0 {
        return Err("Quantity cannot be negative");
    }
    Ok(())
}

/// Validate a movement's quantity and metadata for its type
pub fn validate_movement(
    movement_type: MovementType,
    quantity: i32,
    metadata: &MovementMetadata,
) -> Result<(), (&'static str, &'static str)> {
    if !movement_type.accepts_quantity(quantity) {
        let message = match movement_type {
            MovementType::Adjust => "ADJUST quantity cannot be negative",
            _ => "Quantity must be greater than zero",
        };
        return Err(("quantity", message));
    }

    if let Some(unit_cost) = metadata.unit_cost {
        validate_amount(unit_cost).map_err(|m| ("unit_cost", m))?;
    }

    if movement_type == MovementType::Transfer {
        let from = metadata.from_location.as_deref().map(str::trim).unwrap_or("");
        let to = metadata.to_location.as_deref().map(str::trim).unwrap_or("");
        if from.is_empty() || to.is_empty() {
            return Err(("to_location", "TRANSFER requires both from and to locations"));
        }
        if from == to {
            return Err(("to_location", "TRANSFER locations must differ"));
        }
    }

    Ok(())
}

/// Validate a new item, returning the offending field on failure
pub fn validate_new_item(item: &NewInventoryItem) -> Result<(), (&'static str, &'static str)> {
    validate_sku(&item.sku).map_err(|m| ("sku", m))?;
    validate_amount(item.cost).map_err(|m| ("cost", m))?;
    validate_amount(item.price).map_err(|m| ("price", m))?;
    validate_quantity(item.on_hand_qty).map_err(|m| ("on_hand_qty", m))?;
    validate_quantity(item.allocated_qty).map_err(|m| ("allocated_qty", m))?;
    validate_quantity(item.min_stock_level).map_err(|m| ("min_stock_level", m))?;
    validate_quantity(item.reorder_point).map_err(|m| ("reorder_point", m))?;
    validate_quantity(item.reorder_quantity).map_err(|m| ("reorder_quantity", m))?;
    Ok(())
}

/// Validate the fields present in an item patch
pub fn validate_patch(patch: &ItemPatch) -> Result<(), (&'static str, &'static str)> {
    if let Some(sku) = &patch.sku {
        validate_sku(sku).map_err(|m| ("sku", m))?;
    }
    if let Some(cost) = patch.cost {
        validate_amount(cost).map_err(|m| ("cost", m))?;
    }
    if let Some(price) = patch.price {
        validate_amount(price).map_err(|m| ("price", m))?;
    }
    let thresholds = [
        ("min_stock_level", patch.min_stock_level),
        ("reorder_point", patch.reorder_point),
        ("reorder_quantity", patch.reorder_quantity),
    ];
    for (field, value) in thresholds {
        if let Some(value) = value {
            validate_quantity(value).map_err(|m| (field, m))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("MUG-001").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("MUG 001").is_err());
        assert!(validate_sku(&"X".repeat(65)).is_err());
        assert!(validate_sku(&"X".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(Decimal::ZERO).is_ok());
        assert!(validate_amount(Decimal::new(1999, 2)).is_ok());
        assert!(validate_amount(Decimal::new(-1, 2)).is_err());
    }

    #[test]
    fn test_validate_movement_quantities() {
        let meta = MovementMetadata::default();
        assert!(validate_movement(MovementType::In, 1, &meta).is_ok());
        assert_eq!(
            validate_movement(MovementType::Out, 0, &meta).unwrap_err().0,
            "quantity"
        );
        assert!(validate_movement(MovementType::Adjust, 0, &meta).is_ok());
        assert!(validate_movement(MovementType::Adjust, -3, &meta).is_err());
    }

    #[test]
    fn test_validate_transfer_locations() {
        let mut meta = MovementMetadata {
            from_location: Some("Shelf A".to_string()),
            ..Default::default()
        };
        assert!(validate_movement(MovementType::Transfer, 2, &meta).is_err());

        meta.to_location = Some("Shelf A".to_string());
        assert!(validate_movement(MovementType::Transfer, 2, &meta).is_err());

        meta.to_location = Some("Back room".to_string());
        assert!(validate_movement(MovementType::Transfer, 2, &meta).is_ok());
    }

    #[test]
    fn test_validate_movement_unit_cost() {
        let meta = MovementMetadata {
            unit_cost: Some(Decimal::new(-500, 2)),
            ..Default::default()
        };
        assert_eq!(
            validate_movement(MovementType::In, 5, &meta).unwrap_err().0,
            "unit_cost"
        );
    }

    #[test]
    fn test_validate_new_item() {
        let mut item = NewInventoryItem::with_sku("HAT-01");
        assert!(validate_new_item(&item).is_ok());

        item.price = Decimal::new(-1, 0);
        assert_eq!(validate_new_item(&item).unwrap_err().0, "price");

        item.price = Decimal::ZERO;
        item.on_hand_qty = -4;
        assert_eq!(validate_new_item(&item).unwrap_err().0, "on_hand_qty");
    }

    #[test]
    fn test_validate_patch() {
        assert!(validate_patch(&ItemPatch::default()).is_ok());

        let patch = ItemPatch {
            reorder_point: Some(-1),
            ..Default::default()
        };
        assert_eq!(validate_patch(&patch).unwrap_err().0, "reorder_point");

        let patch = ItemPatch {
            sku: Some("has space".to_string()),
            ..Default::default()
        };
        assert_eq!(validate_patch(&patch).unwrap_err().0, "sku");
    }
}
