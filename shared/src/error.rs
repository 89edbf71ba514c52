//! Errors raised by the pure ledger rules

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::MovementType;

/// A movement that the ledger rules refuse to apply
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerRuleError {
    #[error("{movement_type} quantity {quantity} is not allowed")]
    InvalidQuantity {
        movement_type: MovementType,
        quantity: i32,
    },

    #[error("cannot withdraw {requested} units, only {on_hand} on hand")]
    Overdraw { requested: i32, on_hand: i32 },

    #[error("reservation quantity {quantity} must be greater than zero")]
    InvalidReservation { quantity: i32 },

    #[error("cannot reserve {requested} units, only {available} available")]
    InsufficientAvailable { requested: i32, available: i32 },

    #[error("quantity overflow: {current} + {quantity}")]
    Overflow { current: i32, quantity: i32 },

    #[error("occurred_at {occurred_at} is earlier than the item's latest movement at {latest}")]
    Backdated {
        occurred_at: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

impl LedgerRuleError {
    /// Input field the error is about
    pub fn field(&self) -> &'static str {
        match self {
            LedgerRuleError::Backdated { .. } => "occurred_at",
            _ => "quantity",
        }
    }
}
