//! Inventory movement models and the quantity application rule

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerRuleError;
use crate::types::StoredFile;

/// Kind of quantity change recorded by a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    /// Stock received; adds to on-hand
    In,
    /// Stock withdrawn; subtracts from on-hand
    Out,
    /// Physical count; sets on-hand to an absolute value
    Adjust,
    /// Relocation within the same item; on-hand unchanged
    Transfer,
}

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::In,
        MovementType::Out,
        MovementType::Adjust,
        MovementType::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjust => "ADJUST",
            MovementType::Transfer => "TRANSFER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Some(MovementType::In),
            "OUT" => Some(MovementType::Out),
            "ADJUST" => Some(MovementType::Adjust),
            "TRANSFER" => Some(MovementType::Transfer),
            _ => None,
        }
    }

    /// Whether `quantity` is acceptable for this movement type
    pub fn accepts_quantity(&self, quantity: i32) -> bool {
        match self {
            MovementType::Adjust => quantity >= 0,
            MovementType::In | MovementType::Out | MovementType::Transfer => quantity > 0,
        }
    }

    /// Compute the on-hand quantity after applying this movement.
    ///
    /// Rejects quantities the type does not accept. An `Out` larger than
    /// `current` floors at zero under [`OverdrawPolicy::Clamp`] and fails
    /// under [`OverdrawPolicy::Reject`].
    pub fn apply(
        &self,
        current: i32,
        quantity: i32,
        policy: OverdrawPolicy,
    ) -> Result<i32, LedgerRuleError> {
        if !self.accepts_quantity(quantity) {
            return Err(LedgerRuleError::InvalidQuantity {
                movement_type: *self,
                quantity,
            });
        }

        match self {
            MovementType::In => {
                current
                    .checked_add(quantity)
                    .ok_or(LedgerRuleError::Overflow { current, quantity })
            }
            MovementType::Out => {
                if quantity > current && policy == OverdrawPolicy::Reject {
                    return Err(LedgerRuleError::Overdraw {
                        requested: quantity,
                        on_hand: current,
                    });
                }
                Ok(self.next_balance(current, quantity))
            }
            MovementType::Adjust | MovementType::Transfer => Ok(self.next_balance(current, quantity)),
        }
    }

    /// Infallible form of [`MovementType::apply`] used when replaying
    /// movements that were already accepted.
    pub fn next_balance(&self, current: i32, quantity: i32) -> i32 {
        match self {
            MovementType::In => current.saturating_add(quantity),
            MovementType::Out => current.saturating_sub(quantity).max(0),
            MovementType::Adjust => quantity.max(0),
            MovementType::Transfer => current,
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when an `Out` movement asks for more than is on hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverdrawPolicy {
    /// Floor the balance at zero and keep the requested quantity in the log
    #[default]
    Clamp,
    /// Refuse the movement
    Reject,
}

/// Optional context recorded alongside a movement
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MovementMetadata {
    /// Unit cost at the time of the movement
    pub unit_cost: Option<Decimal>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    /// Kind of linked record, e.g. `order`
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// Logical event time; defaults to the recording time
    pub occurred_at: Option<DateTime<Utc>>,
}

/// A movement that has passed validation but is not yet written
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovement {
    pub movement_type: MovementType,
    pub quantity: i32,
    pub metadata: MovementMetadata,
    pub performed_by: Option<Uuid>,
}

/// Immutable ledger entry of a quantity change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub item_id: Uuid,
    /// Monotonic insertion order, breaks ties between equal `occurred_at`
    pub sequence: i64,
    pub movement_type: MovementType,
    /// Quantity as requested, even when the balance was clamped
    pub quantity: i32,
    pub previous_qty: i32,
    pub resulting_qty: i32,
    pub unit_cost: Option<Decimal>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub attachment: Option<StoredFile>,
    pub performed_by: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    /// Whether the stored balance was floored below what was requested
    pub fn was_clamped(&self) -> bool {
        self.movement_type == MovementType::Out && self.quantity > self.previous_qty
    }
}

/// Rebuild an on-hand balance by folding movements from zero in
/// `(occurred_at, sequence)` order.
pub fn replay_balance<'a, I>(movements: I) -> i32
where
    I: IntoIterator<Item = &'a InventoryMovement>,
{
    let mut ordered: Vec<&InventoryMovement> = movements.into_iter().collect();
    ordered.sort_by_key(|m| (m.occurred_at, m.sequence));
    ordered
        .iter()
        .fold(0, |balance, m| m.movement_type.next_balance(balance, m.quantity))
}

/// Event time of a new movement, given the item's latest movement.
///
/// The stored balance is the running result in insertion order, so a movement
/// may not be placed before one already recorded. Without an explicit time the
/// movement is stamped `now`, or at `latest` when the clock is behind it.
pub fn resolve_occurred_at(
    requested: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, LedgerRuleError> {
    match (requested, latest) {
        (Some(occurred_at), Some(latest)) if occurred_at < latest => {
            Err(LedgerRuleError::Backdated {
                occurred_at,
                latest,
            })
        }
        (Some(occurred_at), _) => Ok(occurred_at),
        (None, Some(latest)) => Ok(now.max(latest)),
        (None, None) => Ok(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn movement(sequence: i64, movement_type: MovementType, quantity: i32) -> InventoryMovement {
        let at = Utc.timestamp_opt(sequence, 0).unwrap();
        InventoryMovement {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            item_id: Uuid::nil(),
            sequence,
            movement_type,
            quantity,
            previous_qty: 0,
            resulting_qty: 0,
            unit_cost: None,
            from_location: None,
            to_location: None,
            reference_type: None,
            reference_id: None,
            reason: None,
            notes: None,
            attachment: None,
            performed_by: None,
            occurred_at: at,
            created_at: at,
        }
    }

    #[test]
    fn test_in_adds() {
        assert_eq!(MovementType::In.apply(3, 7, OverdrawPolicy::Clamp), Ok(10));
    }

    #[test]
    fn test_out_floors_at_zero() {
        assert_eq!(MovementType::Out.apply(4, 10, OverdrawPolicy::Clamp), Ok(0));
        assert_eq!(MovementType::Out.apply(20, 16, OverdrawPolicy::Clamp), Ok(4));
    }

    #[test]
    fn test_out_rejected_under_reject_policy() {
        assert_eq!(
            MovementType::Out.apply(4, 10, OverdrawPolicy::Reject),
            Err(LedgerRuleError::Overdraw {
                requested: 10,
                on_hand: 4
            })
        );
        // exact withdrawal is fine
        assert_eq!(MovementType::Out.apply(4, 4, OverdrawPolicy::Reject), Ok(0));
    }

    #[test]
    fn test_adjust_is_absolute() {
        let after_first = MovementType::Adjust.apply(7, 50, OverdrawPolicy::Clamp).unwrap();
        let after_second = MovementType::Adjust
            .apply(after_first, 30, OverdrawPolicy::Clamp)
            .unwrap();
        assert_eq!(after_second, 30);
        assert_eq!(MovementType::Adjust.apply(12, 0, OverdrawPolicy::Clamp), Ok(0));
    }

    #[test]
    fn test_transfer_keeps_balance() {
        assert_eq!(MovementType::Transfer.apply(9, 4, OverdrawPolicy::Clamp), Ok(9));
    }

    #[test]
    fn test_invalid_quantities() {
        for t in [MovementType::In, MovementType::Out, MovementType::Transfer] {
            assert!(t.apply(10, 0, OverdrawPolicy::Clamp).is_err());
            assert!(t.apply(10, -1, OverdrawPolicy::Clamp).is_err());
        }
        assert!(MovementType::Adjust.apply(10, -1, OverdrawPolicy::Clamp).is_err());
    }

    #[test]
    fn test_in_overflow() {
        assert_eq!(
            MovementType::In.apply(i32::MAX, 1, OverdrawPolicy::Clamp),
            Err(LedgerRuleError::Overflow {
                current: i32::MAX,
                quantity: 1
            })
        );
    }

    #[test]
    fn test_movement_type_round_trip_names() {
        for t in MovementType::ALL {
            assert_eq!(MovementType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(MovementType::from_str("adjust"), Some(MovementType::Adjust));
        assert_eq!(MovementType::from_str("LOSS"), None);
        assert_eq!(serde_json::to_string(&MovementType::Transfer).unwrap(), "\"TRANSFER\"");
    }

    #[test]
    fn test_replay_uses_occurred_at_order() {
        let mut late_adjust = movement(1, MovementType::Adjust, 50);
        let early_in = movement(2, MovementType::In, 10);
        // the adjust happened after the receipt even though it was recorded first
        late_adjust.occurred_at = early_in.occurred_at + Duration::seconds(60);
        assert_eq!(replay_balance([&late_adjust, &early_in]), 50);
    }

    #[test]
    fn test_resolve_occurred_at() {
        let latest = Utc.timestamp_opt(1_000, 0).unwrap();
        let now = latest + Duration::seconds(30);

        assert_eq!(resolve_occurred_at(None, None, now), Ok(now));
        assert_eq!(resolve_occurred_at(None, Some(latest), now), Ok(now));
        // clock behind the latest movement
        assert_eq!(resolve_occurred_at(None, Some(now), latest), Ok(now));
        assert_eq!(resolve_occurred_at(Some(latest), Some(latest), now), Ok(latest));

        let early = latest - Duration::days(1);
        let err = resolve_occurred_at(Some(early), Some(latest), now).unwrap_err();
        assert_eq!(err, LedgerRuleError::Backdated { occurred_at: early, latest });
        assert_eq!(err.field(), "occurred_at");
        assert_eq!(resolve_occurred_at(Some(early), None, now), Ok(early));
    }

    #[test]
    fn test_replay_scenario() {
        let movements = vec![
            movement(1, MovementType::In, 20),
            movement(2, MovementType::Out, 16),
            movement(3, MovementType::Out, 10),
            movement(4, MovementType::Adjust, 25),
        ];
        assert_eq!(replay_balance(&movements), 25);
        assert_eq!(replay_balance(&movements[..3]), 0);
    }

    #[test]
    fn test_compensating_movement_is_reflected() {
        // an OUT of 5 recorded by mistake is corrected by an IN of 5
        let movements = vec![
            movement(1, MovementType::In, 12),
            movement(2, MovementType::Out, 5),
            movement(3, MovementType::In, 5),
        ];
        assert_eq!(replay_balance(&movements), 12);
        assert_eq!(movements.len(), 3);
    }

    #[test]
    fn test_was_clamped() {
        let mut m = movement(1, MovementType::Out, 10);
        m.previous_qty = 4;
        assert!(m.was_clamped());
        m.previous_qty = 10;
        assert!(!m.was_clamped());
    }

    fn movement_strategy() -> impl Strategy<Value = (MovementType, i32)> {
        prop_oneof![
            (1i32..=500).prop_map(|q| (MovementType::In, q)),
            (1i32..=500).prop_map(|q| (MovementType::Out, q)),
            (0i32..=500).prop_map(|q| (MovementType::Adjust, q)),
            (1i32..=500).prop_map(|q| (MovementType::Transfer, q)),
        ]
    }

    proptest! {
        /// Applying movements one by one matches replaying the whole log
        #[test]
        fn prop_incremental_matches_replay(steps in prop::collection::vec(movement_strategy(), 0..40)) {
            let mut balance = 0;
            let mut log = Vec::new();
            for (i, (t, q)) in steps.iter().enumerate() {
                balance = t.apply(balance, *q, OverdrawPolicy::Clamp).unwrap();
                log.push(movement(i as i64, *t, *q));
            }
            prop_assert_eq!(replay_balance(&log), balance);
        }

        #[test]
        fn prop_balance_never_negative(steps in prop::collection::vec(movement_strategy(), 0..40)) {
            let mut balance = 0;
            for (t, q) in steps {
                balance = t.apply(balance, q, OverdrawPolicy::Clamp).unwrap();
                prop_assert!(balance >= 0);
            }
        }
    }
}
