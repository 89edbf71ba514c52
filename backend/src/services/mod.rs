//! Business logic services for the inventory ledger

pub mod inventory;
pub mod reconciler;

pub use inventory::{InventoryService, LedgerSettings};
pub use reconciler::{Reconciler, ReconcilerHandle};
