//! Domain models for the Inventory Ledger

mod alert;
mod item;
mod movement;

pub use alert::*;
pub use item::*;
pub use movement::*;
