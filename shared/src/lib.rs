//! Shared types and models for the Inventory Ledger
//!
//! This crate contains the domain model and the pure ledger rules shared
//! between the backend, the dashboard (via WASM), and tests.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
