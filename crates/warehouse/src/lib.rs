//! Warehouse domain module: the per-book, per-shelf stock ledger.
//!
//! This crate contains business rules for stock keeping and allocation,
//! implemented purely as deterministic domain logic (no IO, no locking, no
//! storage). The infrastructure layer loads an [`InventoryRecord`], runs these
//! rules on it and persists the result.

pub mod allocation;
pub mod record;

pub use allocation::{AllocationPlan, ShelfPick, plan_allocation};
pub use record::{InventoryRecord, ShelfEntry, StockChange, StockLocation};
