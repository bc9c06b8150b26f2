//! Durable key-value boundary for the inventory ledger.
//!
//! One value per book: the whole set of `{shelf, quantity}` locations, read and
//! written as a unit. No storage technology is assumed.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{DEFAULT_STORE_TIMEOUT, InMemoryInventoryStore};
pub use r#trait::{InventoryStore, InventoryStoreError};
