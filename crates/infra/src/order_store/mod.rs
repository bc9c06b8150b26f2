//! Order persistence boundary.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryOrderStore;
pub use r#trait::{OrderRepository, OrderStoreError};
