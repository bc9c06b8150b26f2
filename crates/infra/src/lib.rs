//! Infrastructure layer: stores, locks, services, bus transports, projections, config.
//!
//! ```text
//!   Warehouse (ledger) ──stock.updated──▶ ┐
//!   OrderService ──order.*──────────────▶ ├─ EventBus ─▶ SubscriptionWorker ─▶ BookCacheProjection
//!   catalog ──book.*────────────────────▶ ┘
//! ```
//!
//! The ledger is the only authority on stock; the cache is advisory.

pub mod allocation;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod inventory_store;
pub mod locks;
pub mod order_store;
pub mod orders;
pub mod projections;
pub mod publisher;
pub mod read_model;
pub mod warehouse;
pub mod workers;


pub use allocation::{AllocationEngine, StockAllocator};
pub use config::{BookstoreConfig, ConfigError, StockSourceKind};
#[cfg(feature = "redis")]
pub use config::RedisTransport;
pub use error::ServiceError;
pub use inventory_store::{InMemoryInventoryStore, InventoryStore, InventoryStoreError};
pub use locks::{KeyedLocks, LockError};
pub use order_store::{InMemoryOrderStore, OrderRepository, OrderStoreError};
pub use orders::{OrderService, StockSource};
pub use projections::{BookCacheProjection, CachedBookInfo};
pub use publisher::{DomainEnvelope, EventPublisher};
pub use read_model::{InMemoryReadModelStore, ReadModelStore};
pub use warehouse::{BookInventory, Warehouse};
pub use workers::{SubscriptionWorker, WorkerError, WorkerHandle};
