use std::sync::Arc;

use thiserror::Error;

use bookstore_core::{ExpectedVersion, OrderId};
use bookstore_orders::Order;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("order store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed store of order snapshots.
///
/// Orders are never deleted. `save` is a compare-and-swap on the aggregate
/// version: `ExpectedVersion::NoStream` inserts, `Exact(v)` replaces the order
/// only if the stored copy is still at version `v`.
pub trait OrderRepository: Send + Sync {
    fn load(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError>;

    /// All orders, oldest first.
    fn list(&self) -> Result<Vec<Order>, OrderStoreError>;

    fn save(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError>;
}

impl<S> OrderRepository for Arc<S>
where
    S: OrderRepository + ?Sized,
{
    fn load(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        (**self).load(order_id)
    }

    fn list(&self) -> Result<Vec<Order>, OrderStoreError> {
        (**self).list()
    }

    fn save(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError> {
        (**self).save(order, expected)
    }
}
