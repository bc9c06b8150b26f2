use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use bookstore_core::{AggregateRoot, ExpectedVersion, OrderId};
use bookstore_orders::Order;

use super::r#trait::{OrderRepository, OrderStoreError};

/// In-memory order store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
    available: AtomicBool,
    fail_next_save: AtomicBool,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            fail_next_save: AtomicBool::new(false),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `save` fail with `Unavailable`; loads keep working.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), OrderStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(OrderStoreError::Unavailable("store offline".to_string()))
        }
    }

    fn poisoned() -> OrderStoreError {
        OrderStoreError::Unavailable("lock poisoned".to_string())
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderRepository for InMemoryOrderStore {
    fn load(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        self.ensure_available()?;
        let orders = self.orders.read().map_err(|_| Self::poisoned())?;
        Ok(orders.get(&order_id).cloned())
    }

    fn list(&self) -> Result<Vec<Order>, OrderStoreError> {
        self.ensure_available()?;
        let orders = self.orders.read().map_err(|_| Self::poisoned())?;
        let mut all: Vec<_> = orders.values().cloned().collect();
        all.sort_by_key(|o| (o.created_at(), o.id_typed()));
        Ok(all)
    }

    fn save(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError> {
        self.ensure_available()?;
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(OrderStoreError::Unavailable("injected save failure".to_string()));
        }
        let mut orders = self.orders.write().map_err(|_| Self::poisoned())?;

        let current = orders.get(&order.id_typed()).map(|o| o.version());
        if !expected.matches(current) {
            return Err(OrderStoreError::Concurrency(format!(
                "order {}: expected {expected:?}, found {current:?}",
                order.id_typed()
            )));
        }

        orders.insert(order.id_typed(), order.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use bookstore_core::BookId;
    use bookstore_events::execute;
    use bookstore_orders::{FulfillOrder, OrderCommand, OrderItem, PlaceOrder};

    use super::*;

    fn placed() -> Order {
        let order_id = OrderId::new();
        let mut order = Order::empty(order_id);
        execute(
            &mut order,
            &OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                items: vec![OrderItem { book_id: BookId::from("b1"), quantity: 1 }],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        order
    }

    #[test]
    fn insert_requires_no_existing_order() {
        let store = InMemoryOrderStore::new();
        let order = placed();

        store.save(&order, ExpectedVersion::NoStream).unwrap();
        let err = store.save(&order, ExpectedVersion::NoStream).unwrap_err();
        assert!(matches!(err, OrderStoreError::Concurrency(_)));
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = InMemoryOrderStore::new();
        let mut order = placed();
        store.save(&order, ExpectedVersion::NoStream).unwrap();

        let order_id = order.id_typed();
        execute(
            &mut order,
            &OrderCommand::FulfillOrder(FulfillOrder { order_id, occurred_at: Utc::now() }),
        )
        .unwrap();

        store.save(&order, ExpectedVersion::Exact(1)).unwrap();
        assert!(store.save(&order, ExpectedVersion::Exact(1)).is_err());
        assert_eq!(store.load(order_id).unwrap().unwrap().version(), 2);
    }

    #[test]
    fn list_returns_every_order() {
        let store = InMemoryOrderStore::new();
        let a = placed();
        let b = placed();
        store.save(&a, ExpectedVersion::NoStream).unwrap();
        store.save(&b, ExpectedVersion::NoStream).unwrap();

        let ids: Vec<_> = store.list().unwrap().iter().map(|o| o.id_typed()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id_typed()) && ids.contains(&b.id_typed()));
    }

    #[test]
    fn offline_store_is_unavailable() {
        let store = InMemoryOrderStore::new();
        store.set_available(false);
        assert!(matches!(store.list(), Err(OrderStoreError::Unavailable(_))));
    }
}
