//! Order service: order lifecycle orchestration.
//!
//! ```text
//! create:  validate (aggregate) → availability check (StockSource, advisory)
//!          → save(NoStream) → publish OrderCreated
//! fulfill: lock order → load → decide (aggregate; InvalidState if not pending)
//!          → allocate all lines (ledger, all-or-nothing) → save(Exact(v))
//!          → publish OrderFulfilled
//! cancel:  lock order → load → decide → save(Exact(v)) → publish OrderCancelled
//! ```
//!
//! The creation-time check is advisory: nothing is reserved, and fulfillment
//! re-validates against the ledger. A second concurrent fulfillment waits on
//! the order lock, reloads, and fails with `InvalidState` without touching the
//! ledger.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use bookstore_core::{Aggregate, AggregateRoot, BookId, DomainError, ExpectedVersion, OrderId};
use bookstore_events::{EventBus, execute};
use bookstore_orders::{
    CancelOrder, FulfillOrder, Order, OrderCommand, OrderEvent, OrderItem, PlaceOrder,
};

use crate::allocation::StockAllocator;
use crate::error::ServiceError;
use crate::locks::{KeyedGuard, KeyedLocks, LockError};
use crate::order_store::OrderRepository;
use crate::publisher::{DomainEnvelope, EventPublisher};

/// Default bound on waiting for an order that is being fulfilled or cancelled.
pub const DEFAULT_ORDER_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Where order creation reads availability from: the ledger itself or a local
/// projected cache.
pub trait StockSource: Send + Sync {
    /// Best known total stock for a book; 0 when the book is unknown.
    fn available_stock(&self, book_id: &BookId) -> Result<i64, ServiceError>;

    fn has_enough_stock(&self, book_id: &BookId, quantity: i64) -> Result<bool, ServiceError> {
        Ok(self.available_stock(book_id)? >= quantity)
    }
}

impl<T> StockSource for Arc<T>
where
    T: StockSource + ?Sized,
{
    fn available_stock(&self, book_id: &BookId) -> Result<i64, ServiceError> {
        (**self).available_stock(book_id)
    }

    fn has_enough_stock(&self, book_id: &BookId, quantity: i64) -> Result<bool, ServiceError> {
        (**self).has_enough_stock(book_id, quantity)
    }
}

pub struct OrderService<R, A, C, B> {
    orders: R,
    allocator: A,
    stock: C,
    publisher: EventPublisher<B>,
    locks: KeyedLocks<OrderId>,
    lock_timeout: Duration,
}

impl<R, A, C, B> OrderService<R, A, C, B>
where
    R: OrderRepository,
    A: StockAllocator,
    C: StockSource,
    B: EventBus<DomainEnvelope>,
{
    pub fn new(orders: R, allocator: A, stock: C, bus: B) -> Self {
        Self {
            orders,
            allocator,
            stock,
            publisher: EventPublisher::new(bus),
            locks: KeyedLocks::new(),
            lock_timeout: DEFAULT_ORDER_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Submit a new order. Nothing is persisted unless every line is available.
    pub fn create_order(&self, items: Vec<OrderItem>) -> Result<Order, ServiceError> {
        let order_id = OrderId::new();
        let mut order = Order::empty(order_id);
        let command = OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            items: items.clone(),
            occurred_at: Utc::now(),
        });

        let events = order.handle(&command)?;
        self.check_availability(&items)?;
        for event in &events {
            order.apply(event);
        }

        self.orders.save(&order, ExpectedVersion::NoStream)?;
        self.publish(&events);

        info!(order_id = %order_id, lines = order.items().len(), "order created");
        Ok(order)
    }

    /// Allocate stock for a pending order and mark it fulfilled.
    pub fn fulfill_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        let _guard = self.lock(order_id)?;
        let mut order = self.load(order_id)?;
        let expected = ExpectedVersion::Exact(order.version());

        let command = OrderCommand::FulfillOrder(FulfillOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        let events = order.handle(&command)?;

        let plans = self.allocator.allocate_order(order.items()).inspect_err(|err| {
            warn!(order_id = %order_id, error = %err, "fulfillment allocation failed");
        })?;

        for event in &events {
            order.apply(event);
        }

        if let Err(err) = self.orders.save(&order, expected) {
            error!(order_id = %order_id, error = %err, "order save failed after allocation; releasing stock");
            if let Err(release_err) = self.allocator.release(&plans) {
                error!(order_id = %order_id, error = %release_err, "failed to release allocated stock");
            }
            return Err(err.into());
        }
        self.publish(&events);

        info!(order_id = %order_id, "order fulfilled");
        Ok(order)
    }

    /// Cancel a pending order. No stock is touched (nothing was reserved).
    pub fn cancel_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        let _guard = self.lock(order_id)?;
        let mut order = self.load(order_id)?;
        let expected = ExpectedVersion::Exact(order.version());

        let events = execute(
            &mut order,
            &OrderCommand::CancelOrder(CancelOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
        )?;

        self.orders.save(&order, expected)?;
        self.publish(&events);

        info!(order_id = %order_id, "order cancelled");
        Ok(order)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        self.load(order_id)
    }

    pub fn get_all_orders(&self) -> Result<Vec<Order>, ServiceError> {
        Ok(self.orders.list()?)
    }

    /// Every line must be satisfiable; lines for the same book are summed.
    fn check_availability(&self, items: &[OrderItem]) -> Result<(), ServiceError> {
        let mut wanted: Vec<(&BookId, i64)> = Vec::new();
        for item in items {
            match wanted.iter_mut().find(|(b, _)| *b == &item.book_id) {
                Some((_, q)) => *q = q.saturating_add(item.quantity),
                None => wanted.push((&item.book_id, item.quantity)),
            }
        }

        for (book_id, quantity) in wanted {
            let available = self.stock.available_stock(book_id)?;
            if available < quantity {
                info!(book_id = %book_id, quantity, available, "order rejected: insufficient stock");
                return Err(DomainError::insufficient_stock(book_id.as_str(), quantity, available).into());
            }
        }
        Ok(())
    }

    fn load(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        self.orders
            .load(order_id)?
            .ok_or_else(|| DomainError::order_not_found(order_id.to_string()).into())
    }

    fn lock(&self, order_id: OrderId) -> Result<KeyedGuard<'_, OrderId>, ServiceError> {
        self.locks
            .acquire(order_id, self.lock_timeout)
            .map_err(|err: LockError| ServiceError::Concurrency(format!("order {order_id} busy: {err}")))
    }

    fn publish(&self, events: &[OrderEvent]) {
        self.publisher
            .publish_all(events.iter().map(OrderEvent::to_domain_event));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use bookstore_core::ShelfId;
    use bookstore_events::{DomainEvent, InMemoryEventBus, TopicPattern};
    use bookstore_orders::OrderStatus;

    use super::*;
    use crate::allocation::AllocationEngine;
    use crate::inventory_store::InMemoryInventoryStore;
    use crate::order_store::InMemoryOrderStore;
    use crate::warehouse::Warehouse;

    type Bus = Arc<InMemoryEventBus<DomainEnvelope>>;
    type TestWarehouse = Warehouse<Arc<InMemoryInventoryStore>, Bus>;
    type TestService = OrderService<
        Arc<InMemoryOrderStore>,
        AllocationEngine<Arc<InMemoryInventoryStore>, Bus>,
        Arc<TestWarehouse>,
        Bus,
    >;

    struct Fixture {
        service: Arc<TestService>,
        warehouse: Arc<TestWarehouse>,
        orders: Arc<InMemoryOrderStore>,
        bus: Bus,
    }

    fn setup() -> Fixture {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let warehouse = Arc::new(Warehouse::new(Arc::new(InMemoryInventoryStore::new()), bus.clone()));
        let orders = Arc::new(InMemoryOrderStore::new());
        let service = OrderService::new(
            orders.clone(),
            AllocationEngine::new(warehouse.clone()),
            warehouse.clone(),
            bus.clone(),
        );
        Fixture {
            service: Arc::new(service),
            warehouse,
            orders,
            bus,
        }
    }

    fn item(book: &str, quantity: i64) -> OrderItem {
        OrderItem {
            book_id: BookId::from(book),
            quantity,
        }
    }

    fn stock(f: &Fixture, book: &str, shelf: &str, qty: i64) {
        f.warehouse
            .add_stock(&BookId::from(book), &ShelfId::from(shelf), qty)
            .unwrap();
    }

    #[test]
    fn create_without_stock_persists_nothing() {
        let f = setup();

        let err = f.service.create_order(vec![item("b1", 2)]).unwrap_err();
        assert_eq!(
            err,
            ServiceError::Domain(DomainError::insufficient_stock("b1", 2, 0))
        );
        assert!(f.service.get_all_orders().unwrap().is_empty());
    }

    #[test]
    fn create_rejects_whole_order_if_any_line_is_short() {
        let f = setup();
        stock(&f, "b1", "s1", 5);

        assert!(f.service.create_order(vec![item("b1", 1), item("b2", 1)]).is_err());
        assert!(f.orders.list().unwrap().is_empty());
    }

    #[test]
    fn create_validates_quantities_before_stock() {
        let f = setup();
        let err = f.service.create_order(vec![item("b1", 0)]).unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidQuantity(_))));
    }

    #[test]
    fn create_publishes_order_created() {
        let f = setup();
        stock(&f, "b1", "s1", 5);
        let sub = f.bus.subscribe(&TopicPattern::parse("order.*").unwrap()).unwrap();

        let order = f.service.create_order(vec![item("b1", 2)]).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);

        match sub.try_recv().unwrap().into_payload() {
            DomainEvent::OrderCreated(e) => assert_eq!(e.order_id, order.id_typed()),
            other => panic!("Expected OrderCreated, got {other:?}"),
        }
    }

    #[test]
    fn fulfill_allocates_and_marks_fulfilled() {
        let f = setup();
        stock(&f, "b1", "s1", 3);
        stock(&f, "b1", "s2", 2);

        let order = f.service.create_order(vec![item("b1", 4)]).unwrap();
        let fulfilled = f.service.fulfill_order(order.id_typed()).unwrap();

        assert_eq!(fulfilled.status(), OrderStatus::Fulfilled);
        assert!(fulfilled.fulfilled_at().is_some());
        assert_eq!(f.warehouse.total_stock(&BookId::from("b1")).unwrap(), 1);
        assert_eq!(
            f.service.get_order(order.id_typed()).unwrap().status(),
            OrderStatus::Fulfilled
        );
    }

    #[test]
    fn second_fulfill_is_invalid_state_and_ledger_untouched() {
        let f = setup();
        stock(&f, "b1", "s1", 10);

        let order = f.service.create_order(vec![item("b1", 4)]).unwrap();
        f.service.fulfill_order(order.id_typed()).unwrap();

        let err = f.service.fulfill_order(order.id_typed()).unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidState(_))));
        assert_eq!(f.warehouse.total_stock(&BookId::from("b1")).unwrap(), 6);
    }

    #[test]
    fn concurrent_fulfills_allocate_once() {
        let f = setup();
        stock(&f, "b1", "s1", 10);
        let order = f.service.create_order(vec![item("b1", 4)]).unwrap();

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (service, barrier) = (f.service.clone(), barrier.clone());
                let id = order.id_typed();
                thread::spawn(move || {
                    barrier.wait();
                    service.fulfill_order(id)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
            r,
            Err(ServiceError::Domain(DomainError::InvalidState(_)))
        )));
        assert_eq!(f.warehouse.total_stock(&BookId::from("b1")).unwrap(), 6);
    }

    #[test]
    fn creation_check_is_advisory_not_a_reservation() {
        let f = setup();
        stock(&f, "b1", "s1", 2);

        let order = f.service.create_order(vec![item("b1", 2)]).unwrap();
        f.warehouse
            .remove_stock(&BookId::from("b1"), &ShelfId::from("s1"), 2)
            .unwrap();

        let err = f.service.fulfill_order(order.id_typed()).unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InsufficientStock { .. })));
        assert_eq!(
            f.service.get_order(order.id_typed()).unwrap().status(),
            OrderStatus::Pending
        );
    }

    #[test]
    fn order_store_failure_after_allocation_releases_stock() {
        let f = setup();
        stock(&f, "b1", "s1", 5);
        let order = f.service.create_order(vec![item("b1", 3)]).unwrap();

        f.orders.fail_next_save();
        let err = f.service.fulfill_order(order.id_typed()).unwrap_err();
        assert!(matches!(err, ServiceError::OrderStoreUnavailable(_)));
        assert_eq!(f.warehouse.total_stock(&BookId::from("b1")).unwrap(), 5);
        assert_eq!(
            f.service.get_order(order.id_typed()).unwrap().status(),
            OrderStatus::Pending
        );
    }

    #[test]
    fn cancel_is_terminal() {
        let f = setup();
        stock(&f, "b1", "s1", 5);
        let order = f.service.create_order(vec![item("b1", 1)]).unwrap();

        let cancelled = f.service.cancel_order(order.id_typed()).unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);

        let err = f.service.fulfill_order(order.id_typed()).unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidState(_))));
        assert_eq!(f.warehouse.total_stock(&BookId::from("b1")).unwrap(), 5);
    }

    #[test]
    fn unknown_order_is_not_found() {
        let f = setup();
        let err = f.service.fulfill_order(OrderId::new()).unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::OrderNotFound(_))));
        assert!(f.service.get_order(OrderId::new()).is_err());
    }

    #[test]
    fn publish_failure_does_not_fail_the_order() {
        let f = setup();
        stock(&f, "b1", "s1", 5);
        f.bus.disconnect();

        let order = f.service.create_order(vec![item("b1", 1)]).unwrap();
        f.service.fulfill_order(order.id_typed()).unwrap();
        assert_eq!(f.warehouse.total_stock(&BookId::from("b1")).unwrap(), 4);
    }
}
