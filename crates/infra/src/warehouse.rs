//! Inventory ledger service: the authoritative book → {shelf → quantity} mapping.
//!
//! ```text
//! add/remove stock
//!   ↓
//! 1. Lock the book (bounded wait)
//!   ↓
//! 2. Load record → apply change on InventoryRecord (invariants enforced there)
//!   ↓
//! 3. Save whole record (empty record = delete)
//!   ↓
//! 4. Publish StockUpdated (best-effort, still under the book lock)
//! ```
//!
//! Mutations of one book are linearized by its lock; different books never
//! wait on each other. Reads go straight to the store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use bookstore_core::{BookId, DomainResult, ShelfId, ensure_positive};
use bookstore_events::EventBus;
use bookstore_warehouse::{InventoryRecord, ShelfEntry, StockChange, StockLocation};

use crate::error::ServiceError;
use crate::inventory_store::InventoryStore;
use crate::locks::KeyedLocks;
use crate::orders::StockSource;
use crate::publisher::{DomainEnvelope, EventPublisher};

/// Default bound on waiting for a contended book.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// One row of the inventory overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInventory {
    pub book_id: BookId,
    pub locations: Vec<StockLocation>,
    pub total_stock: i64,
}

impl From<&InventoryRecord> for BookInventory {
    fn from(record: &InventoryRecord) -> Self {
        Self {
            book_id: record.book_id().clone(),
            locations: record.locations(),
            total_stock: record.total(),
        }
    }
}

pub struct Warehouse<S, B> {
    store: S,
    publisher: EventPublisher<B>,
    locks: KeyedLocks<BookId>,
    lock_timeout: Duration,
}

impl<S, B> Warehouse<S, B>
where
    S: InventoryStore,
    B: EventBus<DomainEnvelope>,
{
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            publisher: EventPublisher::new(bus),
            locks: KeyedLocks::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Put `quantity` copies of a book on a shelf. Returns the shelf's new quantity.
    pub fn add_stock(
        &self,
        book_id: &BookId,
        shelf_id: &ShelfId,
        quantity: i64,
    ) -> Result<StockLocation, ServiceError> {
        ensure_positive(quantity)?;

        let record = self.mutate(book_id, |record, now| {
            record.add_stock(shelf_id, quantity, now).map(|c| vec![c])
        })?;

        info!(book_id = %book_id, shelf_id = %shelf_id, quantity, "stock added");
        Ok(StockLocation {
            shelf_id: shelf_id.clone(),
            quantity: record.quantity_at(shelf_id),
        })
    }

    /// Take `quantity` copies of a book off a shelf. Returns the shelf's remaining
    /// quantity (0 once the location is gone).
    pub fn remove_stock(
        &self,
        book_id: &BookId,
        shelf_id: &ShelfId,
        quantity: i64,
    ) -> Result<StockLocation, ServiceError> {
        ensure_positive(quantity)?;

        let record = self.mutate(book_id, |record, now| {
            record.remove_stock(shelf_id, quantity, now).map(|c| vec![c])
        })?;

        info!(book_id = %book_id, shelf_id = %shelf_id, quantity, "stock removed");
        Ok(StockLocation {
            shelf_id: shelf_id.clone(),
            quantity: record.quantity_at(shelf_id),
        })
    }

    /// Current locations of a book, ascending by shelf. Empty when out of stock.
    pub fn get_locations(&self, book_id: &BookId) -> Result<Vec<StockLocation>, ServiceError> {
        Ok(self
            .store
            .load(book_id)?
            .map(|r| r.locations())
            .unwrap_or_default())
    }

    /// Reverse index: every book on a shelf, ascending by book id.
    pub fn get_shelf_contents(&self, shelf_id: &ShelfId) -> Result<Vec<ShelfEntry>, ServiceError> {
        Ok(self
            .store
            .scan()?
            .iter()
            .filter_map(|record| {
                let quantity = record.quantity_at(shelf_id);
                (quantity > 0).then(|| ShelfEntry {
                    book_id: record.book_id().clone(),
                    quantity,
                })
            })
            .collect())
    }

    /// Sum over all shelves; 0 for an unknown book.
    pub fn total_stock(&self, book_id: &BookId) -> Result<i64, ServiceError> {
        Ok(self.store.load(book_id)?.map(|r| r.total()).unwrap_or(0))
    }

    /// Every stocked book with its locations and total.
    pub fn inventory_overview(&self) -> Result<Vec<BookInventory>, ServiceError> {
        Ok(self.store.scan()?.iter().map(BookInventory::from).collect())
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn publisher(&self) -> &EventPublisher<B> {
        &self.publisher
    }

    pub(crate) fn locks(&self) -> &KeyedLocks<BookId> {
        &self.locks
    }

    pub(crate) fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn mutate<F>(&self, book_id: &BookId, change: F) -> Result<InventoryRecord, ServiceError>
    where
        F: FnOnce(&mut InventoryRecord, DateTime<Utc>) -> DomainResult<Vec<StockChange>>,
    {
        let _guard = self.locks.acquire(book_id.clone(), self.lock_timeout)?;

        let mut record = self
            .store
            .load(book_id)?
            .unwrap_or_else(|| InventoryRecord::new(book_id.clone()));
        let changes = change(&mut record, Utc::now())?;

        self.store.save(&record)?;
        self.publisher
            .publish_all(changes.iter().map(StockChange::to_event));

        Ok(record)
    }
}

/// Ledger-backed availability check (strongly consistent, slower than the cache).
impl<S, B> StockSource for Warehouse<S, B>
where
    S: InventoryStore,
    B: EventBus<DomainEnvelope>,
{
    fn available_stock(&self, book_id: &BookId) -> Result<i64, ServiceError> {
        self.total_stock(book_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use bookstore_core::DomainError;
    use bookstore_events::{DomainEvent, InMemoryEventBus, TopicPattern};

    use super::*;
    use crate::inventory_store::InMemoryInventoryStore;

    type TestWarehouse = Warehouse<Arc<InMemoryInventoryStore>, Arc<InMemoryEventBus<DomainEnvelope>>>;

    fn setup() -> (TestWarehouse, Arc<InMemoryInventoryStore>, Arc<InMemoryEventBus<DomainEnvelope>>) {
        let store = Arc::new(InMemoryInventoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        (Warehouse::new(store.clone(), bus.clone()), store, bus)
    }

    fn b(id: &str) -> BookId {
        BookId::from(id)
    }

    fn s(id: &str) -> ShelfId {
        ShelfId::from(id)
    }

    #[test]
    fn add_to_two_shelves_then_list_locations() {
        let (wh, _, _) = setup();
        wh.add_stock(&b("b1"), &s("s1"), 5).unwrap();
        wh.add_stock(&b("b1"), &s("s2"), 3).unwrap();

        assert_eq!(
            wh.get_locations(&b("b1")).unwrap(),
            vec![
                StockLocation { shelf_id: s("s1"), quantity: 5 },
                StockLocation { shelf_id: s("s2"), quantity: 3 },
            ]
        );
        assert_eq!(wh.total_stock(&b("b1")).unwrap(), 8);
    }

    #[test]
    fn over_removal_fails_and_keeps_quantity() {
        let (wh, _, _) = setup();
        wh.add_stock(&b("b1"), &s("s1"), 5).unwrap();

        let err = wh.remove_stock(&b("b1"), &s("s1"), 6).unwrap_err();
        assert_eq!(err, ServiceError::Domain(DomainError::insufficient_stock("b1", 6, 5)));
        assert_eq!(wh.get_locations(&b("b1")).unwrap()[0].quantity, 5);
    }

    #[test]
    fn removing_everything_deletes_the_record() {
        let (wh, store, _) = setup();
        wh.add_stock(&b("b1"), &s("s1"), 2).unwrap();

        let left = wh.remove_stock(&b("b1"), &s("s1"), 2).unwrap();
        assert_eq!(left.quantity, 0);
        assert!(wh.get_locations(&b("b1")).unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn remove_from_unknown_book_is_location_not_found() {
        let (wh, _, _) = setup();
        let err = wh.remove_stock(&b("nope"), &s("s1"), 1).unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::LocationNotFound { .. })));
    }

    #[test]
    fn shelf_contents_is_a_reverse_index() {
        let (wh, _, _) = setup();
        wh.add_stock(&b("b2"), &s("s1"), 1).unwrap();
        wh.add_stock(&b("b1"), &s("s1"), 4).unwrap();
        wh.add_stock(&b("b1"), &s("s2"), 9).unwrap();

        assert_eq!(
            wh.get_shelf_contents(&s("s1")).unwrap(),
            vec![
                ShelfEntry { book_id: b("b1"), quantity: 4 },
                ShelfEntry { book_id: b("b2"), quantity: 1 },
            ]
        );
        assert!(wh.get_shelf_contents(&s("s9")).unwrap().is_empty());
    }

    #[test]
    fn overview_lists_every_book() {
        let (wh, _, _) = setup();
        wh.add_stock(&b("b1"), &s("s1"), 4).unwrap();
        wh.add_stock(&b("b2"), &s("s2"), 1).unwrap();

        let overview = wh.inventory_overview().unwrap();
        assert_eq!(overview.len(), 2);
        assert_eq!(overview[0].total_stock, 4);
    }

    #[test]
    fn writes_publish_signed_deltas() {
        let (wh, _, bus) = setup();
        let sub = bus.subscribe(&TopicPattern::parse("stock.updated").unwrap()).unwrap();

        wh.add_stock(&b("b1"), &s("s1"), 5).unwrap();
        wh.remove_stock(&b("b1"), &s("s1"), 2).unwrap();

        let deltas: Vec<i64> = (0..2)
            .map(|_| match sub.try_recv().unwrap().into_payload() {
                DomainEvent::StockUpdated(e) => e.quantity,
                other => panic!("Expected StockUpdated, got {other:?}"),
            })
            .collect();
        assert_eq!(deltas, vec![5, -2]);
    }

    #[test]
    fn failed_write_publishes_nothing() {
        let (wh, _, bus) = setup();
        let sub = bus.subscribe(&TopicPattern::parse("#").unwrap()).unwrap();

        assert!(wh.remove_stock(&b("b1"), &s("s1"), 1).is_err());
        assert!(wh.add_stock(&b("b1"), &s("s1"), 0).is_err());
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn disconnected_bus_does_not_fail_the_write() {
        let (wh, _, bus) = setup();
        bus.disconnect();

        wh.add_stock(&b("b1"), &s("s1"), 5).unwrap();
        assert_eq!(wh.total_stock(&b("b1")).unwrap(), 5);
    }

    #[test]
    fn store_outage_is_inventory_unavailable() {
        let (wh, store, _) = setup();
        store.set_available(false);

        let err = wh.add_stock(&b("b1"), &s("s1"), 5).unwrap_err();
        assert!(matches!(err, ServiceError::InventoryUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn concurrent_writers_on_one_book_are_linearized() {
        let (wh, _, _) = setup();
        let wh = Arc::new(wh);
        wh.add_stock(&b("b1"), &s("s1"), 100).unwrap();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let wh = wh.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        if i % 2 == 0 {
                            wh.add_stock(&b("b1"), &s("s1"), 1).unwrap();
                        } else {
                            wh.remove_stock(&b("b1"), &s("s1"), 1).unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(wh.total_stock(&b("b1")).unwrap(), 100);
    }
}
