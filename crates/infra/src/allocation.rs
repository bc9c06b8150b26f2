//! Allocation engine: removes whole orders' worth of stock from the ledger.
//!
//! Pre-check-then-commit across every line of an order:
//!
//! 1. Lock all books the order touches (one atomic acquisition)
//! 2. Plan every line against working copies of the records; duplicate lines
//!    for the same book draw from the same copy, so their sum is checked
//! 3. Persist only when every plan succeeded
//! 4. If the store fails partway, restore the records already written
//! 5. Publish `StockUpdated` events only after every write committed

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use bookstore_core::{BookId, ensure_positive};
use bookstore_events::EventBus;
use bookstore_orders::OrderItem;
use bookstore_warehouse::{AllocationPlan, InventoryRecord, StockChange, plan_allocation};

use crate::error::ServiceError;
use crate::inventory_store::InventoryStore;
use crate::publisher::DomainEnvelope;
use crate::warehouse::Warehouse;

/// Removes (and on compensation, returns) stock for order fulfillment.
pub trait StockAllocator: Send + Sync {
    /// Remove every line's quantity, all-or-nothing across the whole order.
    fn allocate_order(&self, items: &[OrderItem]) -> Result<Vec<AllocationPlan>, ServiceError>;

    /// Put previously allocated stock back on the shelves it was taken from.
    fn release(&self, plans: &[AllocationPlan]) -> Result<(), ServiceError>;
}

impl<A> StockAllocator for Arc<A>
where
    A: StockAllocator + ?Sized,
{
    fn allocate_order(&self, items: &[OrderItem]) -> Result<Vec<AllocationPlan>, ServiceError> {
        (**self).allocate_order(items)
    }

    fn release(&self, plans: &[AllocationPlan]) -> Result<(), ServiceError> {
        (**self).release(plans)
    }
}

/// Record as loaded (`None` = absent) plus the working copy being planned against.
struct Working {
    original: Option<InventoryRecord>,
    updated: InventoryRecord,
}

pub struct AllocationEngine<S, B> {
    warehouse: Arc<Warehouse<S, B>>,
}

impl<S, B> AllocationEngine<S, B>
where
    S: InventoryStore,
    B: EventBus<DomainEnvelope>,
{
    pub fn new(warehouse: Arc<Warehouse<S, B>>) -> Self {
        Self { warehouse }
    }

    /// Remove `quantity` copies of one book, drawing shelves in ascending order.
    pub fn allocate(&self, book_id: &BookId, quantity: i64) -> Result<AllocationPlan, ServiceError> {
        let item = OrderItem {
            book_id: book_id.clone(),
            quantity,
        };
        let mut plans = self.allocate_order(std::slice::from_ref(&item))?;
        plans
            .pop()
            .ok_or_else(|| ServiceError::Concurrency("allocation produced no plan".to_string()))
    }

    fn load_working<'a>(
        &self,
        working: &'a mut BTreeMap<BookId, Working>,
        book_id: &BookId,
    ) -> Result<&'a mut Working, ServiceError> {
        Ok(match working.entry(book_id.clone()) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                let original = self.warehouse.store().load(book_id)?;
                let updated = original
                    .clone()
                    .unwrap_or_else(|| InventoryRecord::new(book_id.clone()));
                v.insert(Working { original, updated })
            }
        })
    }

    /// Write every updated record; on failure restore those already written.
    fn commit(&self, working: &BTreeMap<BookId, Working>) -> Result<(), ServiceError> {
        let store = self.warehouse.store();
        let mut written: Vec<(&BookId, &Working)> = Vec::with_capacity(working.len());

        for (book_id, w) in working {
            if let Err(err) = store.save(&w.updated) {
                warn!(book_id = %book_id, error = %err, "ledger write failed mid-allocation; restoring");
                self.restore(&written);
                return Err(err.into());
            }
            written.push((book_id, w));
        }
        Ok(())
    }

    fn restore(&self, written: &[(&BookId, &Working)]) {
        let store = self.warehouse.store();
        for (book_id, w) in written.iter().rev() {
            let previous = w
                .original
                .clone()
                .unwrap_or_else(|| InventoryRecord::new((*book_id).clone()));
            if let Err(err) = store.save(&previous) {
                error!(book_id = %book_id, error = %err, "failed to restore inventory record");
            }
        }
    }
}

impl<S, B> StockAllocator for AllocationEngine<S, B>
where
    S: InventoryStore,
    B: EventBus<DomainEnvelope>,
{
    fn allocate_order(&self, items: &[OrderItem]) -> Result<Vec<AllocationPlan>, ServiceError> {
        for item in items {
            ensure_positive(item.quantity)?;
        }
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let wh = &self.warehouse;
        let _guard = wh
            .locks()
            .acquire_all(items.iter().map(|i| i.book_id.clone()), wh.lock_timeout())?;

        let now = Utc::now();
        let mut working = BTreeMap::new();
        let mut plans = Vec::with_capacity(items.len());
        let mut changes: Vec<StockChange> = Vec::new();

        for item in items {
            let w = self.load_working(&mut working, &item.book_id)?;
            let plan = plan_allocation(&w.updated, item.quantity).inspect_err(|err| {
                debug!(book_id = %item.book_id, error = %err, "allocation pre-check failed");
            })?;
            changes.extend(w.updated.apply_plan(&plan, now)?);
            plans.push(plan);
        }

        self.commit(&working)?;
        wh.publisher()
            .publish_all(changes.iter().map(StockChange::to_event));

        info!(lines = items.len(), books = working.len(), "allocation committed");
        Ok(plans)
    }

    fn release(&self, plans: &[AllocationPlan]) -> Result<(), ServiceError> {
        if plans.is_empty() {
            return Ok(());
        }

        let wh = &self.warehouse;
        let _guard = wh
            .locks()
            .acquire_all(plans.iter().map(|p| p.book_id().clone()), wh.lock_timeout())?;

        let now = Utc::now();
        let mut working = BTreeMap::new();
        let mut changes = Vec::new();

        for plan in plans {
            let w = self.load_working(&mut working, plan.book_id())?;
            for pick in plan.picks() {
                changes.push(w.updated.add_stock(&pick.shelf_id, pick.quantity, now)?);
            }
        }

        self.commit(&working)?;
        wh.publisher()
            .publish_all(changes.iter().map(StockChange::to_event));

        info!(plans = plans.len(), "allocated stock released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bookstore_core::{DomainError, ShelfId};
    use bookstore_events::{DomainEvent, InMemoryEventBus, TopicPattern};
    use bookstore_warehouse::{ShelfPick, StockLocation};

    use super::*;
    use crate::inventory_store::InMemoryInventoryStore;

    type Engine = AllocationEngine<Arc<InMemoryInventoryStore>, Arc<InMemoryEventBus<DomainEnvelope>>>;
    type TestWarehouse = Warehouse<Arc<InMemoryInventoryStore>, Arc<InMemoryEventBus<DomainEnvelope>>>;

    fn setup() -> (Engine, Arc<TestWarehouse>, Arc<InMemoryInventoryStore>, Arc<InMemoryEventBus<DomainEnvelope>>) {
        let store = Arc::new(InMemoryInventoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let wh = Arc::new(Warehouse::new(store.clone(), bus.clone()));
        (AllocationEngine::new(wh.clone()), wh, store, bus)
    }

    fn b(id: &str) -> BookId {
        BookId::from(id)
    }

    fn s(id: &str) -> ShelfId {
        ShelfId::from(id)
    }

    fn item(book: &str, quantity: i64) -> OrderItem {
        OrderItem { book_id: b(book), quantity }
    }

    #[test]
    fn allocates_across_shelves_in_order() {
        let (engine, wh, _, _) = setup();
        wh.add_stock(&b("b1"), &s("s1"), 3).unwrap();
        wh.add_stock(&b("b1"), &s("s2"), 2).unwrap();

        let plan = engine.allocate(&b("b1"), 4).unwrap();
        assert_eq!(
            plan.picks(),
            &[
                ShelfPick { shelf_id: s("s1"), quantity: 3 },
                ShelfPick { shelf_id: s("s2"), quantity: 1 },
            ]
        );
        assert_eq!(
            wh.get_locations(&b("b1")).unwrap(),
            vec![StockLocation { shelf_id: s("s2"), quantity: 1 }]
        );
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let (engine, _, _, _) = setup();
        let err = engine.allocate(&b("b1"), 0).unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidQuantity(_))));
    }

    #[test]
    fn one_short_line_leaves_every_book_untouched() {
        let (engine, wh, _, bus) = setup();
        wh.add_stock(&b("b1"), &s("s1"), 5).unwrap();
        wh.add_stock(&b("b2"), &s("s1"), 1).unwrap();
        let sub = bus.subscribe(&TopicPattern::parse("stock.updated").unwrap()).unwrap();

        let err = engine.allocate_order(&[item("b1", 2), item("b2", 2)]).unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InsufficientStock { .. })));

        assert_eq!(wh.total_stock(&b("b1")).unwrap(), 5);
        assert_eq!(wh.total_stock(&b("b2")).unwrap(), 1);
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn duplicate_lines_are_checked_against_their_sum() {
        let (engine, wh, _, _) = setup();
        wh.add_stock(&b("b1"), &s("s1"), 3).unwrap();

        assert!(engine.allocate_order(&[item("b1", 2), item("b1", 2)]).is_err());
        assert_eq!(wh.total_stock(&b("b1")).unwrap(), 3);

        engine.allocate_order(&[item("b1", 2), item("b1", 1)]).unwrap();
        assert_eq!(wh.total_stock(&b("b1")).unwrap(), 0);
    }

    #[test]
    fn store_failure_mid_commit_restores_written_records() {
        let (engine, wh, store, bus) = setup();
        wh.add_stock(&b("b1"), &s("s1"), 5).unwrap();
        wh.add_stock(&b("b2"), &s("s1"), 5).unwrap();
        let sub = bus.subscribe(&TopicPattern::parse("stock.updated").unwrap()).unwrap();

        store.fail_save_after(1);
        let err = engine.allocate_order(&[item("b1", 2), item("b2", 2)]).unwrap_err();
        assert!(matches!(err, ServiceError::InventoryUnavailable(_)));

        assert_eq!(wh.total_stock(&b("b1")).unwrap(), 5);
        assert_eq!(wh.total_stock(&b("b2")).unwrap(), 5);
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn release_returns_stock_to_original_shelves() {
        let (engine, wh, _, bus) = setup();
        wh.add_stock(&b("b1"), &s("s1"), 3).unwrap();
        wh.add_stock(&b("b1"), &s("s2"), 2).unwrap();

        let plans = engine.allocate_order(&[item("b1", 4)]).unwrap();
        let sub = bus.subscribe(&TopicPattern::parse("stock.updated").unwrap()).unwrap();
        engine.release(&plans).unwrap();

        assert_eq!(
            wh.get_locations(&b("b1")).unwrap(),
            vec![
                StockLocation { shelf_id: s("s1"), quantity: 3 },
                StockLocation { shelf_id: s("s2"), quantity: 2 },
            ]
        );
        match sub.try_recv().unwrap().into_payload() {
            DomainEvent::StockUpdated(e) => assert!(e.quantity > 0),
            other => panic!("Expected StockUpdated, got {other:?}"),
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                .. ProptestConfig::default()
            })]

            #[test]
            fn fulfillment_removes_exactly_the_request_or_nothing(
                stock in prop::collection::vec((0u8..3, 0u8..4, 1i64..10), 0..10),
                order in prop::collection::vec((0u8..3, 1i64..15), 1..4),
            ) {
                let (engine, wh, _, _) = setup();
                for (book, shelf, qty) in stock {
                    wh.add_stock(&BookId::new(format!("b{book}")), &ShelfId::new(format!("s{shelf}")), qty).unwrap();
                }
                let before: i64 = wh.inventory_overview().unwrap().iter().map(|r| r.total_stock).sum();
                let items: Vec<_> = order
                    .iter()
                    .map(|(book, qty)| OrderItem { book_id: BookId::new(format!("b{book}")), quantity: *qty })
                    .collect();
                let requested: i64 = items.iter().map(|i| i.quantity).sum();

                let result = engine.allocate_order(&items);
                let after: i64 = wh.inventory_overview().unwrap().iter().map(|r| r.total_stock).sum();

                match result {
                    Ok(_) => prop_assert_eq!(before - after, requested),
                    Err(_) => prop_assert_eq!(before, after),
                }
                for row in wh.inventory_overview().unwrap() {
                    prop_assert!(row.locations.iter().all(|l| l.quantity > 0));
                }
            }
        }
    }
}
