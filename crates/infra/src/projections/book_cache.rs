use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use bookstore_core::BookId;
use bookstore_events::{BookChanged, DomainEvent, EventEnvelope, Projection, StockUpdated};

use crate::error::ServiceError;
use crate::orders::StockSource;
use crate::read_model::ReadModelStore;

/// Queryable book view kept by services that do not own the ledger.
///
/// Best-effort and possibly stale: good for pre-flight checks, never for the
/// fulfillment decision itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedBookInfo {
    pub book_id: BookId,
    pub name: String,
    pub author: String,
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
    pub total_stock: i64,
    pub last_updated: DateTime<Utc>,
}

/// Book cache projection.
///
/// - `BookAdded`/`BookUpdated`: upsert catalog fields; `total_stock` is taken
///   from the event when present, otherwise kept (0 for a new entry)
/// - `BookDeleted`: remove the entry
/// - `StockUpdated`: `total_stock = max(0, total_stock + delta)`; dropped for
///   books not cached yet
/// - order events: ignored
///
/// Signed deltas are not idempotent under redelivery; the clamp keeps the
/// view valid anyway.
#[derive(Debug)]
pub struct BookCacheProjection<S>
where
    S: ReadModelStore<BookId, CachedBookInfo>,
{
    store: S,
}

impl<S> BookCacheProjection<S>
where
    S: ReadModelStore<BookId, CachedBookInfo>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get_book(&self, book_id: &BookId) -> Option<CachedBookInfo> {
        self.store.get(book_id)
    }

    /// All cached books, ascending by id.
    pub fn list_books(&self) -> Vec<CachedBookInfo> {
        let mut books = self.store.list();
        books.sort_by(|a, b| a.book_id.cmp(&b.book_id));
        books
    }

    /// `false` (not an error) for a book the cache has never seen.
    pub fn has_enough_stock(&self, book_id: &BookId, quantity: i64) -> bool {
        self.store
            .get(book_id)
            .is_some_and(|b| b.total_stock >= quantity)
    }

    /// Insert or overwrite an entry directly (bootstrapping from a snapshot).
    pub fn seed(&self, info: CachedBookInfo) {
        self.store.upsert(info.book_id.clone(), info);
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Apply a bare event (no envelope).
    pub fn apply_event(&self, event: &DomainEvent) {
        match event {
            DomainEvent::BookAdded(e) | DomainEvent::BookUpdated(e) => self.upsert_book(e),
            DomainEvent::BookDeleted(e) => {
                if self.store.remove(&e.book_id).is_some() {
                    debug!(book_id = %e.book_id, "book removed from cache");
                }
            }
            DomainEvent::StockUpdated(e) => self.apply_stock_delta(e),
            DomainEvent::OrderCreated(_)
            | DomainEvent::OrderFulfilled(_)
            | DomainEvent::OrderCancelled(_) => {}
        }
    }

    fn upsert_book(&self, e: &BookChanged) {
        let Some(details) = &e.book else {
            debug!(book_id = %e.book_id, "book event without details; ignored");
            return;
        };

        self.store.update(e.book_id.clone(), &mut |current| {
            let total_stock = details
                .total_stock
                .map(|t| t.max(0))
                .or_else(|| current.map(|c| c.total_stock))
                .unwrap_or(0);

            Some(CachedBookInfo {
                book_id: e.book_id.clone(),
                name: details.name.clone(),
                author: details.author.clone(),
                price: details.price,
                total_stock,
                last_updated: e.timestamp,
            })
        });
    }

    fn apply_stock_delta(&self, e: &StockUpdated) {
        let mut applied = false;
        self.store.update(e.book_id.clone(), &mut |current| {
            let mut info = current?.clone();
            info.total_stock = info.total_stock.saturating_add(e.quantity).max(0);
            info.last_updated = e.timestamp;
            applied = true;
            Some(info)
        });

        if !applied {
            debug!(book_id = %e.book_id, shelf_id = %e.shelf_id, "stock update for uncached book dropped");
        }
    }
}

impl<S> Projection for BookCacheProjection<S>
where
    S: ReadModelStore<BookId, CachedBookInfo>,
{
    type Ev = DomainEvent;

    fn apply(&self, envelope: &EventEnvelope<DomainEvent>) {
        self.apply_event(envelope.payload());
    }

    fn reset(&self) {
        self.clear();
    }
}

impl<S> StockSource for BookCacheProjection<S>
where
    S: ReadModelStore<BookId, CachedBookInfo>,
{
    fn available_stock(&self, book_id: &BookId) -> Result<i64, ServiceError> {
        Ok(self.store.get(book_id).map(|b| b.total_stock).unwrap_or(0))
    }
}
