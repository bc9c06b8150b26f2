use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstore_core::{BookId, DomainError, DomainResult, ShelfId, ValueObject, ensure_positive};
use bookstore_events::{DomainEvent, StockUpdated};

/// Quantity of one book held on one shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLocation {
    pub shelf_id: ShelfId,
    pub quantity: i64,
}

impl ValueObject for StockLocation {}

/// One row of a shelf's contents (reverse index entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfEntry {
    pub book_id: BookId,
    pub quantity: i64,
}

impl ValueObject for ShelfEntry {}

/// A committed change to one shelf, published as `StockUpdated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub book_id: BookId,
    pub shelf_id: ShelfId,
    /// Positive when stock was added, negative when removed.
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

impl StockChange {
    pub fn to_event(&self) -> DomainEvent {
        DomainEvent::StockUpdated(StockUpdated {
            book_id: self.book_id.clone(),
            shelf_id: self.shelf_id.clone(),
            quantity: self.delta,
            timestamp: self.occurred_at,
        })
    }
}

/// Stock of one book across every shelf that holds it.
///
/// Invariants:
/// - at most one location per shelf (map keyed by `ShelfId`)
/// - every stored quantity is strictly positive; a shelf drained to zero is removed
///
/// - the total across shelves fits in an `i64`
///
/// An empty record means "no stock anywhere"; stores delete it instead of
/// persisting it. Deserializing goes through [`InventoryRecord::from_locations`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredRecord")]
pub struct InventoryRecord {
    book_id: BookId,
    locations: BTreeMap<ShelfId, i64>,
}

/// Serialized shape of an [`InventoryRecord`], validated on the way in.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    book_id: BookId,
    locations: BTreeMap<ShelfId, i64>,
}

impl TryFrom<StoredRecord> for InventoryRecord {
    type Error = DomainError;

    fn try_from(stored: StoredRecord) -> Result<Self, Self::Error> {
        InventoryRecord::from_locations(
            stored.book_id,
            stored
                .locations
                .into_iter()
                .map(|(shelf_id, quantity)| StockLocation { shelf_id, quantity }),
        )
    }
}

impl InventoryRecord {
    /// Create an empty record (no stock yet).
    pub fn new(book_id: BookId) -> Self {
        Self {
            book_id,
            locations: BTreeMap::new(),
        }
    }

    /// Rebuild a record from stored locations, re-checking the invariants.
    pub fn from_locations(
        book_id: BookId,
        locations: impl IntoIterator<Item = StockLocation>,
    ) -> DomainResult<Self> {
        let mut record = Self::new(book_id);
        let mut total: i64 = 0;
        for loc in locations {
            ensure_positive(loc.quantity)?;
            total = total
                .checked_add(loc.quantity)
                .ok_or_else(|| DomainError::invalid_quantity("total stock overflows"))?;
            if record.locations.insert(loc.shelf_id.clone(), loc.quantity).is_some() {
                return Err(DomainError::validation(format!(
                    "duplicate shelf {} for book {}",
                    loc.shelf_id, record.book_id
                )));
            }
        }
        Ok(record)
    }

    pub fn book_id(&self) -> &BookId {
        &self.book_id
    }

    /// Locations in ascending shelf order.
    pub fn locations(&self) -> Vec<StockLocation> {
        self.locations
            .iter()
            .map(|(shelf_id, quantity)| StockLocation {
                shelf_id: shelf_id.clone(),
                quantity: *quantity,
            })
            .collect()
    }

    pub fn quantity_at(&self, shelf_id: &ShelfId) -> i64 {
        self.locations.get(shelf_id).copied().unwrap_or(0)
    }

    /// Total stock across all shelves.
    pub fn total(&self) -> i64 {
        self.locations
            .values()
            .fold(0i64, |acc, q| acc.saturating_add(*q))
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Put `quantity` copies on `shelf_id`, creating the location if needed.
    pub fn add_stock(
        &mut self,
        shelf_id: &ShelfId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<StockChange> {
        ensure_positive(quantity)?;

        self.total()
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invalid_quantity("total stock overflows"))?;

        // shelf quantity <= total, so this cannot overflow.
        let updated = self.quantity_at(shelf_id) + quantity;
        self.locations.insert(shelf_id.clone(), updated);

        Ok(StockChange {
            book_id: self.book_id.clone(),
            shelf_id: shelf_id.clone(),
            delta: quantity,
            occurred_at,
        })
    }

    /// Take `quantity` copies off `shelf_id`; the location disappears when it reaches zero.
    pub fn remove_stock(
        &mut self,
        shelf_id: &ShelfId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<StockChange> {
        ensure_positive(quantity)?;

        let Some(current) = self.locations.get(shelf_id).copied() else {
            return Err(DomainError::location_not_found(
                self.book_id.as_str(),
                shelf_id.as_str(),
            ));
        };

        if current < quantity {
            return Err(DomainError::insufficient_stock(
                self.book_id.as_str(),
                quantity,
                current,
            ));
        }

        let remaining = current - quantity;
        if remaining == 0 {
            self.locations.remove(shelf_id);
        } else {
            self.locations.insert(shelf_id.clone(), remaining);
        }

        Ok(StockChange {
            book_id: self.book_id.clone(),
            shelf_id: shelf_id.clone(),
            delta: -quantity,
            occurred_at,
        })
    }
}
