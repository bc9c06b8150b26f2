use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use bookstore_core::BookId;
use bookstore_warehouse::InventoryRecord;

/// Inventory store operation error.
///
/// These are **infrastructure errors**: the ledger's own rules are enforced by
/// `InventoryRecord` before anything reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryStoreError {
    #[error("inventory store unavailable: {0}")]
    Unavailable(String),

    #[error("inventory store timed out after {0:?}")]
    Timeout(Duration),
}

/// Keyed store of inventory records.
///
/// ## Semantics
///
/// - `load` returns `None` for a book with no stock anywhere
/// - `save` is an atomic upsert of the whole record; saving an empty record
///   deletes the key, so no book is ever stored with zero locations
/// - `scan` returns every stored record (used for the shelf reverse index and
///   the inventory overview)
///
/// Implementations bound every call by a timeout and report it as
/// [`InventoryStoreError::Timeout`].
pub trait InventoryStore: Send + Sync {
    fn load(&self, book_id: &BookId) -> Result<Option<InventoryRecord>, InventoryStoreError>;

    fn save(&self, record: &InventoryRecord) -> Result<(), InventoryStoreError>;

    fn scan(&self) -> Result<Vec<InventoryRecord>, InventoryStoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn load(&self, book_id: &BookId) -> Result<Option<InventoryRecord>, InventoryStoreError> {
        (**self).load(book_id)
    }

    fn save(&self, record: &InventoryRecord) -> Result<(), InventoryStoreError> {
        (**self).save(record)
    }

    fn scan(&self) -> Result<Vec<InventoryRecord>, InventoryStoreError> {
        (**self).scan()
    }
}
