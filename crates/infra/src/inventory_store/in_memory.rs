use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::thread;
use std::time::Duration;

use bookstore_core::BookId;
use bookstore_warehouse::InventoryRecord;

use super::r#trait::{InventoryStore, InventoryStoreError};

/// Default per-call time budget.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory inventory store.
///
/// Intended for tests/dev and single-process deployments. Carries a few fault
/// injection knobs so callers can exercise the transport-failure paths:
/// an availability switch, simulated latency, and a one-shot save failure.
#[derive(Debug)]
pub struct InMemoryInventoryStore {
    records: RwLock<HashMap<BookId, InventoryRecord>>,
    available: AtomicBool,
    latency: RwLock<Duration>,
    timeout: Duration,
    /// `Some(n)`: the save after `n` more successful saves fails once.
    fail_save_after: Mutex<Option<usize>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_STORE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency: RwLock::new(Duration::ZERO),
            timeout,
            fail_save_after: Mutex::new(None),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every call by `latency`; calls slower than the timeout fail with `Timeout`.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut l) = self.latency.write() {
            *l = latency;
        }
    }

    /// Let `successes` more saves through, then fail exactly one.
    pub fn fail_save_after(&self, successes: usize) {
        if let Ok(mut f) = self.fail_save_after.lock() {
            *f = Some(successes);
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn simulate_io(&self) -> Result<(), InventoryStoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(InventoryStoreError::Unavailable("store offline".to_string()));
        }

        let latency = self.latency.read().map(|l| *l).unwrap_or(Duration::ZERO);
        if latency >= self.timeout {
            thread::sleep(self.timeout);
            return Err(InventoryStoreError::Timeout(self.timeout));
        }
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        Ok(())
    }

    fn injected_save_failure(&self) -> bool {
        let Ok(mut slot) = self.fail_save_after.lock() else {
            return false;
        };
        match *slot {
            Some(0) => {
                *slot = None;
                true
            }
            Some(n) => {
                *slot = Some(n - 1);
                false
            }
            None => false,
        }
    }

    fn poisoned() -> InventoryStoreError {
        InventoryStoreError::Unavailable("lock poisoned".to_string())
    }
}

impl Default for InMemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn load(&self, book_id: &BookId) -> Result<Option<InventoryRecord>, InventoryStoreError> {
        self.simulate_io()?;
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.get(book_id).cloned())
    }

    fn save(&self, record: &InventoryRecord) -> Result<(), InventoryStoreError> {
        self.simulate_io()?;
        if self.injected_save_failure() {
            return Err(InventoryStoreError::Unavailable("injected save failure".to_string()));
        }

        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        if record.is_empty() {
            records.remove(record.book_id());
        } else {
            records.insert(record.book_id().clone(), record.clone());
        }
        Ok(())
    }

    fn scan(&self) -> Result<Vec<InventoryRecord>, InventoryStoreError> {
        self.simulate_io()?;
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| a.book_id().cmp(b.book_id()));
        Ok(all)
    }
}
