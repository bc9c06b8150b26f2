//! Per-key mutual exclusion with bounded waits.
//!
//! Writers against the same key are serialized; writers against different keys
//! proceed in parallel. A multi-key acquisition takes every key at once or
//! none, so two callers locking overlapping key sets cannot deadlock.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("timed out after {0:?} waiting for lock")]
    Timeout(Duration),

    #[error("lock table poisoned")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for LockError {
    fn from(_: PoisonError<T>) -> Self {
        LockError::Poisoned
    }
}

/// Lock table keyed by `K` (book id, order id, ...).
#[derive(Debug)]
pub struct KeyedLocks<K> {
    held: Mutex<HashSet<K>>,
    released: Condvar,
}

impl<K> KeyedLocks<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Lock a single key, waiting at most `timeout`.
    pub fn acquire(&self, key: K, timeout: Duration) -> Result<KeyedGuard<'_, K>, LockError> {
        self.acquire_all([key], timeout)
    }

    /// Lock every key in `keys` atomically, waiting at most `timeout` for all of them.
    pub fn acquire_all(
        &self,
        keys: impl IntoIterator<Item = K>,
        timeout: Duration,
    ) -> Result<KeyedGuard<'_, K>, LockError> {
        let keys: Vec<K> = keys.into_iter().collect::<HashSet<_>>().into_iter().collect();

        let held = self.held.lock()?;
        let (mut held, wait) = self
            .released
            .wait_timeout_while(held, timeout, |held| keys.iter().any(|k| held.contains(k)))?;

        if wait.timed_out() && keys.iter().any(|k| held.contains(k)) {
            return Err(LockError::Timeout(timeout));
        }

        held.extend(keys.iter().cloned());
        Ok(KeyedGuard { locks: self, keys })
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        self.held.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Releases its keys on drop.
#[derive(Debug)]
pub struct KeyedGuard<'a, K>
where
    K: Eq + Hash,
{
    locks: &'a KeyedLocks<K>,
    keys: Vec<K>,
}

impl<K> Drop for KeyedGuard<'_, K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
