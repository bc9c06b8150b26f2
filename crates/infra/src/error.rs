//! Service-level error union.
//!
//! Domain errors pass through untouched; infrastructure failures are folded
//! into a small set of transport-level variants that callers may retry.

use thiserror::Error;

use bookstore_core::DomainError;

use crate::inventory_store::InventoryStoreError;
use crate::locks::LockError;
use crate::order_store::OrderStoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Deterministic business failure; never retried.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The inventory store could not be reached within its time budget.
    #[error("inventory unavailable: {0}")]
    InventoryUnavailable(String),

    /// The order store could not be reached.
    #[error("order store unavailable: {0}")]
    OrderStoreUnavailable(String),

    /// A concurrent writer got there first (stale version or busy lock).
    #[error("concurrent modification: {0}")]
    Concurrency(String),
}

impl ServiceError {
    /// Infrastructure failures are candidates for caller-side retry; domain errors are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ServiceError::Domain(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Domain(e) => e.code(),
            ServiceError::InventoryUnavailable(_) => "inventory_unavailable",
            ServiceError::OrderStoreUnavailable(_) => "order_store_unavailable",
            ServiceError::Concurrency(_) => "concurrency_conflict",
        }
    }
}

impl From<InventoryStoreError> for ServiceError {
    fn from(value: InventoryStoreError) -> Self {
        ServiceError::InventoryUnavailable(value.to_string())
    }
}

/// Per-book lock waits count against the inventory time budget.
impl From<LockError> for ServiceError {
    fn from(value: LockError) -> Self {
        ServiceError::InventoryUnavailable(value.to_string())
    }
}

impl From<OrderStoreError> for ServiceError {
    fn from(value: OrderStoreError) -> Self {
        match value {
            OrderStoreError::Concurrency(msg) => ServiceError::Concurrency(msg),
            OrderStoreError::Unavailable(msg) => ServiceError::OrderStoreUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn domain_errors_are_not_retryable() {
        let err = ServiceError::from(DomainError::insufficient_stock("b1", 3, 1));
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "insufficient_stock");
    }

    #[test]
    fn store_failures_map_to_transport_variants() {
        let err = ServiceError::from(InventoryStoreError::Timeout(Duration::from_millis(5)));
        assert!(matches!(err, ServiceError::InventoryUnavailable(_)));
        assert!(err.is_retryable());

        let err = ServiceError::from(OrderStoreError::Concurrency("stale".into()));
        assert_eq!(err.code(), "concurrency_conflict");

        let err = ServiceError::from(LockError::Timeout(Duration::from_millis(5)));
        assert_eq!(err.code(), "inventory_unavailable");
    }
}
