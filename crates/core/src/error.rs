//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (bad input,
/// stock shortfalls, lifecycle violations). Infrastructure concerns such as an
/// unreachable store or a disconnected bus belong elsewhere; these variants are
/// never retried automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A non-positive quantity was supplied.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// The requested amount exceeds what is available (single shelf or aggregate).
    #[error("insufficient stock for book {book_id}: requested {requested}, available {available}")]
    InsufficientStock {
        book_id: String,
        requested: i64,
        available: i64,
    },

    /// The book is not stocked on the referenced shelf.
    #[error("book {book_id} not found on shelf {shelf_id}")]
    LocationNotFound { book_id: String, shelf_id: String },

    /// The referenced order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// The operation is not legal for the entity's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A value failed validation (e.g. blank identifier, empty order).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn insufficient_stock(book_id: impl Into<String>, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            book_id: book_id.into(),
            requested,
            available,
        }
    }

    pub fn location_not_found(book_id: impl Into<String>, shelf_id: impl Into<String>) -> Self {
        Self::LocationNotFound {
            book_id: book_id.into(),
            shelf_id: shelf_id.into(),
        }
    }

    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::OrderNotFound(order_id.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code, used by API consumers to tell errors apart.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InvalidQuantity(_) => "invalid_quantity",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::LocationNotFound { .. } => "location_not_found",
            DomainError::OrderNotFound(_) => "order_not_found",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::Validation(_) => "validation_error",
        }
    }
}

/// Reject non-positive quantities with `InvalidQuantity`.
pub fn ensure_positive(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::invalid_quantity(format!(
            "quantity must be greater than zero (got {quantity})"
        )));
    }
    Ok(())
}
