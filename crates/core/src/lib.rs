//! `bookstore-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error taxonomy and the aggregate traits shared by the
//! warehouse and order modules.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{ensure_positive, DomainError, DomainResult};
pub use id::{BookId, OrderId, ShelfId};
pub use value_object::ValueObject;
