//! Event publishing/subscription mechanics and the shared domain event vocabulary.
//!
//! Services never call each other directly: the warehouse, catalog and order
//! services exchange immutable [`DomainEvent`] values over an [`EventBus`] with
//! topic-based routing.

pub mod bus;
pub mod domain;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;
pub mod topic;

pub use bus::{EventBus, Settlement, Subscription};
pub use domain::{BookChanged, BookDetails, DomainEvent, ItemQuantity, OrderChanged, StockUpdated};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use topic::{TopicPattern, TopicPatternError};
