//! Domain events exchanged between the catalog, warehouse and order services.
//!
//! The serialized form is internally tagged (`{"type": "StockUpdated", ...}`)
//! with camelCase fields, so any service on the exchange can decode it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstore_core::{BookId, OrderId, ShelfId};

use crate::Event;

pub const TOPIC_BOOK_ADDED: &str = "book.added";
pub const TOPIC_BOOK_UPDATED: &str = "book.updated";
pub const TOPIC_BOOK_DELETED: &str = "book.deleted";
pub const TOPIC_STOCK_UPDATED: &str = "stock.updated";
pub const TOPIC_ORDER_CREATED: &str = "order.created";
pub const TOPIC_ORDER_FULFILLED: &str = "order.fulfilled";
pub const TOPIC_ORDER_CANCELLED: &str = "order.cancelled";

/// Catalog fields carried by book events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDetails {
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub description: String,
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Present only when the producer knows the current total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_stock: Option<i64>,
}

/// Payload of `BookAdded` / `BookUpdated` / `BookDeleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookChanged {
    pub book_id: BookId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<BookDetails>,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `StockUpdated`: a signed delta on one shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdated {
    pub book_id: BookId,
    pub shelf_id: ShelfId,
    /// Positive when stock was added, negative when removed.
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
}

/// One order line, copied by value into order events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuantity {
    pub book_id: BookId,
    pub quantity: i64,
}

/// Payload of `OrderCreated` / `OrderFulfilled` / `OrderCancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderChanged {
    pub order_id: OrderId,
    pub items: Vec<ItemQuantity>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    BookAdded(BookChanged),
    BookUpdated(BookChanged),
    BookDeleted(BookChanged),
    StockUpdated(StockUpdated),
    OrderCreated(OrderChanged),
    OrderFulfilled(OrderChanged),
    OrderCancelled(OrderChanged),
}

impl DomainEvent {
    /// The book this event is about, if any.
    pub fn book_id(&self) -> Option<&BookId> {
        match self {
            DomainEvent::BookAdded(e) | DomainEvent::BookUpdated(e) | DomainEvent::BookDeleted(e) => {
                Some(&e.book_id)
            }
            DomainEvent::StockUpdated(e) => Some(&e.book_id),
            DomainEvent::OrderCreated(_)
            | DomainEvent::OrderFulfilled(_)
            | DomainEvent::OrderCancelled(_) => None,
        }
    }
}

impl Event for DomainEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::BookAdded(_) => TOPIC_BOOK_ADDED,
            DomainEvent::BookUpdated(_) => TOPIC_BOOK_UPDATED,
            DomainEvent::BookDeleted(_) => TOPIC_BOOK_DELETED,
            DomainEvent::StockUpdated(_) => TOPIC_STOCK_UPDATED,
            DomainEvent::OrderCreated(_) => TOPIC_ORDER_CREATED,
            DomainEvent::OrderFulfilled(_) => TOPIC_ORDER_FULFILLED,
            DomainEvent::OrderCancelled(_) => TOPIC_ORDER_CANCELLED,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::BookAdded(e) | DomainEvent::BookUpdated(e) | DomainEvent::BookDeleted(e) => {
                e.timestamp
            }
            DomainEvent::StockUpdated(e) => e.timestamp,
            DomainEvent::OrderCreated(e)
            | DomainEvent::OrderFulfilled(e)
            | DomainEvent::OrderCancelled(e) => e.timestamp,
        }
    }
}
