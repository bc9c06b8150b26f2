use chrono::Utc;
use serde::{Deserialize, Serialize};

use bookstore_core::{BookId, DomainError, ShelfId};
use bookstore_events::{BookChanged, BookDetails, DomainEvent};
use bookstore_orders::OrderItem;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /warehouse/stock/add` and `/remove`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChangeRequest {
    pub book_id: String,
    pub shelf_id: String,
    pub quantity: i64,
}

impl StockChangeRequest {
    pub fn ids(&self) -> Result<(BookId, ShelfId), DomainError> {
        Ok((self.book_id.parse()?, self.shelf_id.parse()?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub book_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
}

impl CreateOrderRequest {
    pub fn into_items(self) -> Result<Vec<OrderItem>, DomainError> {
        self.items
            .into_iter()
            .map(|i| {
                Ok(OrderItem {
                    book_id: i.book_id.parse()?,
                    quantity: i.quantity,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum BookEventKind {
    BookAdded,
    BookUpdated,
    BookDeleted,
}

/// Catalog event intake: `{"type": "BookAdded", "bookId": "...", "book": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookEventRequest {
    #[serde(rename = "type")]
    pub kind: BookEventKind,
    pub book_id: String,
    #[serde(default)]
    pub book: Option<BookDetails>,
}

impl BookEventRequest {
    pub fn into_event(self) -> Result<DomainEvent, DomainError> {
        let book_id: BookId = self.book_id.parse()?;
        if !matches!(self.kind, BookEventKind::BookDeleted) && self.book.is_none() {
            return Err(DomainError::validation("book details are required"));
        }

        let changed = BookChanged {
            book_id,
            book: self.book,
            timestamp: Utc::now(),
        };
        Ok(match self.kind {
            BookEventKind::BookAdded => DomainEvent::BookAdded(changed),
            BookEventKind::BookUpdated => DomainEvent::BookUpdated(changed),
            BookEventKind::BookDeleted => DomainEvent::BookDeleted(changed),
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfLevelResponse {
    pub book_id: BookId,
    pub shelf_id: ShelfId,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalStockResponse {
    pub book_id: BookId,
    pub total_stock: i64,
}
