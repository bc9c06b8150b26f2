//! Order domain module.
//!
//! This crate contains the order lifecycle rules (pending → fulfilled or
//! cancelled), implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage). Stock checks and allocation are wired in by the order
//! service in `bookstore-infra`.

pub mod order;

pub use order::{
    CancelOrder, FulfillOrder, Order, OrderCancelled, OrderCommand, OrderEvent, OrderFulfilled,
    OrderItem, OrderPlaced, OrderStatus, PlaceOrder,
};
