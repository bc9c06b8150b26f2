//! Infrastructure event bus implementations.
//!
//! The bus abstraction and the in-memory transport live in `bookstore-events`.
//! This module provides the Redis transports:
//! - `redis_streams`: durable consumer groups, at-least-once delivery
//! - `redis_pubsub`: fire-and-forget channels

#[cfg(feature = "redis")]
pub mod redis_conn;
#[cfg(feature = "redis")]
pub mod redis_pubsub;
#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_conn::{DEFAULT_IO_TIMEOUT, RedisBusError};
#[cfg(feature = "redis")]
pub use redis_pubsub::RedisPubSubEventBus;
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsEventBus;
