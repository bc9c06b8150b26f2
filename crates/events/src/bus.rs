//! Event publishing/subscription abstraction (mechanics only).
//!
//! This module provides the **event bus pattern**: producers publish messages
//! under a hierarchical topic, and every subscription whose [`TopicPattern`]
//! matches receives its own copy.
//!
//! ## Delivery semantics
//!
//! - **Transport-agnostic**: in-memory channels, Redis pub/sub, a broker exchange
//! - **At-least-once**: a message may arrive more than once; consumers must tolerate it
//! - **No cross-topic ordering**: events on different topics may interleave arbitrarily
//! - **Fire-and-forget**: `publish` returns once the transport accepted the message;
//!   it never waits for subscribers to process it
//!
//! Publishing is best-effort from the point of view of the business operation
//! that triggered it: a failed publish is reported to the caller, which logs it
//! and keeps its own write.
//!
//! Durable transports keep a message pending until its consumer reports a
//! [`Settlement`]; a consumer that dies before settling gets the message again.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use crate::topic::TopicPattern;

/// A subscription to the messages matching one topic pattern.
///
/// Each subscription owns an independent, bounded delivery queue, so a slow
/// consumer only ever delays itself.
///
/// ```ignore
/// let subscription = bus.subscribe(&"book.*".parse()?)?;
///
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(event) => process(event)?,
///         Err(RecvTimeoutError::Timeout) => continue,      // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break,    // bus closed
///     }
/// }
/// ```
///
/// Subscriptions are designed for single-threaded consumption; hand the
/// subscription to one worker thread.
#[derive(Debug)]
pub struct Subscription<M> {
    pattern: TopicPattern,
    receiver: Receiver<M>,
    settlements: Option<Sender<Settlement>>,
}

/// What a consumer did with one received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Handled; the transport can forget the message.
    Ack,
    /// Given up on; the transport dead-letters it instead of redelivering.
    Reject,
}

impl<M> Subscription<M> {
    pub fn new(pattern: TopicPattern, receiver: Receiver<M>) -> Self {
        Self {
            pattern,
            receiver,
            settlements: None,
        }
    }

    /// Subscription whose transport waits for one [`Settlement`] per received
    /// message, reported in the order the messages were received.
    pub fn with_settlement(
        pattern: TopicPattern,
        receiver: Receiver<M>,
        settlements: Sender<Settlement>,
    ) -> Self {
        Self {
            pattern,
            receiver,
            settlements: Some(settlements),
        }
    }

    /// Report the outcome for the oldest unsettled message.
    ///
    /// No-op for transports that forget messages on delivery.
    pub fn settle(&self, outcome: Settlement) {
        if let Some(tx) = &self.settlements {
            let _ = tx.send(outcome);
        }
    }

    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic, topic-routed event bus.
///
/// ```text
/// Warehouse ── stock.updated ──▶ Event Bus ──▶ subscription "stock.updated" (orders cache)
/// Catalog   ── book.added    ──▶           ──▶ subscription "book.*"        (orders cache)
/// Orders    ── order.created ──▶           ──▶ subscription "order.#"       (audit)
/// ```
///
/// Implementations must be `Send + Sync`; many request handlers publish
/// concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Publish `message` under `topic` (e.g. `stock.updated`).
    ///
    /// Fails when the transport is not connected; callers treat that failure as
    /// non-fatal to the operation that produced the message.
    fn publish(&self, topic: &str, message: M) -> Result<(), Self::Error>;

    /// Open a new subscription receiving every message whose topic matches `pattern`.
    fn subscribe(&self, pattern: &TopicPattern) -> Result<Subscription<M>, Self::Error>;

    /// Open a subscription that outlives its consumer under `name`.
    ///
    /// Messages published while the consumer is away are delivered when it
    /// subscribes again, and stay pending until settled. Transports without
    /// storage fall back to [`EventBus::subscribe`].
    fn subscribe_durable(
        &self,
        name: &str,
        pattern: &TopicPattern,
    ) -> Result<Subscription<M>, Self::Error> {
        let _ = name;
        self.subscribe(pattern)
    }
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, topic: &str, message: M) -> Result<(), Self::Error> {
        (**self).publish(topic, message)
    }

    fn subscribe(&self, pattern: &TopicPattern) -> Result<Subscription<M>, Self::Error> {
        (**self).subscribe(pattern)
    }

    fn subscribe_durable(
        &self,
        name: &str,
        pattern: &TopicPattern,
    ) -> Result<Subscription<M>, Self::Error> {
        (**self).subscribe_durable(name, pattern)
    }
}
