//! In-memory topic bus for tests/dev and single-process deployments.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};

use thiserror::Error;
use tracing::warn;

use crate::bus::{EventBus, Subscription};
use crate::topic::TopicPattern;

/// Default per-subscription queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InMemoryBusError {
    /// The bus has been disconnected (transport unavailable).
    #[error("event bus is not connected")]
    NotConnected,

    /// Internal lock poisoning.
    #[error("event bus lock poisoned")]
    Poisoned,

    /// The message reached every other subscriber, but these queues were full.
    #[error("subscriber queue full for patterns: {}", patterns.join(", "))]
    QueueFull { patterns: Vec<String> },
}

#[derive(Debug)]
struct Subscriber<M> {
    pattern: TopicPattern,
    tx: mpsc::SyncSender<M>,
}

/// In-memory pub/sub bus.
///
/// - No IO / no async
/// - One bounded queue per subscription; `publish` never blocks on a consumer
/// - Subscriptions whose receiver was dropped are pruned while publishing
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<Subscriber<M>>>,
    connected: AtomicBool,
    capacity: usize,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            capacity: capacity.max(1),
        }
    }

    /// Simulate a transport outage: publish/subscribe fail with `NotConnected`.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, topic: &str, message: M) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(InMemoryBusError::NotConnected);
        }

        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        let mut full = Vec::new();

        subs.retain(|sub| {
            if !sub.pattern.matches(topic) {
                return true;
            }
            match sub.tx.try_send(message.clone()) {
                Ok(()) => true,
                Err(mpsc::TrySendError::Full(_)) => {
                    warn!(topic, pattern = %sub.pattern, "subscriber queue full, message not delivered");
                    full.push(sub.pattern.to_string());
                    true
                }
                // Receiver dropped: the subscription is gone.
                Err(mpsc::TrySendError::Disconnected(_)) => false,
            }
        });

        if full.is_empty() {
            Ok(())
        } else {
            Err(InMemoryBusError::QueueFull { patterns: full })
        }
    }

    fn subscribe(&self, pattern: &TopicPattern) -> Result<Subscription<M>, Self::Error> {
        if !self.is_connected() {
            return Err(InMemoryBusError::NotConnected);
        }

        let (tx, rx) = mpsc::sync_channel(self.capacity);
        self.subscribers
            .lock()
            .map_err(|_| InMemoryBusError::Poisoned)?
            .push(Subscriber {
                pattern: pattern.clone(),
                tx,
            });

        Ok(Subscription::new(pattern.clone(), rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(p: &str) -> TopicPattern {
        TopicPattern::parse(p).unwrap()
    }

    #[test]
    fn routes_by_pattern() {
        let bus = InMemoryEventBus::<&'static str>::new();
        let books = bus.subscribe(&pattern("book.*")).unwrap();
        let stock = bus.subscribe(&pattern("stock.updated")).unwrap();

        bus.publish("book.added", "added").unwrap();
        bus.publish("stock.updated", "stock").unwrap();
        bus.publish("book.deleted", "deleted").unwrap();

        assert_eq!(books.try_recv().unwrap(), "added");
        assert_eq!(books.try_recv().unwrap(), "deleted");
        assert!(books.try_recv().is_err());

        assert_eq!(stock.try_recv().unwrap(), "stock");
        assert!(stock.try_recv().is_err());
    }

    #[test]
    fn each_subscription_gets_its_own_copy() {
        let bus = InMemoryEventBus::<u32>::new();
        let a = bus.subscribe(&pattern("stock.updated")).unwrap();
        let b = bus.subscribe(&pattern("stock.#")).unwrap();

        bus.publish("stock.updated", 7).unwrap();

        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 7);
    }

    #[test]
    fn disconnected_bus_reports_not_connected() {
        let bus = InMemoryEventBus::<u32>::new();
        bus.disconnect();

        assert_eq!(bus.publish("stock.updated", 1), Err(InMemoryBusError::NotConnected));
        assert!(matches!(
            bus.subscribe(&pattern("stock.updated")),
            Err(InMemoryBusError::NotConnected)
        ));

        bus.reconnect();
        assert!(bus.publish("stock.updated", 1).is_ok());
    }

    #[test]
    fn full_queue_does_not_block_other_subscribers() {
        let bus = InMemoryEventBus::<u32>::with_capacity(1);
        let slow = bus.subscribe(&pattern("stock.updated")).unwrap();
        let fast = bus.subscribe(&pattern("stock.updated")).unwrap();

        bus.publish("stock.updated", 1).unwrap();
        assert_eq!(fast.try_recv().unwrap(), 1);

        let err = bus.publish("stock.updated", 2).unwrap_err();
        assert_eq!(
            err,
            InMemoryBusError::QueueFull {
                patterns: vec!["stock.updated".to_string()]
            }
        );
        assert_eq!(fast.try_recv().unwrap(), 2);
        assert_eq!(slow.try_recv().unwrap(), 1);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let bus = InMemoryEventBus::<u32>::new();
        let sub = bus.subscribe(&pattern("#")).unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        bus.publish("order.created", 1).unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
