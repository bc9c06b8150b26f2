//! Redis pub/sub-backed event bus (optional).
//!
//! Topics map one-to-one onto Redis channels; subscriptions use `PSUBSCRIBE`
//! with the pattern's glob form and re-check each channel against the topic
//! pattern, since a glob `*` also crosses dots.
//!
//! Redis pub/sub is not durable: messages published while a subscriber is
//! offline are lost, and `subscribe_durable` falls back to a plain
//! subscription. Use [`super::RedisStreamsEventBus`] when delivery must
//! survive restarts.

use std::sync::mpsc::{self, TrySendError};
use std::thread;
use std::time::Duration;

use redis::Commands;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use bookstore_events::in_memory_bus::DEFAULT_QUEUE_CAPACITY;
use bookstore_events::{EventBus, EventEnvelope, Subscription, TopicPattern};

use super::redis_conn::{DEFAULT_IO_TIMEOUT, RedisBusError, connect};

const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a subscriber waits for a message before checking again.
const POLL: Duration = Duration::from_millis(250);

/// Redis pub/sub bus for JSON event envelopes.
#[derive(Debug, Clone)]
pub struct RedisPubSubEventBus {
    client: redis::Client,
    capacity: usize,
    timeout: Duration,
}

impl RedisPubSubEventBus {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, RedisBusError> {
        Self::with_capacity(redis_url, DEFAULT_QUEUE_CAPACITY)
    }

    /// `capacity` bounds each subscription's local queue.
    pub fn with_capacity(redis_url: impl AsRef<str>, capacity: usize) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())?;
        Ok(Self {
            client,
            capacity: capacity.max(1),
            timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    /// Bound connecting and every command round-trip by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<E> EventBus<EventEnvelope<E>> for RedisPubSubEventBus
where
    E: Serialize + DeserializeOwned + Send + 'static,
{
    type Error = RedisBusError;

    fn publish(&self, topic: &str, message: EventEnvelope<E>) -> Result<(), Self::Error> {
        let payload =
            serde_json::to_string(&message).map_err(|e| RedisBusError::Serialize(e.to_string()))?;

        let mut conn = connect(&self.client, self.timeout)?;
        let receivers: i64 = conn.publish(topic, payload)?;
        debug!(topic, receivers, "published to redis");
        Ok(())
    }

    fn subscribe(&self, pattern: &TopicPattern) -> Result<Subscription<EventEnvelope<E>>, Self::Error> {
        let (tx, rx) = mpsc::sync_channel(self.capacity);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), RedisBusError>>();

        let client = self.client.clone();
        let timeout = self.timeout;
        let filter = pattern.clone();

        // Background thread that receives pub/sub messages and forwards them.
        // It exits on connection loss or on the first send after the
        // subscription is dropped.
        thread::Builder::new()
            .name(format!("redis-sub:{pattern}"))
            .spawn(move || {
                let mut conn = match connect(&client, timeout) {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let mut pubsub = conn.as_pubsub();
                if let Err(e) = pubsub.psubscribe(filter.to_glob()) {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                if let Err(e) = pubsub.set_read_timeout(Some(POLL)) {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                loop {
                    let msg = match pubsub.get_message() {
                        Ok(m) => m,
                        Err(err) if err.is_timeout() => continue,
                        Err(err) => {
                            warn!(pattern = %filter, error = %err, "redis subscription lost");
                            return;
                        }
                    };

                    let channel = msg.get_channel_name().to_string();
                    if !filter.matches(&channel) {
                        continue;
                    }

                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(_) => continue,
                    };

                    let envelope: EventEnvelope<E> = match serde_json::from_str(&payload) {
                        Ok(e) => e,
                        Err(err) => {
                            warn!(topic = %channel, error = %err, "undecodable message skipped");
                            continue;
                        }
                    };

                    match tx.try_send(envelope) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!(pattern = %filter, topic = %channel, "subscriber queue full; message dropped");
                        }
                        Err(TrySendError::Disconnected(_)) => return,
                    }
                }
            })
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        match ready_rx.recv_timeout(READY_TIMEOUT.max(self.timeout)) {
            Ok(Ok(())) => Ok(Subscription::new(pattern.clone(), rx)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(RedisBusError::NotReady(pattern.to_string())),
        }
    }
}
