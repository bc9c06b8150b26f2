//! Redis Streams-backed event bus (durable, at-least-once delivery).
//!
//! - **Stream key**: `bookstore:events`, one stream for every topic; each entry
//!   carries `topic` and `payload` (JSON envelope) fields
//! - **Consumer groups**: one per subscription. Durable subscriptions use the
//!   subscriber's name as the group, so a restarted consumer resumes where it
//!   left off and first receives its own unacknowledged entries again
//! - **Acknowledgement**: durable entries are `XACK`ed only when the consumer
//!   settles them; entries outside the subscription's [`TopicPattern`] are
//!   acknowledged straight away
//! - **Dead-letter queue**: `bookstore:events:dlq` receives rejected and
//!   undecodable entries
//!
//! Plain `subscribe` creates a throwaway group starting at the stream's tail,
//! acknowledges on delivery and destroys the group when the subscription is
//! dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use redis::Commands;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use bookstore_events::in_memory_bus::DEFAULT_QUEUE_CAPACITY;
use bookstore_events::{EventBus, EventEnvelope, Settlement, Subscription, TopicPattern};

use super::redis_conn::{DEFAULT_IO_TIMEOUT, RedisBusError, connect};

pub const DEFAULT_STREAM_KEY: &str = "bookstore:events";
pub const DEFAULT_DLQ_KEY: &str = "bookstore:events:dlq";

/// How long one `XREADGROUP` blocks waiting for new entries.
const READ_BLOCK: Duration = Duration::from_millis(100);

/// Pause before retrying after a failed read.
const RETRY_DELAY: Duration = Duration::from_millis(500);

static EPHEMERAL_GROUPS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct RedisStreamsEventBus {
    client: redis::Client,
    stream_key: String,
    dlq_key: String,
    consumer: String,
    capacity: usize,
    timeout: Duration,
}

impl RedisStreamsEventBus {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, RedisBusError> {
        Self::with_capacity(redis_url, DEFAULT_QUEUE_CAPACITY)
    }

    /// `capacity` bounds how many entries a subscription holds unsettled.
    pub fn with_capacity(redis_url: impl AsRef<str>, capacity: usize) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())?;
        Ok(Self {
            client,
            stream_key: DEFAULT_STREAM_KEY.to_string(),
            dlq_key: DEFAULT_DLQ_KEY.to_string(),
            consumer: "bookstore".to_string(),
            capacity: capacity.max(1),
            timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    pub fn with_keys(mut self, stream_key: impl Into<String>, dlq_key: impl Into<String>) -> Self {
        self.stream_key = stream_key.into();
        self.dlq_key = dlq_key.into();
        self
    }

    /// Consumer name used inside every group; keep it stable across restarts.
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// Bound connecting and every command round-trip by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    pub fn dlq_key(&self) -> &str {
        &self.dlq_key
    }

    fn open<E>(
        &self,
        group: String,
        start: &str,
        mode: AckMode,
        pattern: &TopicPattern,
    ) -> Result<Subscription<EventEnvelope<E>>, RedisBusError>
    where
        E: DeserializeOwned + Send + 'static,
    {
        let mut conn = connect(&self.client, self.timeout)?;
        ensure_group(&mut conn, &self.stream_key, &group, start)?;
        // Blocking reads must not trip the read timeout.
        conn.set_read_timeout(Some(self.timeout.max(READ_BLOCK * 4)))?;

        let (tx, rx) = mpsc::sync_channel(self.capacity);
        let (settle_tx, settle_rx) = mpsc::channel();

        let reader = StreamReader {
            client: self.client.clone(),
            timeout: self.timeout,
            conn,
            stream_key: self.stream_key.clone(),
            dlq_key: self.dlq_key.clone(),
            group: group.clone(),
            consumer: self.consumer.clone(),
            filter: pattern.clone(),
            mode,
            capacity: self.capacity,
            tx,
            settlements: settle_rx,
            in_flight: VecDeque::new(),
            backlog_cursor: Some("0".to_string()),
            closed: false,
        };

        thread::Builder::new()
            .name(format!("redis-stream:{group}"))
            .spawn(move || reader.run())
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        debug!(group = %group, pattern = %pattern, "redis stream subscription ready");
        Ok(Subscription::with_settlement(pattern.clone(), rx, settle_tx))
    }
}

impl<E> EventBus<EventEnvelope<E>> for RedisStreamsEventBus
where
    E: Serialize + DeserializeOwned + Send + 'static,
{
    type Error = RedisBusError;

    fn publish(&self, topic: &str, message: EventEnvelope<E>) -> Result<(), Self::Error> {
        let payload =
            serde_json::to_string(&message).map_err(|e| RedisBusError::Serialize(e.to_string()))?;

        let mut conn = connect(&self.client, self.timeout)?;
        let entry_id: String = conn.xadd(
            &self.stream_key,
            "*",
            &[("topic", topic), ("payload", payload.as_str())],
        )?;
        debug!(topic, entry_id = %entry_id, "appended to redis stream");
        Ok(())
    }

    fn subscribe(&self, pattern: &TopicPattern) -> Result<Subscription<EventEnvelope<E>>, Self::Error> {
        let group = format!(
            "ephemeral:{pattern}:{}:{}",
            std::process::id(),
            EPHEMERAL_GROUPS.fetch_add(1, Ordering::Relaxed)
        );
        self.open(group, "$", AckMode::OnDelivery, pattern)
    }

    fn subscribe_durable(
        &self,
        name: &str,
        pattern: &TopicPattern,
    ) -> Result<Subscription<EventEnvelope<E>>, Self::Error> {
        self.open(name.to_string(), "0", AckMode::OnSettle, pattern)
    }
}

/// Create `group` on `stream_key` (and the stream itself) unless it exists.
fn ensure_group(
    conn: &mut redis::Connection,
    stream_key: &str,
    group: &str,
    start: &str,
) -> Result<(), RedisBusError> {
    let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream_key, group, start);
    match created {
        Ok(()) => Ok(()),
        Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckMode {
    /// Acknowledge as soon as the entry is handed to the subscriber.
    OnDelivery,
    /// Keep the entry pending until the subscriber settles it.
    OnSettle,
}

/// Entry handed to the subscriber and not yet settled.
#[derive(Debug)]
struct InFlight {
    entry_id: String,
    topic: String,
    payload: String,
}

/// Entry as read from the stream.
#[derive(Debug, PartialEq, Eq)]
struct RawEntry {
    entry_id: String,
    topic: Option<String>,
    payload: Option<String>,
}

impl From<StreamId> for RawEntry {
    fn from(entry: StreamId) -> Self {
        Self {
            topic: entry.get("topic"),
            payload: entry.get("payload"),
            entry_id: entry.id,
        }
    }
}

/// What to do with one entry that was read.
#[derive(Debug, PartialEq, Eq)]
enum Routing<E> {
    /// Not for this subscription (or empty); acknowledge and move on.
    Skip,
    /// Cannot be decoded; dead-letter it.
    Poison { topic: String, payload: String, reason: String },
    Deliver { topic: String, payload: String, envelope: EventEnvelope<E> },
}

fn route<E: DeserializeOwned>(filter: &TopicPattern, entry: &RawEntry) -> Routing<E> {
    let (Some(topic), Some(payload)) = (&entry.topic, &entry.payload) else {
        return Routing::Skip;
    };
    if !filter.matches(topic) {
        return Routing::Skip;
    }
    match serde_json::from_str::<EventEnvelope<E>>(payload) {
        Ok(envelope) => Routing::Deliver {
            topic: topic.clone(),
            payload: payload.clone(),
            envelope,
        },
        Err(err) => Routing::Poison {
            topic: topic.clone(),
            payload: payload.clone(),
            reason: err.to_string(),
        },
    }
}

struct StreamReader<E> {
    client: redis::Client,
    timeout: Duration,
    conn: redis::Connection,
    stream_key: String,
    dlq_key: String,
    group: String,
    consumer: String,
    filter: TopicPattern,
    mode: AckMode,
    capacity: usize,
    tx: SyncSender<EventEnvelope<E>>,
    settlements: Receiver<Settlement>,
    in_flight: VecDeque<InFlight>,
    /// Last pending entry seen while replaying this consumer's backlog; `None`
    /// once the backlog is drained and only new entries are read.
    backlog_cursor: Option<String>,
    closed: bool,
}

impl<E> StreamReader<E>
where
    E: DeserializeOwned,
{
    fn run(mut self) {
        while !self.closed {
            let step = self.settle_pending().and_then(|()| {
                if self.closed {
                    Ok(())
                } else {
                    self.read_batch()
                }
            });

            if let Err(err) = step {
                warn!(group = %self.group, error = %err, "redis stream read failed; retrying");
                thread::sleep(RETRY_DELAY);
                if err.is_transport() {
                    self.reconnect();
                }
            }
        }

        if self.mode == AckMode::OnDelivery {
            let destroyed: redis::RedisResult<i64> =
                self.conn.xgroup_destroy(&self.stream_key, &self.group);
            if let Err(err) = destroyed {
                debug!(group = %self.group, error = %err, "could not remove consumer group");
            }
        }
        debug!(group = %self.group, "redis stream subscription closed");
    }

    fn reconnect(&mut self) {
        match connect(&self.client, self.timeout) {
            Ok(conn) => {
                let _ = conn.set_read_timeout(Some(self.timeout.max(READ_BLOCK * 4)));
                self.conn = conn;
                // Unsettled entries are still pending on the server; read them again.
                self.in_flight.clear();
                self.backlog_cursor = Some("0".to_string());
                info!(group = %self.group, "redis stream reconnected");
            }
            Err(err) => debug!(group = %self.group, error = %err, "redis stream reconnect failed"),
        }
    }

    /// Apply every settlement reported so far, oldest entry first.
    fn settle_pending(&mut self) -> Result<(), RedisBusError> {
        loop {
            let outcome = match self.settlements.try_recv() {
                Ok(outcome) => outcome,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    return Ok(());
                }
            };

            if self.mode == AckMode::OnDelivery {
                continue;
            }
            let Some(entry) = self.in_flight.pop_front() else {
                continue;
            };

            if outcome == Settlement::Reject {
                self.dead_letter(&entry.entry_id, &entry.topic, &entry.payload, "rejected by subscriber")?;
            }
            self.ack(&entry.entry_id)?;
        }
    }

    fn read_batch(&mut self) -> Result<(), RedisBusError> {
        let room = self.capacity.saturating_sub(self.in_flight.len());
        if room == 0 {
            thread::sleep(READ_BLOCK);
            return Ok(());
        }

        let mut opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(room);
        let start = match &self.backlog_cursor {
            Some(cursor) => cursor.clone(),
            None => {
                opts = opts.block(READ_BLOCK.as_millis() as usize);
                ">".to_string()
            }
        };

        let reply: Option<StreamReadReply> =
            self.conn.xread_options(&[&self.stream_key], &[&start], &opts)?;
        let entries: Vec<RawEntry> = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).map(RawEntry::from).collect())
            .unwrap_or_default();

        if self.backlog_cursor.is_some() {
            match entries.last() {
                Some(last) => {
                    debug!(group = %self.group, count = entries.len(), "redelivering pending entries");
                    self.backlog_cursor = Some(last.entry_id.clone());
                }
                None => self.backlog_cursor = None,
            }
        }

        for entry in entries {
            self.forward(entry)?;
            if self.closed {
                break;
            }
        }
        Ok(())
    }

    fn forward(&mut self, entry: RawEntry) -> Result<(), RedisBusError> {
        match route::<E>(&self.filter, &entry) {
            Routing::Skip => self.ack(&entry.entry_id),
            Routing::Poison { topic, payload, reason } => {
                warn!(topic = %topic, error = %reason, "undecodable stream entry dead-lettered");
                self.dead_letter(&entry.entry_id, &topic, &payload, &reason)?;
                self.ack(&entry.entry_id)
            }
            Routing::Deliver { topic, payload, envelope } => match self.mode {
                AckMode::OnSettle => {
                    // in_flight never exceeds the queue capacity, so this cannot block.
                    if self.tx.send(envelope).is_err() {
                        self.closed = true;
                        return Ok(());
                    }
                    self.in_flight.push_back(InFlight {
                        entry_id: entry.entry_id,
                        topic,
                        payload,
                    });
                    Ok(())
                }
                AckMode::OnDelivery => {
                    match self.tx.try_send(envelope) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!(pattern = %self.filter, topic = %topic, "subscriber queue full; message dropped");
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            self.closed = true;
                            return Ok(());
                        }
                    }
                    self.ack(&entry.entry_id)
                }
            },
        }
    }

    fn ack(&mut self, entry_id: &str) -> Result<(), RedisBusError> {
        let _: i64 = self.conn.xack(&self.stream_key, &self.group, &[entry_id])?;
        Ok(())
    }

    fn dead_letter(
        &mut self,
        entry_id: &str,
        topic: &str,
        payload: &str,
        reason: &str,
    ) -> Result<(), RedisBusError> {
        let failed_at = Utc::now().to_rfc3339();
        let _: String = self.conn.xadd(
            &self.dlq_key,
            "*",
            &[
                ("original_entry_id", entry_id),
                ("group", self.group.as_str()),
                ("topic", topic),
                ("reason", reason),
                ("failed_at", failed_at.as_str()),
                ("payload", payload),
            ],
        )?;
        error!(entry_id, group = %self.group, topic, reason, "stream entry sent to dead-letter queue");
        Ok(())
    }
}
