//! Runtime configuration, read from the environment with defaults.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use bookstore_events::in_memory_bus::DEFAULT_QUEUE_CAPACITY;

use crate::inventory_store::DEFAULT_STORE_TIMEOUT;
use crate::workers::subscription_worker::DEFAULT_MAX_ATTEMPTS;

pub const ENV_BIND_ADDR: &str = "BOOKSTORE_BIND_ADDR";
pub const ENV_STORE_TIMEOUT_MS: &str = "BOOKSTORE_STORE_TIMEOUT_MS";
pub const ENV_SUBSCRIBER_QUEUE: &str = "BOOKSTORE_SUBSCRIBER_QUEUE";
pub const ENV_HANDLER_MAX_ATTEMPTS: &str = "BOOKSTORE_HANDLER_MAX_ATTEMPTS";
pub const ENV_STOCK_SOURCE: &str = "BOOKSTORE_STOCK_SOURCE";
#[cfg(feature = "redis")]
pub const ENV_REDIS_URL: &str = "REDIS_URL";
#[cfg(feature = "redis")]
pub const ENV_REDIS_TRANSPORT: &str = "BOOKSTORE_REDIS_TRANSPORT";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Where the order service reads availability for its creation-time check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockSourceKind {
    /// Authoritative ledger totals.
    Ledger,
    /// Eventually consistent book cache.
    #[default]
    Cache,
}

impl FromStr for StockSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ledger" => Ok(Self::Ledger),
            "cache" => Ok(Self::Cache),
            other => Err(format!("expected `ledger` or `cache`, got `{other}`")),
        }
    }
}

/// Which Redis mechanism carries events when `REDIS_URL` is set.
#[cfg(feature = "redis")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedisTransport {
    /// Streams with consumer groups: durable, at-least-once.
    #[default]
    Streams,
    /// Pub/sub channels: messages published while a subscriber is away are lost.
    PubSub,
}

#[cfg(feature = "redis")]
impl FromStr for RedisTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streams" => Ok(Self::Streams),
            "pubsub" => Ok(Self::PubSub),
            other => Err(format!("expected `streams` or `pubsub`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookstoreConfig {
    pub bind_addr: SocketAddr,
    /// Bound on every inventory store and event bus round-trip.
    pub store_timeout: Duration,
    pub subscriber_queue_capacity: usize,
    pub handler_max_attempts: u32,
    pub stock_source: StockSourceKind,
    #[cfg(feature = "redis")]
    pub redis_url: Option<String>,
    #[cfg(feature = "redis")]
    pub redis_transport: RedisTransport,
}

impl Default for BookstoreConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            subscriber_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            handler_max_attempts: DEFAULT_MAX_ATTEMPTS,
            stock_source: StockSourceKind::default(),
            #[cfg(feature = "redis")]
            redis_url: None,
            #[cfg(feature = "redis")]
            redis_transport: RedisTransport::default(),
        }
    }
}

impl BookstoreConfig {
    /// Load from process environment; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let bind = lookup(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        config.bind_addr = bind
            .parse()
            .map_err(|e| ConfigError::invalid(ENV_BIND_ADDR, &bind, e))?;

        if let Some(raw) = lookup(ENV_STORE_TIMEOUT_MS) {
            let ms: u64 = parse(ENV_STORE_TIMEOUT_MS, &raw)?;
            if ms == 0 {
                return Err(ConfigError::invalid(ENV_STORE_TIMEOUT_MS, &raw, "must be > 0"));
            }
            config.store_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup(ENV_SUBSCRIBER_QUEUE) {
            let capacity: usize = parse(ENV_SUBSCRIBER_QUEUE, &raw)?;
            if capacity == 0 {
                return Err(ConfigError::invalid(ENV_SUBSCRIBER_QUEUE, &raw, "must be > 0"));
            }
            config.subscriber_queue_capacity = capacity;
        }

        if let Some(raw) = lookup(ENV_HANDLER_MAX_ATTEMPTS) {
            let attempts: u32 = parse(ENV_HANDLER_MAX_ATTEMPTS, &raw)?;
            if attempts == 0 {
                return Err(ConfigError::invalid(ENV_HANDLER_MAX_ATTEMPTS, &raw, "must be > 0"));
            }
            config.handler_max_attempts = attempts;
        }

        if let Some(raw) = lookup(ENV_STOCK_SOURCE) {
            config.stock_source = parse(ENV_STOCK_SOURCE, &raw)?;
        }

        #[cfg(feature = "redis")]
        {
            config.redis_url = lookup(ENV_REDIS_URL).filter(|url| !url.trim().is_empty());
            if let Some(raw) = lookup(ENV_REDIS_TRANSPORT) {
                config.redis_transport = parse(ENV_REDIS_TRANSPORT, &raw)?;
            }
        }

        Ok(config)
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_handler_max_attempts(mut self, attempts: u32) -> Self {
        self.handler_max_attempts = attempts.max(1);
        self
    }

    pub fn with_stock_source(mut self, kind: StockSourceKind) -> Self {
        self.stock_source = kind;
        self
    }

    #[cfg(feature = "redis")]
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    #[cfg(feature = "redis")]
    pub fn with_redis_transport(mut self, transport: RedisTransport) -> Self {
        self.redis_transport = transport;
        self
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(var, raw, e.to_string()))
}
