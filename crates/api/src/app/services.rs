use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

use bookstore_core::BookId;
use bookstore_events::{EventBus, InMemoryEventBus, Subscription, TopicPattern};
use bookstore_infra::{
    AllocationEngine, BookCacheProjection, BookstoreConfig, CachedBookInfo, DomainEnvelope,
    EventPublisher, InMemoryInventoryStore, InMemoryOrderStore, InMemoryReadModelStore,
    OrderService, StockSource, StockSourceKind, SubscriptionWorker, Warehouse, WorkerError,
    WorkerHandle, workers::WorkerStats,
};

#[cfg(feature = "redis")]
use bookstore_infra::RedisTransport;
#[cfg(feature = "redis")]
use bookstore_infra::event_bus::{RedisPubSubEventBus, RedisStreamsEventBus};

/// Topic pattern feeding the book cache (book, stock and order events).
const CACHE_TOPICS: &str = "#";

#[derive(Debug, Error)]
#[error("{0}")]
pub struct AppBusError(String);

/// Transport selected at startup.
#[derive(Debug, Clone)]
pub enum AppBus {
    InMemory(Arc<InMemoryEventBus<DomainEnvelope>>),
    #[cfg(feature = "redis")]
    RedisStreams(RedisStreamsEventBus),
    #[cfg(feature = "redis")]
    RedisPubSub(RedisPubSubEventBus),
}

impl EventBus<DomainEnvelope> for AppBus {
    type Error = AppBusError;

    fn publish(&self, topic: &str, message: DomainEnvelope) -> Result<(), Self::Error> {
        match self {
            AppBus::InMemory(bus) => bus.publish(topic, message).map_err(|e| AppBusError(e.to_string())),
            #[cfg(feature = "redis")]
            AppBus::RedisStreams(bus) => bus.publish(topic, message).map_err(|e| AppBusError(e.to_string())),
            #[cfg(feature = "redis")]
            AppBus::RedisPubSub(bus) => bus.publish(topic, message).map_err(|e| AppBusError(e.to_string())),
        }
    }

    fn subscribe(&self, pattern: &TopicPattern) -> Result<Subscription<DomainEnvelope>, Self::Error> {
        match self {
            AppBus::InMemory(bus) => bus.subscribe(pattern).map_err(|e| AppBusError(e.to_string())),
            #[cfg(feature = "redis")]
            AppBus::RedisStreams(bus) => bus.subscribe(pattern).map_err(|e| AppBusError(e.to_string())),
            #[cfg(feature = "redis")]
            AppBus::RedisPubSub(bus) => bus.subscribe(pattern).map_err(|e| AppBusError(e.to_string())),
        }
    }

    fn subscribe_durable(
        &self,
        name: &str,
        pattern: &TopicPattern,
    ) -> Result<Subscription<DomainEnvelope>, Self::Error> {
        match self {
            AppBus::InMemory(bus) => bus
                .subscribe_durable(name, pattern)
                .map_err(|e| AppBusError(e.to_string())),
            #[cfg(feature = "redis")]
            AppBus::RedisStreams(bus) => bus
                .subscribe_durable(name, pattern)
                .map_err(|e| AppBusError(e.to_string())),
            #[cfg(feature = "redis")]
            AppBus::RedisPubSub(bus) => bus
                .subscribe_durable(name, pattern)
                .map_err(|e| AppBusError(e.to_string())),
        }
    }
}

pub type Ledger = Warehouse<Arc<InMemoryInventoryStore>, AppBus>;
pub type BookCache = BookCacheProjection<Arc<InMemoryReadModelStore<BookId, CachedBookInfo>>>;
pub type Orders = OrderService<
    Arc<InMemoryOrderStore>,
    AllocationEngine<Arc<InMemoryInventoryStore>, AppBus>,
    Arc<dyn StockSource>,
    AppBus,
>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid topic pattern: {0}")]
    Topic(#[from] bookstore_events::TopicPatternError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] bookstore_infra::event_bus::RedisBusError),
}

/// Everything the HTTP handlers need, wired once at startup.
pub struct AppServices {
    pub stock_source: StockSourceKind,
    pub warehouse: Arc<Ledger>,
    pub orders: Arc<Orders>,
    pub cache: Arc<BookCache>,
    pub publisher: EventPublisher<AppBus>,
    cache_worker: Mutex<Option<WorkerHandle>>,
}

impl AppServices {
    pub fn cache_worker_stats(&self) -> Option<WorkerStats> {
        self.cache_worker
            .lock()
            .ok()
            .and_then(|w| w.as_ref().map(WorkerHandle::stats))
    }

    /// Stop background workers. Later calls are no-ops.
    pub fn shutdown(&self) {
        let worker = self.cache_worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            worker.shutdown();
            info!("book cache worker stopped");
        }
    }
}

fn build_bus(config: &BookstoreConfig) -> Result<AppBus, StartupError> {
    #[cfg(feature = "redis")]
    {
        if let Some(url) = &config.redis_url {
            let capacity = config.subscriber_queue_capacity;
            let bus = match config.redis_transport {
                RedisTransport::Streams => {
                    info!("using redis streams event bus");
                    AppBus::RedisStreams(
                        RedisStreamsEventBus::with_capacity(url, capacity)?.with_timeout(config.store_timeout),
                    )
                }
                RedisTransport::PubSub => {
                    info!("using redis pub/sub event bus");
                    AppBus::RedisPubSub(
                        RedisPubSubEventBus::with_capacity(url, capacity)?.with_timeout(config.store_timeout),
                    )
                }
            };
            return Ok(bus);
        }
    }

    Ok(AppBus::InMemory(Arc::new(InMemoryEventBus::with_capacity(
        config.subscriber_queue_capacity,
    ))))
}

pub fn build_services(config: &BookstoreConfig) -> Result<AppServices, StartupError> {
    let bus = build_bus(config)?;

    let inventory = Arc::new(InMemoryInventoryStore::with_timeout(config.store_timeout));
    let warehouse = Arc::new(Warehouse::new(inventory, bus.clone()));

    let cache: Arc<BookCache> = Arc::new(BookCacheProjection::new(Arc::new(InMemoryReadModelStore::new())));
    let cache_worker = SubscriptionWorker::spawn_projection(
        "book-cache",
        &bus,
        &TopicPattern::parse(CACHE_TOPICS)?,
        config.handler_max_attempts,
        cache.clone(),
    )?;

    let stock: Arc<dyn StockSource> = match config.stock_source {
        StockSourceKind::Ledger => warehouse.clone(),
        StockSourceKind::Cache => cache.clone(),
    };

    let orders = OrderService::new(
        Arc::new(InMemoryOrderStore::new()),
        AllocationEngine::new(warehouse.clone()),
        stock,
        bus.clone(),
    );

    info!(stock_source = ?config.stock_source, "services wired");
    Ok(AppServices {
        stock_source: config.stock_source,
        warehouse,
        orders: Arc::new(orders),
        cache,
        publisher: EventPublisher::new(bus),
        cache_worker: Mutex::new(Some(cache_worker)),
    })
}
