//! Background workers: one thread per bus subscription.

pub mod subscription_worker;

pub use subscription_worker::{
    DEFAULT_MAX_ATTEMPTS, SubscriptionWorker, WorkerError, WorkerHandle, WorkerStats,
};
