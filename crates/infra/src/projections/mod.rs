//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: can be reconstructed by replaying events
//! - **Local**: each consuming service owns its copy
//! - **Delivery tolerant**: duplicates and reordering never produce invalid state

pub mod book_cache;

pub use book_cache::{BookCacheProjection, CachedBookInfo};
