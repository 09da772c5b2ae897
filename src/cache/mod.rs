//! Lookaside caching for directory reads.
//!
//! This module provides:
//! - A `CacheAdapter` trait with in-memory, SQLite, Redis and no-op backends
//! - Stable, order-independent keys grouped into namespaces
//! - A `CacheLayer` that serves hits and populates misses, degrading to the
//!   store whenever the cache misbehaves
//! - An `InvalidationCoordinator` that purges dependent namespaces after writes

pub mod invalidation;
pub mod keys;
pub mod layer;
pub mod memory;
pub mod redis_cache;
pub mod storage;
mod traits;

/// Local backends reclaim expired entries once per this many writes.
const SWEEP_EVERY: u64 = 256;

pub use invalidation::{EntityKind, InvalidationCoordinator, InvalidationReport};
pub use keys::{derive_key, KeyParts, Namespace, QueryKey};
pub use layer::{CacheLayer, TtlPolicy};
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;
pub use storage::{NoopCache, SqliteCache};
pub use traits::{CacheAdapter, CacheSource, Cached};
