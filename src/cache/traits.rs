//! Core traits and types for the caching system.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Key-value store with per-entry expiry, used as a lookaside cache.
///
/// Adapters report failures as `CacheUnavailable`; the layer above decides
/// whether that matters (it never does for reads).
#[async_trait]
pub trait CacheAdapter: Send + Sync {
  /// Fetch the payload stored under `key`, `None` when absent or expired.
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

  /// Store `value` under `key`, replacing any previous entry.
  async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

  /// Remove every entry whose key starts with `prefix`; returns how many went.
  async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;

  /// Backend name for logs.
  fn name(&self) -> &'static str;
}

/// Result from a cache operation, including data and where it came from.
#[derive(Debug, Clone)]
pub struct Cached<T> {
  pub data: T,
  pub source: CacheSource,
}

impl<T> Cached<T> {
  pub fn from_store(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Store,
    }
  }

  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
    }
  }

  pub fn into_inner(self) -> T {
    self.data
  }
}

/// Indicates where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Computed by the store on a miss
  Store,
  /// Served from a live cache entry
  Cache,
}
