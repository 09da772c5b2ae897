//! Cache layer that wraps store reads with lookaside caching.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::keys::{derive_key, KeyParts, Namespace, QueryKey};
use super::traits::{CacheAdapter, Cached};
use crate::error::Result;

/// Time-to-live per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
  pub listing: Duration,
  pub stats: Duration,
  pub analytics: Duration,
  pub options: Duration,
}

impl Default for TtlPolicy {
  fn default() -> Self {
    Self {
      listing: Duration::from_secs(300),
      stats: Duration::from_secs(300),
      analytics: Duration::from_secs(300),
      options: Duration::from_secs(600),
    }
  }
}

impl TtlPolicy {
  pub fn for_namespace(&self, namespace: Namespace) -> Duration {
    match namespace {
      Namespace::Listing => self.listing,
      Namespace::Stats => self.stats,
      Namespace::Analytics => self.analytics,
      Namespace::Options => self.options,
    }
  }
}

/// Cache layer that manages caching logic and store fetching.
///
/// The cache is an accelerator only. A failed lookup, a failed write or an
/// entry that no longer decodes all fall back to the store, and the request
/// succeeds as if the cache were cold. Two concurrent misses on one key both
/// run the fetcher; the later write wins.
#[derive(Clone)]
pub struct CacheLayer {
  cache: Arc<dyn CacheAdapter>,
  ttl: TtlPolicy,
}

impl CacheLayer {
  pub fn new(cache: Arc<dyn CacheAdapter>) -> Self {
    Self {
      cache,
      ttl: TtlPolicy::default(),
    }
  }

  pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
    self.ttl = ttl;
    self
  }

  /// Fetch a typed query with cache-first strategy.
  pub async fn fetch<T, K, F, Fut>(&self, query: &K, fetcher: F) -> Result<Cached<T>>
  where
    T: Serialize + DeserializeOwned,
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let namespace = query.namespace();
    let key = query.cache_key();
    self
      .lookaside(namespace, &key, || query.description(), fetcher)
      .await
  }

  /// Fetch by raw namespace and parameters.
  pub async fn cached_fetch<T, F, Fut>(
    &self,
    namespace: Namespace,
    parts: &KeyParts,
    fetcher: F,
  ) -> Result<Cached<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let key = derive_key(namespace, parts);
    self
      .lookaside(namespace, &key, || namespace.to_string(), fetcher)
      .await
  }

  async fn lookaside<T, D, F, Fut>(
    &self,
    namespace: Namespace,
    key: &str,
    describe: D,
    fetcher: F,
  ) -> Result<Cached<T>>
  where
    T: Serialize + DeserializeOwned,
    D: Fn() -> String,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    match self.cache.get(key).await {
      Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
        Ok(data) => {
          debug!(key, query = %describe(), "cache hit");
          return Ok(Cached::from_cache(data));
        }
        Err(e) => warn!(key, error = %e, "discarding undecodable cache entry"),
      },
      Ok(None) => debug!(key, query = %describe(), "cache miss"),
      Err(e) => warn!(key, backend = self.cache.name(), error = %e, "cache read failed"),
    }

    // Store errors propagate; nothing is cached for a failed fetch.
    let data = fetcher().await?;

    match serde_json::to_vec(&data) {
      Ok(bytes) => {
        let ttl = self.ttl.for_namespace(namespace);
        if let Err(e) = self.cache.set_with_ttl(key, bytes, ttl).await {
          warn!(key, backend = self.cache.name(), error = %e, "cache write failed");
        }
      }
      Err(e) => warn!(key, error = %e, "failed to encode result for cache"),
    }

    Ok(Cached::from_store(data))
  }
}
