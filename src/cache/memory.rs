//! In-process cache backend.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::traits::CacheAdapter;
use super::SWEEP_EVERY;
use crate::error::Result;

struct Entry {
  value: Vec<u8>,
  expires_at: Instant,
}

/// Concurrent map with lazy expiry. Dead entries are dropped when read, when a
/// prefix purge walks past them, and by a full sweep every `sweep_every` writes.
#[derive(Clone)]
pub struct MemoryCache {
  entries: Arc<DashMap<String, Entry>>,
  writes: Arc<AtomicU64>,
  sweep_every: u64,
}

impl Default for MemoryCache {
  fn default() -> Self {
    Self {
      entries: Arc::new(DashMap::new()),
      writes: Arc::new(AtomicU64::new(0)),
      sweep_every: SWEEP_EVERY,
    }
  }
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Remove every expired entry; returns how many went.
  fn sweep(&self) -> usize {
    let now = Instant::now();
    let before = self.entries.len();
    self.entries.retain(|_, entry| entry.expires_at > now);
    before.saturating_sub(self.entries.len())
  }

  /// Entries that have not expired yet.
  pub fn live_entries(&self) -> usize {
    let now = Instant::now();
    self.entries.iter().filter(|e| e.expires_at > now).count()
  }
}

#[async_trait]
impl CacheAdapter for MemoryCache {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let now = Instant::now();
    if let Some(entry) = self.entries.get(key) {
      if entry.expires_at > now {
        return Ok(Some(entry.value.clone()));
      }
    }
    // Expired or absent; the guard above is released before removing.
    self.entries.remove_if(key, |_, e| e.expires_at <= now);
    Ok(None)
  }

  async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
    self.entries.insert(
      key.to_string(),
      Entry {
        value,
        expires_at: Instant::now() + ttl,
      },
    );

    let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
    if writes % self.sweep_every.max(1) == 0 {
      let swept = self.sweep();
      debug!(swept, live = self.live_entries(), backend = "memory", "swept expired cache entries");
    }
    Ok(())
  }

  async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
    let now = Instant::now();
    let mut deleted = 0;
    self.entries.retain(|key, entry| {
      if key.starts_with(prefix) {
        if entry.expires_at > now {
          deleted += 1;
        }
        false
      } else {
        true
      }
    });
    Ok(deleted)
  }

  fn name(&self) -> &'static str {
    "memory"
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_get_set_roundtrip() {
    let cache = MemoryCache::new();
    assert_eq!(cache.get("stats:a").await.unwrap(), None);

    cache
      .set_with_ttl("stats:a", b"42".to_vec(), Duration::from_secs(60))
      .await
      .unwrap();
    assert_eq!(cache.get("stats:a").await.unwrap(), Some(b"42".to_vec()));
  }

  #[tokio::test]
  async fn test_expired_entries_miss() {
    let cache = MemoryCache::new();
    cache
      .set_with_ttl("stats:a", b"1".to_vec(), Duration::ZERO)
      .await
      .unwrap();
    assert_eq!(cache.get("stats:a").await.unwrap(), None);
    assert!(cache.entries.is_empty());
  }

  #[tokio::test]
  async fn test_writes_sweep_expired_entries() {
    let cache = MemoryCache {
      sweep_every: 3,
      ..MemoryCache::new()
    };
    for key in ["listing:a", "listing:b"] {
      cache.set_with_ttl(key, vec![1], Duration::ZERO).await.unwrap();
    }
    assert_eq!(cache.entries.len(), 2);

    // Third write triggers the sweep; the expired keys were never read.
    cache
      .set_with_ttl("stats:a", vec![2], Duration::from_secs(60))
      .await
      .unwrap();
    assert_eq!(cache.entries.len(), 1);
    assert!(cache.entries.contains_key("stats:a"));
  }

  #[tokio::test]
  async fn test_delete_by_prefix_only_touches_namespace() {
    let cache = MemoryCache::new();
    let ttl = Duration::from_secs(60);
    for key in ["stats:1", "stats:2", "analytics:1", "statsx:1"] {
      cache.set_with_ttl(key, vec![1], ttl).await.unwrap();
    }

    assert_eq!(cache.delete_by_prefix("stats:").await.unwrap(), 2);
    assert_eq!(cache.get("stats:1").await.unwrap(), None);
    assert!(cache.get("analytics:1").await.unwrap().is_some());
    assert!(cache.get("statsx:1").await.unwrap().is_some());
    assert_eq!(cache.live_entries(), 2);
  }
}
