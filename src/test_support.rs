//! Fixtures shared by unit tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::cache::memory::MemoryCache;
use crate::cache::CacheAdapter;
use crate::db::SqliteStore;
use crate::directory::repository::ProfileRepository;
use crate::directory::types::ProfileData;
use crate::error::{DirectoryError, Result};

/// A fresh store in a temporary directory; keep the `TempDir` alive.
pub async fn temp_store() -> (TempDir, SqliteStore) {
  let dir = TempDir::new().unwrap();
  let store = SqliteStore::open(&dir.path().join("profiles.db"), 4)
    .await
    .unwrap();
  (dir, store)
}

/// Insert `rows` in order, so their ids are `1..=rows.len()` on a fresh store.
pub async fn insert_profiles(store: &SqliteStore, rows: &[ProfileData]) {
  let repo = ProfileRepository::new(store.clone());
  for row in rows {
    repo.insert(row).await.unwrap();
  }
}

pub fn named(name: &str) -> ProfileData {
  ProfileData {
    name: Some(name.to_string()),
    ..Default::default()
  }
}

/// In-memory cache that also records every write and purge.
#[derive(Clone, Default)]
pub struct RecordingCache {
  inner: MemoryCache,
  sets: Arc<Mutex<Vec<(String, Duration)>>>,
  gets: Arc<Mutex<Vec<String>>>,
  purges: Arc<Mutex<Vec<String>>>,
}

impl RecordingCache {
  pub fn sets(&self) -> Vec<(String, Duration)> {
    self.sets.lock().unwrap().clone()
  }

  pub fn gets(&self) -> Vec<String> {
    self.gets.lock().unwrap().clone()
  }

  pub fn purged_prefixes(&self) -> Vec<String> {
    self.purges.lock().unwrap().clone()
  }

  pub fn live_entries(&self) -> usize {
    self.inner.live_entries()
  }
}

#[async_trait]
impl CacheAdapter for RecordingCache {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    self.gets.lock().unwrap().push(key.to_string());
    self.inner.get(key).await
  }

  async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
    self.sets.lock().unwrap().push((key.to_string(), ttl));
    self.inner.set_with_ttl(key, value, ttl).await
  }

  async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
    self.purges.lock().unwrap().push(prefix.to_string());
    self.inner.delete_by_prefix(prefix).await
  }

  fn name(&self) -> &'static str {
    "recording"
  }
}

/// Cache whose every operation fails, as an unreachable server would.
#[derive(Clone, Copy, Default)]
pub struct FailingCache;

#[async_trait]
impl CacheAdapter for FailingCache {
  async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
    Err(DirectoryError::CacheUnavailable("connection refused".into()))
  }

  async fn set_with_ttl(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
    Err(DirectoryError::CacheUnavailable("connection refused".into()))
  }

  async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64> {
    Err(DirectoryError::CacheUnavailable("connection refused".into()))
  }

  fn name(&self) -> &'static str {
    "failing"
  }
}
