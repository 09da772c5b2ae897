//! SQLite and no-op cache backends.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::traits::CacheAdapter;
use super::SWEEP_EVERY;
use crate::error::{DirectoryError, Result};

/// Backend that doesn't cache anything.
/// Used when caching is disabled: every read misses, every write is dropped.
#[derive(Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl CacheAdapter for NoopCache {
  async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
    Ok(None) // Always miss
  }

  async fn set_with_ttl(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
    Ok(()) // Discard
  }

  async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64> {
    Ok(0)
  }

  fn name(&self) -> &'static str {
    "none"
  }
}

/// SQLite-based cache, shared by processes on one host.
///
/// Expired rows are skipped on read and deleted on open and every
/// `sweep_every` writes.
#[derive(Clone)]
pub struct SqliteCache {
  conn: Arc<Mutex<Connection>>,
  writes: Arc<AtomicU64>,
  sweep_every: u64,
}

/// Schema for the cache table. Expiry is epoch milliseconds.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_expiry ON cache_entries(expires_at);
"#;

impl SqliteCache {
  /// Open (or create) a cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .map_err(|e| DirectoryError::cache("failed to create cache directory", e))?;
      }
    }

    let conn = Connection::open(path).map_err(|e| {
      DirectoryError::cache(&format!("failed to open cache database at {}", path.display()), e)
    })?;
    conn
      .busy_timeout(Duration::from_secs(5))
      .map_err(|e| DirectoryError::cache("failed to set busy timeout", e))?;
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| DirectoryError::cache("failed to run cache migrations", e))?;
    let swept = delete_expired(&conn)?;
    debug!(path = %path.display(), swept, "opened sqlite cache");

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
      writes: Arc::new(AtomicU64::new(0)),
      sweep_every: SWEEP_EVERY,
    })
  }

  /// Get the default cache path.
  pub fn default_path() -> Option<PathBuf> {
    dirs::cache_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
      .map(|dir| dir.join("profiledir").join("cache.db"))
  }

  async fn run<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let conn = conn
        .lock()
        .map_err(|e| DirectoryError::cache("lock poisoned", e))?;
      f(&conn)
    })
    .await
    .map_err(|e| DirectoryError::cache("cache task failed", e))?
  }
}

#[async_trait]
impl CacheAdapter for SqliteCache {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let key = key.to_string();
    self
      .run(move |conn| {
        conn
          .query_row(
            "SELECT data FROM cache_entries WHERE cache_key = ? AND expires_at > ?",
            params![key, now_millis()],
            |row| row.get(0),
          )
          .optional()
          .map_err(|e| DirectoryError::cache("failed to read cache entry", e))
      })
      .await
  }

  async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
    let key = key.to_string();
    let expires_at = now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
    let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
    let sweep = writes % self.sweep_every.max(1) == 0;
    self
      .run(move |conn| {
        conn
          .execute(
            "INSERT OR REPLACE INTO cache_entries (cache_key, data, expires_at) VALUES (?, ?, ?)",
            params![key, value, expires_at],
          )
          .map_err(|e| DirectoryError::cache("failed to store cache entry", e))?;
        if sweep {
          let swept = delete_expired(conn)?;
          debug!(swept, backend = "sqlite", "swept expired cache entries");
        }
        Ok(())
      })
      .await
  }

  async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
    let prefix = prefix.to_string();
    self
      .run(move |conn| {
        // substr instead of LIKE so '_' and '%' in keys stay literal
        conn
          .execute(
            "DELETE FROM cache_entries WHERE substr(cache_key, 1, ?2) = ?1",
            params![prefix, prefix.chars().count() as i64],
          )
          .map(|n| n as u64)
          .map_err(|e| DirectoryError::cache("failed to delete cache entries", e))
      })
      .await
  }

  fn name(&self) -> &'static str {
    "sqlite"
  }
}

/// Drop expired rows; returns how many were removed.
fn delete_expired(conn: &Connection) -> Result<u64> {
  conn
    .execute(
      "DELETE FROM cache_entries WHERE expires_at <= ?",
      params![now_millis()],
    )
    .map(|n| n as u64)
    .map_err(|e| DirectoryError::cache("failed to purge expired entries", e))
}

fn now_millis() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    .unwrap_or(0)
}
