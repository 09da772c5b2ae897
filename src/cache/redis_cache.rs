//! Redis cache backend, shared by every replica.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};

use super::traits::CacheAdapter;
use crate::error::{DirectoryError, Result};

/// Prefix applied to every key this process writes.
pub const DEFAULT_KEY_PREFIX: &str = "profiledir:";

const SCAN_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisCache {
  pool: Pool,
  key_prefix: String,
}

impl RedisCache {
  /// Build a pool for `url` and check the server answers.
  pub async fn connect(url: &str) -> Result<Self> {
    let pool = PoolConfig::from_url(url)
      .create_pool(Some(Runtime::Tokio1))
      .map_err(|e| DirectoryError::cache("failed to create redis pool", e))?;

    let cache = Self::from_pool(pool);
    let mut conn = cache.conn().await?;
    let _: String = redis::cmd("PING")
      .query_async(&mut conn)
      .await
      .map_err(|e| DirectoryError::cache("redis health check failed", e))?;

    info!("connected to redis cache");
    Ok(cache)
  }

  pub fn from_pool(pool: Pool) -> Self {
    Self {
      pool,
      key_prefix: DEFAULT_KEY_PREFIX.to_string(),
    }
  }

  pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.key_prefix = prefix.into();
    self
  }

  fn full_key(&self, key: &str) -> String {
    format!("{}{}", self.key_prefix, key)
  }

  async fn conn(&self) -> Result<deadpool_redis::Connection> {
    self
      .pool
      .get()
      .await
      .map_err(|e| DirectoryError::cache("failed to get redis connection", e))
  }
}

#[async_trait]
impl CacheAdapter for RedisCache {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let mut conn = self.conn().await?;
    conn
      .get::<_, Option<Vec<u8>>>(self.full_key(key))
      .await
      .map_err(|e| DirectoryError::cache("redis GET failed", e))
  }

  async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
    let mut conn = self.conn().await?;
    // SETEX rejects a zero expiry
    let seconds = ttl.as_secs().max(1);
    conn
      .set_ex::<_, _, ()>(self.full_key(key), value, seconds)
      .await
      .map_err(|e| DirectoryError::cache("redis SETEX failed", e))
  }

  /// Walks the keyspace with `SCAN` rather than `KEYS` so a purge never
  /// blocks the server on a large cache.
  async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
    let mut conn = self.conn().await?;
    let pattern = format!("{}*", escape_glob(&self.full_key(prefix)));

    let mut cursor: u64 = 0;
    let mut deleted: u64 = 0;
    loop {
      let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
        .arg(cursor)
        .arg("MATCH")
        .arg(&pattern)
        .arg("COUNT")
        .arg(SCAN_BATCH)
        .query_async(&mut conn)
        .await
        .map_err(|e| DirectoryError::cache("redis SCAN failed", e))?;

      if !keys.is_empty() {
        deleted += conn
          .del::<_, u64>(&keys)
          .await
          .map_err(|e| DirectoryError::cache("redis DEL failed", e))?;
      }

      if next == 0 {
        break;
      }
      cursor = next;
    }

    debug!(prefix, deleted, "purged redis keys");
    Ok(deleted)
  }

  fn name(&self) -> &'static str {
    "redis"
  }
}

/// Escape the characters `SCAN MATCH` treats as glob syntax.
fn escape_glob(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if matches!(c, '*' | '?' | '[' | ']' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}
