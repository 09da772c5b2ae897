//! Relational store adapter.
//!
//! SQLite connections are pooled by deadpool. Every statement runs through
//! `interact`, which moves the closure onto the blocking thread pool while the
//! pooled object stays checked out.

pub mod schema;

use deadpool_sqlite::{Config as PoolSettings, Pool, PoolConfig, Runtime, Timeouts};
use rusqlite::types::{FromSql, Value};
use rusqlite::{params_from_iter, Connection, Row, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{DirectoryError, Result};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pooled handle to the profile store.
#[derive(Clone)]
pub struct SqliteStore {
  pool: Pool,
}

impl SqliteStore {
  /// Open (or create) the store at `path` with up to `pool_size` connections.
  pub async fn open(path: &Path, pool_size: usize) -> Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .map_err(|e| DirectoryError::store("failed to create store directory", e))?;
      }
    }

    let pool_size = pool_size.max(1);
    let mut settings = PoolSettings::new(path);
    settings.pool = Some(PoolConfig {
      max_size: pool_size,
      timeouts: Timeouts {
        wait: Some(ACQUIRE_TIMEOUT),
        create: Some(ACQUIRE_TIMEOUT),
        recycle: None,
      },
      ..PoolConfig::default()
    });
    let pool = settings
      .create_pool(Runtime::Tokio1)
      .map_err(|e| DirectoryError::store("failed to create connection pool", e))?;
    let store = Self { pool };

    store
      .with_connection(|conn| {
        conn
          .query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
          .map_err(|e| DirectoryError::store("failed to enable WAL", e))?;
        conn
          .execute_batch(schema::SCHEMA)
          .map_err(|e| DirectoryError::store("failed to create schema", e))
      })
      .await?;

    debug!(path = %path.display(), pool_size, "opened profile store");
    Ok(store)
  }

  /// Get the default store path.
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("profiledir").join("profiles.db"))
  }

  /// Run `f` against a pooled connection on the blocking thread pool.
  pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    let conn = self
      .pool
      .get()
      .await
      .map_err(|e| DirectoryError::store("no store connection available", e))?;

    conn
      .interact(move |conn| {
        // Connections are created lazily by the pool, so per-connection
        // settings are applied on checkout.
        conn
          .busy_timeout(BUSY_TIMEOUT)
          .map_err(|e| DirectoryError::store("failed to set busy timeout", e))?;
        f(conn)
      })
      .await
      .map_err(|e| DirectoryError::store("store task failed", e))?
  }

  /// Run `f` inside a transaction; commits on `Ok`, rolls back otherwise.
  pub async fn transaction<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
  {
    self
      .with_connection(move |conn| {
        let tx = conn
          .transaction()
          .map_err(|e| DirectoryError::store("failed to begin transaction", e))?;
        let out = f(&tx)?;
        tx.commit()
          .map_err(|e| DirectoryError::store("failed to commit transaction", e))?;
        Ok(out)
      })
      .await
  }

  /// Execute a parameterized query and map every row.
  pub async fn execute<T, F>(&self, sql: String, params: Vec<Value>, map_row: F) -> Result<Vec<T>>
  where
    T: Send + 'static,
    F: Fn(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
  {
    self
      .with_connection(move |conn| query_rows(conn, &sql, &params, map_row))
      .await
  }

  /// Execute a parameterized query that yields exactly one row.
  pub async fn execute_one<T, F>(&self, sql: String, params: Vec<Value>, map_row: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
  {
    self
      .with_connection(move |conn| {
        conn
          .query_row(&sql, params_from_iter(params.iter()), map_row)
          .map_err(|e| DirectoryError::store("failed to run query", e))
      })
      .await
  }

  /// Execute a parameterized query that yields a single value.
  pub async fn execute_scalar<T>(&self, sql: String, params: Vec<Value>) -> Result<T>
  where
    T: FromSql + Send + 'static,
  {
    self.execute_one(sql, params, |row| row.get(0)).await
  }

  /// Execute a parameterized `INSERT`, returning the new row id.
  pub async fn insert(&self, sql: String, params: Vec<Value>) -> Result<i64> {
    self
      .with_connection(move |conn| {
        conn
          .execute(&sql, params_from_iter(params.iter()))
          .map_err(|e| DirectoryError::store("failed to insert row", e))?;
        Ok(conn.last_insert_rowid())
      })
      .await
  }

  /// Execute a parameterized statement, returning the number of affected rows.
  pub async fn execute_write(&self, sql: String, params: Vec<Value>) -> Result<usize> {
    self
      .with_connection(move |conn| {
        conn
          .execute(&sql, params_from_iter(params.iter()))
          .map_err(|e| DirectoryError::store("failed to execute statement", e))
      })
      .await
  }
}

/// Run a query on an already-acquired connection (or transaction).
pub fn query_rows<T, F>(conn: &Connection, sql: &str, params: &[Value], map_row: F) -> Result<Vec<T>>
where
  F: Fn(&Row<'_>) -> rusqlite::Result<T>,
{
  let mut stmt = conn
    .prepare_cached(sql)
    .map_err(|e| DirectoryError::store("failed to prepare query", e))?;

  let rows = stmt
    .query_map(params_from_iter(params.iter()), |row| map_row(row))
    .map_err(|e| DirectoryError::store("failed to run query", e))?;
  rows
    .collect::<rusqlite::Result<Vec<T>>>()
    .map_err(|e| DirectoryError::store("failed to read row", e))
}
