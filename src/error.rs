//! Error taxonomy shared by the store, the engines and the directory facade.
//!
//! Cache adapters report `CacheUnavailable`, but the cache layer and the
//! invalidation coordinator swallow it; callers of the directory only ever see
//! the other variants.

use std::fmt::Display;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DirectoryError>;

#[derive(Debug, Error)]
pub enum DirectoryError {
  /// Unknown filter, sort or metric name, or paging input out of range.
  #[error("invalid query: {0}")]
  InvalidQuery(String),

  /// Mutation payload rejected before the store is touched.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("profile {0} not found")]
  NotFound(i64),

  /// Connection, pool or statement failure in the relational store.
  #[error("store unavailable: {0}")]
  StoreUnavailable(String),

  #[error("cache unavailable: {0}")]
  CacheUnavailable(String),

  #[error("serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("export failed: {0}")]
  Export(#[from] std::io::Error),
}

impl DirectoryError {
  pub(crate) fn store(context: &str, err: impl Display) -> Self {
    Self::StoreUnavailable(format!("{}: {}", context, err))
  }

  pub(crate) fn cache(context: &str, err: impl Display) -> Self {
    Self::CacheUnavailable(format!("{}: {}", context, err))
  }

  /// True for errors caused by the caller's input rather than infrastructure.
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      Self::InvalidQuery(_) | Self::Validation(_) | Self::NotFound(_)
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_client_errors() {
    assert!(DirectoryError::InvalidQuery("sort_by".into()).is_client_error());
    assert!(DirectoryError::NotFound(7).is_client_error());
    assert!(!DirectoryError::store("pool", "closed").is_client_error());
    assert!(!DirectoryError::cache("redis", "refused").is_client_error());
  }

  #[test]
  fn test_store_error_message() {
    let err = DirectoryError::store("failed to prepare query", "no such table");
    assert_eq!(
      err.to_string(),
      "store unavailable: failed to prepare query: no such table"
    );
  }
}
