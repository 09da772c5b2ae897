//! Cache invalidation after mutations.
//!
//! Purges are namespace-wide: a profile write makes every listing, stats,
//! analytics and options entry suspect, so all of them go.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use super::keys::Namespace;
use super::traits::CacheAdapter;

/// Kind of entity a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
  Profile,
}

impl EntityKind {
  /// Namespaces whose entries may embed this entity.
  pub fn dependent_namespaces(self) -> &'static [Namespace] {
    match self {
      Self::Profile => &Namespace::ALL,
    }
  }
}

/// Outcome of one invalidation round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
  pub deleted: u64,
  /// Namespaces whose purge failed; their entries expire by TTL instead.
  pub failed: Vec<Namespace>,
}

#[derive(Clone)]
pub struct InvalidationCoordinator {
  cache: Arc<dyn CacheAdapter>,
}

impl InvalidationCoordinator {
  pub fn new(cache: Arc<dyn CacheAdapter>) -> Self {
    Self { cache }
  }

  /// Purge every namespace that depends on `kind`.
  ///
  /// Awaited after a committed mutation and before the caller answers, so the
  /// next read in this process sees the write. Never fails: a purge error is
  /// logged and reported, not raised.
  pub async fn on_mutation(&self, kind: EntityKind) -> InvalidationReport {
    let namespaces = kind.dependent_namespaces();
    let purges = namespaces.iter().map(|ns| {
      let prefix = ns.prefix();
      async move { (*ns, self.cache.delete_by_prefix(&prefix).await) }
    });

    let mut report = InvalidationReport::default();
    for (namespace, outcome) in join_all(purges).await {
      match outcome {
        Ok(n) => report.deleted += n,
        Err(e) => {
          warn!(%namespace, backend = self.cache.name(), error = %e, "cache purge failed");
          report.failed.push(namespace);
        }
      }
    }

    info!(
      entity = ?kind,
      deleted = report.deleted,
      failed = report.failed.len(),
      "invalidated cache"
    );
    report
  }
}
