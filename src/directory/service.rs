//! The directory facade: cached reads, validated writes, invalidation.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::analytics::{AnalyticsChart, UNKNOWN_LABEL};
use super::keys::DirectoryQuery;
use super::repository::{ProfileRepository, MAX_BULK_DELETE};
use super::types::{
  Chart, DirectoryStats, FilterOptions, LabelCount, Platform, PlatformStats, Profile, ProfileData,
};
use crate::cache::{
  CacheAdapter, CacheLayer, Cached, EntityKind, InvalidationCoordinator, KeyParts, MemoryCache,
  Namespace, NoopCache, RedisCache, SqliteCache,
};
use crate::config::{CacheBackend, CacheConfig, Config, PaginationConfig};
use crate::db::SqliteStore;
use crate::engine::aggregation::{Aggregator, Bucket, GroupColumn, GroupSpec, Measure, TOTAL_LABEL};
use crate::engine::filters::{ProfileFilters, SortSpec};
use crate::engine::pagination::{Page, PageRequest, Paginator, SortValue};
use crate::error::{DirectoryError, Result};

const TOP_DESIGNATIONS: u32 = 12;

/// A listing request as a client sends it: names are still strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
  pub filters: ProfileFilters,
  pub sort_by: Option<String>,
  pub sort_order: Option<String>,
  pub cursor: i64,
  /// `next_cursor_value` of the previous page, as JSON.
  pub cursor_value: Option<SortValue>,
  pub limit: Option<u32>,
}

impl ListQuery {
  /// Build from query-string style `(name, value)` pairs. Paging keys are
  /// taken here, every other name must be a known filter.
  pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let mut query = Self::default();
    for (name, value) in pairs {
      let value = value.trim();
      match name {
        "sort_by" => query.sort_by = Some(value.to_string()),
        "sort_order" => query.sort_order = Some(value.to_string()),
        "cursor" => query.cursor = parse_number(name, value)?,
        "cursor_value" => {
          query.cursor_value = Some(serde_json::from_str(value).map_err(|_| {
            DirectoryError::InvalidQuery(format!(
              "cursor_value must be null, a number or a quoted string, got '{}'",
              value
            ))
          })?)
        }
        "limit" => query.limit = Some(parse_number(name, value)?),
        _ => query.filters.set(name, value)?,
      }
    }
    Ok(query)
  }

  /// Resolve names and bounds into a page request, before any I/O.
  pub fn validate(&self, pagination: &PaginationConfig) -> Result<PageRequest> {
    let sort = SortSpec::parse(
      self.sort_by.as_deref().unwrap_or("id"),
      self.sort_order.as_deref().unwrap_or("asc"),
    )?;
    let request = PageRequest::new(
      self.filters.normalized(),
      sort,
      self.cursor,
      self.limit.unwrap_or(pagination.default_limit),
    )
    .with_cursor_value(self.cursor_value.clone());
    request.validate(pagination.max_limit)?;
    Ok(request)
  }
}

/// Profile directory service.
///
/// Cloning is cheap; clones share the store pool and the cache.
#[derive(Clone)]
pub struct ProfileDirectory {
  repo: ProfileRepository,
  paginator: Paginator,
  aggregator: Aggregator,
  cache: CacheLayer,
  invalidator: InvalidationCoordinator,
  pagination: PaginationConfig,
}

impl ProfileDirectory {
  pub fn new(store: SqliteStore, cache: Arc<dyn CacheAdapter>, config: &Config) -> Self {
    Self {
      repo: ProfileRepository::new(store.clone()),
      paginator: Paginator::new(store.clone()),
      aggregator: Aggregator::new(store),
      cache: CacheLayer::new(Arc::clone(&cache)).with_ttl(config.ttl.policy()),
      invalidator: InvalidationCoordinator::new(cache),
      pagination: config.pagination.clone(),
    }
  }

  /// Open the store and the configured cache backend.
  pub async fn open(config: &Config) -> Result<Self> {
    let path = config
      .store
      .path
      .clone()
      .or_else(SqliteStore::default_path)
      .ok_or_else(|| {
        DirectoryError::StoreUnavailable(
          "could not determine data directory; set store.path or DATABASE_PATH".into(),
        )
      })?;
    let store = SqliteStore::open(&path, config.store.pool_size).await?;
    let cache = connect_cache(&config.cache).await;
    info!(store = %path.display(), cache = cache.name(), "directory opened");
    Ok(Self::new(store, cache, config))
  }

  pub async fn list_profiles(&self, query: &ListQuery) -> Result<Page<Profile>> {
    let request = query.validate(&self.pagination)?;
    let key = DirectoryQuery::Listing(request.clone());
    let paginator = &self.paginator;
    self
      .cache
      .fetch(&key, || async move { paginator.fetch_page(&request).await })
      .await
      .map(Cached::into_inner)
  }

  /// Read one profile straight from the store.
  pub async fn get_profile(&self, id: i64) -> Result<Profile> {
    check_id(id)?;
    self.repo.get(id).await
  }

  pub async fn stats(&self) -> Result<DirectoryStats> {
    let aggregator = &self.aggregator;
    self
      .cache
      .fetch(&DirectoryQuery::Stats, || async move {
        let all = ProfileFilters::default();
        let totals = aggregator.compute_stats(&GroupSpec::all(), &all).await?;
        let by_designation = aggregator
          .distribution(GroupColumn::Designation, Measure::Count, Some(TOP_DESIGNATIONS), &all)
          .await?;
        let by_zone = aggregator
          .distribution(GroupColumn::Zone, Measure::Count, None, &all)
          .await?;

        let platform = |p: Platform| {
          let get = |spec: GroupSpec| totals.get(&spec.label()).copied().unwrap_or(0);
          PlatformStats {
            active: get(GroupSpec::Active(p)),
            verified: get(GroupSpec::Verified(p)),
            followers: get(GroupSpec::Followers(p)),
          }
        };

        Ok(DirectoryStats {
          total: totals.get(TOTAL_LABEL).copied().unwrap_or(0),
          facebook: platform(Platform::Facebook),
          twitter: platform(Platform::Twitter),
          instagram: platform(Platform::Instagram),
          by_designation: label_counts(by_designation),
          by_zone: label_counts(by_zone),
        })
      })
      .await
      .map(Cached::into_inner)
  }

  /// Named metrics (e.g. `facebook_active`, `twitter_followers`) plus `total`,
  /// in one aggregation pass.
  pub async fn compute_stats(
    &self,
    metrics: &[String],
    filters: &ProfileFilters,
  ) -> Result<BTreeMap<String, i64>> {
    let specs = metrics
      .iter()
      .map(|m| m.parse::<GroupSpec>())
      .collect::<Result<Vec<_>>>()?;
    let key = DirectoryQuery::Metrics {
      metrics: metrics.to_vec(),
      filters: filters.clone(),
    };
    let aggregator = &self.aggregator;
    self
      .cache
      .fetch(&key, || async move { aggregator.compute_stats(&specs, filters).await })
      .await
      .map(Cached::into_inner)
  }

  pub async fn analytics(
    &self,
    chart: AnalyticsChart,
    filters: &ProfileFilters,
  ) -> Result<Chart> {
    let key = DirectoryQuery::Analytics {
      chart,
      filters: filters.clone(),
    };
    let aggregator = &self.aggregator;
    self
      .cache
      .fetch(&key, || chart.build(aggregator, filters))
      .await
      .map(Cached::into_inner)
  }

  pub async fn filter_options(&self) -> Result<FilterOptions> {
    let aggregator = &self.aggregator;
    self
      .cache
      .fetch(&DirectoryQuery::FilterOptions, || async move {
        let mut values = aggregator.distinct_values().await?;
        let mut take = |c: GroupColumn| values.remove(&c).unwrap_or_default();
        Ok(FilterOptions {
          zones: take(GroupColumn::Zone),
          party_districts: take(GroupColumn::PartyDistrict),
          constituencies: take(GroupColumn::Constituency),
          designations: take(GroupColumn::Designation),
        })
      })
      .await
      .map(Cached::into_inner)
  }

  /// Raw cached read by namespace and parameters, for callers that build
  /// their own queries on the directory's store and cache.
  pub async fn cached<T, F, Fut>(
    &self,
    namespace: Namespace,
    parts: &KeyParts,
    fetcher: F,
  ) -> Result<T>
  where
    T: Serialize + serde::de::DeserializeOwned,
    F: FnOnce(Aggregator) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
  {
    let aggregator = self.aggregator.clone();
    self
      .cache
      .cached_fetch(namespace, parts, || fetcher(aggregator))
      .await
      .map(Cached::into_inner)
  }

  pub async fn create_profile(&self, data: &ProfileData) -> Result<Profile> {
    data.validate_new()?;
    let profile = self.repo.insert(data).await?;
    info!(id = profile.id, "created profile");
    self.invalidator.on_mutation(EntityKind::Profile).await;
    Ok(profile)
  }

  /// Change only the fields present in `patch`.
  pub async fn update_profile(&self, id: i64, patch: &ProfileData) -> Result<Profile> {
    check_id(id)?;
    patch.validate_patch()?;
    let profile = self.repo.update(id, patch).await?;
    info!(id, "updated profile");
    self.invalidator.on_mutation(EntityKind::Profile).await;
    Ok(profile)
  }

  pub async fn delete_profile(&self, id: i64) -> Result<()> {
    check_id(id)?;
    self.repo.delete(id).await?;
    info!(id, "deleted profile");
    self.invalidator.on_mutation(EntityKind::Profile).await;
    Ok(())
  }

  /// Delete up to 500 profiles; ids that do not exist are skipped.
  pub async fn bulk_delete(&self, ids: &[i64]) -> Result<usize> {
    if ids.is_empty() || ids.len() > MAX_BULK_DELETE {
      return Err(DirectoryError::Validation(format!(
        "bulk delete takes between 1 and {} ids, got {}",
        MAX_BULK_DELETE,
        ids.len()
      )));
    }
    for id in ids {
      check_id(*id)?;
    }

    let deleted = self.repo.bulk_delete(ids).await?;
    info!(requested = ids.len(), deleted, "bulk deleted profiles");
    self.invalidator.on_mutation(EntityKind::Profile).await;
    Ok(deleted)
  }

  pub(crate) fn paginator(&self) -> &Paginator {
    &self.paginator
  }

  pub(crate) fn pagination(&self) -> &PaginationConfig {
    &self.pagination
  }
}

/// Build the configured cache backend, falling back to no caching when it
/// cannot be reached.
pub async fn connect_cache(config: &CacheConfig) -> Arc<dyn CacheAdapter> {
  let built: Result<Arc<dyn CacheAdapter>> = match config.backend {
    CacheBackend::None => Ok(Arc::new(NoopCache)),
    CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
    CacheBackend::Sqlite => config
      .path
      .clone()
      .or_else(SqliteCache::default_path)
      .ok_or_else(|| DirectoryError::CacheUnavailable("could not determine cache directory".into()))
      .and_then(|path| SqliteCache::open(&path))
      .map(|c| Arc::new(c) as Arc<dyn CacheAdapter>),
    CacheBackend::Redis => match &config.redis_url {
      Some(url) => RedisCache::connect(url).await.map(|c| {
        let c = match &config.key_prefix {
          Some(prefix) => c.with_key_prefix(prefix.clone()),
          None => c,
        };
        Arc::new(c) as Arc<dyn CacheAdapter>
      }),
      None => Err(DirectoryError::CacheUnavailable("redis_url is not set".into())),
    },
  };

  built.unwrap_or_else(|e| {
    warn!(backend = ?config.backend, error = %e, "cache unavailable, continuing without it");
    Arc::new(NoopCache)
  })
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
  value
    .parse()
    .map_err(|_| DirectoryError::InvalidQuery(format!("{} must be a whole number, got '{}'", name, value)))
}

fn check_id(id: i64) -> Result<()> {
  if id <= 0 {
    return Err(DirectoryError::Validation(format!(
      "profile id must be positive, got {}",
      id
    )));
  }
  Ok(())
}

fn label_counts(buckets: Vec<Bucket>) -> Vec<LabelCount> {
  buckets
    .into_iter()
    .map(|b| LabelCount {
      label: b.label.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
      count: b.value,
    })
    .collect()
}
