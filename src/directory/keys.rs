//! Cache keys for directory reads.

use crate::cache::{KeyParts, Namespace, QueryKey};
use crate::engine::filters::ProfileFilters;
use crate::engine::pagination::PageRequest;

use super::analytics::AnalyticsChart;

/// Every cached read the directory serves.
#[derive(Clone, Debug)]
pub enum DirectoryQuery {
  /// One listing page
  Listing(PageRequest),
  /// Dashboard summary
  Stats,
  /// Ad hoc metrics over a filter set
  Metrics {
    metrics: Vec<String>,
    filters: ProfileFilters,
  },
  Analytics {
    chart: AnalyticsChart,
    filters: ProfileFilters,
  },
  FilterOptions,
}

impl QueryKey for DirectoryQuery {
  fn namespace(&self) -> Namespace {
    match self {
      Self::Listing(_) => Namespace::Listing,
      Self::Stats | Self::Metrics { .. } => Namespace::Stats,
      Self::Analytics { .. } => Namespace::Analytics,
      Self::FilterOptions => Namespace::Options,
    }
  }

  fn key_parts(&self) -> KeyParts {
    match self {
      Self::Listing(request) => KeyParts::new()
        .with("kind", "listing")
        .extend_from(&request.filters.normalized())
        .with("sort_by", request.sort.column)
        .with("sort_order", request.sort.order)
        .with("cursor", request.cursor)
        // Wrapped so an explicit null stays distinct from no value.
        .with("cursor_value", request.cursor_value.as_ref().map(|v| [v]))
        .with("limit", request.page_size),
      Self::Stats => KeyParts::new().with("kind", "summary"),
      Self::Metrics { metrics, filters } => {
        let mut metrics = metrics.clone();
        metrics.sort();
        metrics.dedup();
        KeyParts::new()
          .with("kind", "metrics")
          .with("metrics", metrics)
          .extend_from(&filters.normalized())
      }
      Self::Analytics { chart, filters } => KeyParts::new()
        .with("kind", chart.as_str())
        .extend_from(&filters.categorical()),
      Self::FilterOptions => KeyParts::new().with("kind", "filter_options"),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Listing(request) => format!(
        "listing sorted by {} {} from {} ({} rows)",
        request.sort.column,
        request.sort.order.sql().to_lowercase(),
        request.cursor,
        request.page_size
      ),
      Self::Stats => "directory stats".to_string(),
      Self::Metrics { metrics, .. } => format!("metrics {}", metrics.join(", ")),
      Self::Analytics { chart, .. } => format!("{} chart", chart),
      Self::FilterOptions => "filter options".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::filters::{SortColumn, SortOrder, SortSpec};
  use crate::engine::pagination::SortValue;

  fn listing(filters: ProfileFilters, cursor: i64) -> DirectoryQuery {
    DirectoryQuery::Listing(PageRequest::new(
      filters,
      SortSpec::new(SortColumn::Name, SortOrder::Desc),
      cursor,
      20,
    ))
  }

  #[test]
  fn test_equivalent_filters_share_a_key() {
    let padded = ProfileFilters {
      zone: Some(" North ".into()),
      designation: Some("".into()),
      ..Default::default()
    };
    let clean = ProfileFilters {
      zone: Some("North".into()),
      ..Default::default()
    };
    assert_eq!(listing(padded, 0).cache_key(), listing(clean, 0).cache_key());
  }

  #[test]
  fn test_cursor_changes_key() {
    let a = listing(ProfileFilters::default(), 0);
    let b = listing(ProfileFilters::default(), 20);
    assert_ne!(a.cache_key(), b.cache_key());
    assert!(a.cache_key().starts_with("listing:"));

    let with_value = |value: Option<SortValue>| match listing(ProfileFilters::default(), 20) {
      DirectoryQuery::Listing(request) => {
        DirectoryQuery::Listing(request.with_cursor_value(value)).cache_key()
      }
      _ => unreachable!(),
    };
    assert_eq!(with_value(None), b.cache_key());
    assert_ne!(with_value(Some(SortValue::Null)), b.cache_key());
    assert_ne!(
      with_value(Some(SortValue::Null)),
      with_value(Some(SortValue::Text("North".into())))
    );
  }

  #[test]
  fn test_metric_order_is_irrelevant() {
    let a = DirectoryQuery::Metrics {
      metrics: vec!["twitter_active".into(), "facebook_active".into()],
      filters: ProfileFilters::default(),
    };
    let b = DirectoryQuery::Metrics {
      metrics: vec!["facebook_active".into(), "twitter_active".into()],
      filters: ProfileFilters::default(),
    };
    assert_eq!(a.cache_key(), b.cache_key());
    assert_ne!(a.cache_key(), DirectoryQuery::Stats.cache_key());
  }

  #[test]
  fn test_charts_ignore_non_categorical_filters() {
    let key = |search: Option<&str>| {
      DirectoryQuery::Analytics {
        chart: AnalyticsChart::TopProfiles,
        filters: ProfileFilters {
          search: search.map(String::from),
          ..Default::default()
        },
      }
      .cache_key()
    };
    assert_eq!(key(None), key(Some("asha")));
    assert!(key(None).starts_with("analytics:"));
  }
}
