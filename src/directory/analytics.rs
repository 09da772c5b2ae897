//! Dashboard charts built on the aggregation engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::{Chart, Platform};
use crate::engine::aggregation::{Aggregator, GroupColumn, GroupSpec, Measure, RankMetric};
use crate::engine::filters::ProfileFilters;
use crate::error::{DirectoryError, Result};

const TOP_PROFILES: u32 = 15;
const TOP_ZONES: u32 = 12;
const TOP_DESIGNATIONS: u32 = 10;
const LABEL_CHARS: usize = 20;

/// Label used for a missing name or an empty group.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyticsChart {
  /// Average followers per platform
  PlatformComparison,
  /// Highest total followers
  TopProfiles,
  ActiveStatus,
  VerifiedStatus,
  /// Summed followers per zone
  ZoneFollowers,
  /// Profiles per designation
  DesignationCount,
}

impl AnalyticsChart {
  pub const ALL: [AnalyticsChart; 6] = [
    AnalyticsChart::PlatformComparison,
    AnalyticsChart::TopProfiles,
    AnalyticsChart::ActiveStatus,
    AnalyticsChart::VerifiedStatus,
    AnalyticsChart::ZoneFollowers,
    AnalyticsChart::DesignationCount,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::PlatformComparison => "platform-comparison",
      Self::TopProfiles => "top-profiles",
      Self::ActiveStatus => "active-status",
      Self::VerifiedStatus => "verified-status",
      Self::ZoneFollowers => "zone-followers",
      Self::DesignationCount => "designation-count",
    }
  }

  /// Compute this chart. Only the categorical filters apply.
  pub async fn build(self, aggregator: &Aggregator, filters: &ProfileFilters) -> Result<Chart> {
    let filters = filters.categorical();
    match self {
      Self::PlatformComparison => {
        let averages = aggregator.average_followers(&filters).await?;
        Ok(Chart::per_platform(
          "Avg Followers",
          averages.into_iter().map(|a| a.unwrap_or(0)).collect(),
        ))
      }
      Self::TopProfiles => {
        let top = aggregator
          .top_profiles(RankMetric::TotalFollowers, TOP_PROFILES, &filters)
          .await?;
        let labels = top.iter().map(|r| short_label(r.name.as_deref())).collect();
        let data = top.iter().map(|r| r.value).collect();
        Ok(Chart::single(labels, "Total Followers", data, "#36A2EB"))
      }
      Self::ActiveStatus => {
        platform_flags(aggregator, &filters, GroupSpec::Active, "Active Profiles").await
      }
      Self::VerifiedStatus => {
        platform_flags(aggregator, &filters, GroupSpec::Verified, "Verified Profiles").await
      }
      Self::ZoneFollowers => {
        let buckets = aggregator
          .distribution(
            GroupColumn::Zone,
            Measure::TotalFollowers,
            Some(TOP_ZONES),
            &filters,
          )
          .await?;
        let (labels, data) = buckets
          .into_iter()
          .map(|b| (b.label.unwrap_or_else(|| UNKNOWN_LABEL.to_string()), b.value))
          .unzip();
        Ok(Chart::single(labels, "Total Followers by Zone", data, "#FFCE56"))
      }
      Self::DesignationCount => {
        let buckets = aggregator
          .distribution(
            GroupColumn::Designation,
            Measure::Count,
            Some(TOP_DESIGNATIONS),
            &filters,
          )
          .await?;
        let (labels, data) = buckets
          .into_iter()
          .map(|b| (b.label.unwrap_or_else(|| UNKNOWN_LABEL.to_string()), b.value))
          .unzip();
        Ok(Chart::single(labels, "Profiles by Designation", data, "#4BC0C0"))
      }
    }
  }
}

impl fmt::Display for AnalyticsChart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AnalyticsChart {
  type Err = DirectoryError;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| DirectoryError::InvalidQuery(format!("unknown chart '{}'", s)))
  }
}

/// Per-platform counts of one flag, from a single aggregation query.
async fn platform_flags(
  aggregator: &Aggregator,
  filters: &ProfileFilters,
  spec: fn(Platform) -> GroupSpec,
  label: &str,
) -> Result<Chart> {
  let specs: Vec<GroupSpec> = Platform::ALL.iter().map(|p| spec(*p)).collect();
  let stats = aggregator.compute_stats(&specs, filters).await?;
  let data = specs
    .iter()
    .map(|s| stats.get(&s.label()).copied().unwrap_or(0))
    .collect();
  Ok(Chart::per_platform(label, data))
}

fn short_label(name: Option<&str>) -> String {
  match name {
    None | Some("") => UNKNOWN_LABEL.to_string(),
    Some(n) if n.chars().count() > LABEL_CHARS => {
      format!("{}…", n.chars().take(LABEL_CHARS).collect::<String>())
    }
    Some(n) => n.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::directory::types::{Colors, ProfileData};
  use crate::test_support::{insert_profiles, named, temp_store};

  #[test]
  fn test_short_label() {
    assert_eq!(short_label(None), "Unknown");
    assert_eq!(short_label(Some("Asha")), "Asha");
    assert_eq!(
      short_label(Some("Abcdefghijklmnopqrstuvwxyz")),
      "Abcdefghijklmnopqrst…"
    );
    assert_eq!(short_label(Some("ññññññññññññññññññññ")).chars().count(), 20);
  }

  #[test]
  fn test_chart_names() {
    for chart in AnalyticsChart::ALL {
      assert_eq!(chart.as_str().parse::<AnalyticsChart>().unwrap(), chart);
    }
    assert!("pie".parse::<AnalyticsChart>().is_err());
  }

  fn profile(name: &str, zone: Option<&str>, fb: i64, ig: Option<i64>, active: bool) -> ProfileData {
    let mut data = named(name);
    data.zone = zone.map(String::from);
    data.facebook.followers = Some(fb);
    data.facebook.active = Some(active);
    data.instagram.followers = ig;
    data.instagram.verified = Some(true);
    data
  }

  #[tokio::test]
  async fn test_charts() {
    let (_dir, store) = temp_store().await;
    insert_profiles(
      &store,
      &[
        profile("A very long politician name", Some("North"), 100, Some(50), true),
        profile("B", Some("South"), 10, None, false),
        profile("C", None, 30, Some(10), true),
      ],
    )
    .await;
    let aggregator = Aggregator::new(store);
    let all = ProfileFilters::default();

    let top = AnalyticsChart::TopProfiles.build(&aggregator, &all).await.unwrap();
    assert_eq!(top.labels, vec!["A very long politici…", "C", "B"]);
    assert_eq!(top.datasets[0].data, vec![150, 40, 10]);
    assert_eq!(top.datasets[0].background_color, Colors::Single("#36A2EB".into()));

    let active = AnalyticsChart::ActiveStatus.build(&aggregator, &all).await.unwrap();
    assert_eq!(active.labels, vec!["Facebook", "Twitter", "Instagram"]);
    assert_eq!(active.datasets[0].data, vec![2, 0, 0]);

    let verified = AnalyticsChart::VerifiedStatus.build(&aggregator, &all).await.unwrap();
    assert_eq!(verified.datasets[0].data, vec![0, 0, 3]);

    let zones = AnalyticsChart::ZoneFollowers.build(&aggregator, &all).await.unwrap();
    assert_eq!(zones.labels, vec!["North", "Unknown", "South"]);
    assert_eq!(zones.datasets[0].data, vec![150, 40, 10]);

    let comparison = AnalyticsChart::PlatformComparison.build(&aggregator, &all).await.unwrap();
    assert_eq!(comparison.datasets[0].data, vec![46, 0, 30]);

    // Non-categorical filters are ignored by charts.
    let north = ProfileFilters {
      zone: Some("North".into()),
      search: Some("nobody".into()),
      ..Default::default()
    };
    let designations = AnalyticsChart::DesignationCount.build(&aggregator, &north).await.unwrap();
    assert_eq!(designations.labels, vec!["Unknown"]);
    assert_eq!(designations.datasets[0].data, vec![1]);
  }
}
