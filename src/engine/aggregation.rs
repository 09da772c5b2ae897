//! Single-pass aggregation.
//!
//! Every requested metric becomes one `SUM(CASE ...)` (or `SUM(COALESCE ...)`)
//! column of a single statement, so the number of store round trips does not
//! grow with the number of metrics. Ranking and grouping are pushed down to
//! the store with `ORDER BY ... LIMIT`.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::filters::{ProfileFilters, SqlBuilder};
use crate::db::SqliteStore;
use crate::directory::types::Platform;
use crate::error::{DirectoryError, Result};

/// Label of the unconditional row count in [`Aggregator::compute_stats`].
pub const TOTAL_LABEL: &str = "total";

/// A named metric computed in the single aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupSpec {
  /// Profiles whose platform account is flagged active.
  Active(Platform),
  /// Profiles whose platform account is flagged verified.
  Verified(Platform),
  /// Sum of platform followers, unknown counted as zero.
  Followers(Platform),
}

impl GroupSpec {
  /// Every metric the dashboard summary uses.
  pub fn all() -> Vec<GroupSpec> {
    Platform::ALL
      .iter()
      .flat_map(|p| [Self::Active(*p), Self::Verified(*p), Self::Followers(*p)])
      .collect()
  }

  pub fn label(&self) -> String {
    match self {
      Self::Active(p) => format!("{}_active", p.as_str()),
      Self::Verified(p) => format!("{}_verified", p.as_str()),
      Self::Followers(p) => format!("{}_followers", p.as_str()),
    }
  }

  fn select_expr(&self) -> String {
    match self {
      Self::Active(p) => format!(
        "COALESCE(SUM(CASE WHEN {} = 1 THEN 1 ELSE 0 END), 0)",
        p.active_column()
      ),
      Self::Verified(p) => format!(
        "COALESCE(SUM(CASE WHEN {} = 1 THEN 1 ELSE 0 END), 0)",
        p.verified_column()
      ),
      Self::Followers(p) => format!("COALESCE(SUM(COALESCE({}, 0)), 0)", p.followers_column()),
    }
  }
}

impl FromStr for GroupSpec {
  type Err = DirectoryError;

  fn from_str(s: &str) -> Result<Self> {
    let unknown = || DirectoryError::InvalidQuery(format!("unknown metric '{}'", s));
    let (platform, kind) = s.split_once('_').ok_or_else(unknown)?;
    let platform = Platform::parse(platform).ok_or_else(unknown)?;
    match kind {
      "active" => Ok(Self::Active(platform)),
      "verified" => Ok(Self::Verified(platform)),
      "followers" => Ok(Self::Followers(platform)),
      _ => Err(unknown()),
    }
  }
}

impl fmt::Display for GroupSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.label())
  }
}

/// Numeric column a ranking can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
  Followers(Platform),
  TotalFollowers,
}

impl RankMetric {
  fn expr(&self) -> String {
    match self {
      Self::Followers(p) => format!("COALESCE({}, 0)", p.followers_column()),
      Self::TotalFollowers => total_followers_expr(),
    }
  }
}

impl FromStr for RankMetric {
  type Err = DirectoryError;

  fn from_str(s: &str) -> Result<Self> {
    if s == "total_followers" {
      return Ok(Self::TotalFollowers);
    }
    s.strip_suffix("_followers")
      .and_then(Platform::parse)
      .map(Self::Followers)
      .ok_or_else(|| DirectoryError::InvalidQuery(format!("unknown metric '{}'", s)))
  }
}

/// Categorical column a distribution can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupColumn {
  Zone,
  PartyDistrict,
  Constituency,
  Designation,
}

impl GroupColumn {
  pub const ALL: [GroupColumn; 4] = [
    GroupColumn::Zone,
    GroupColumn::PartyDistrict,
    GroupColumn::Constituency,
    GroupColumn::Designation,
  ];

  pub fn column(self) -> &'static str {
    match self {
      Self::Zone => "zone",
      Self::PartyDistrict => "party_district",
      Self::Constituency => "constituency",
      Self::Designation => "designation",
    }
  }
}

/// What a distribution bucket measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
  Count,
  TotalFollowers,
}

/// One row of a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranked {
  pub id: i64,
  pub name: Option<String>,
  pub zone: Option<String>,
  pub value: i64,
}

/// One bucket of a distribution; `label` is `None` for the NULL group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
  pub label: Option<String>,
  pub value: i64,
}

/// Builds and runs aggregation statements against the store.
#[derive(Clone)]
pub struct Aggregator {
  store: SqliteStore,
}

impl Aggregator {
  pub fn new(store: SqliteStore) -> Self {
    Self { store }
  }

  /// Count/sum every spec in one statement, plus [`TOTAL_LABEL`].
  pub async fn compute_stats(
    &self,
    specs: &[GroupSpec],
    filters: &ProfileFilters,
  ) -> Result<BTreeMap<String, i64>> {
    let mut columns = vec!["COUNT(*)".to_string()];
    columns.extend(specs.iter().map(GroupSpec::select_expr));

    let mut sql = SqlBuilder::new();
    filters.apply(&mut sql);
    let statement = format!(
      "SELECT {} FROM profiles{}",
      columns.join(", "),
      sql.where_clause()
    );

    let mut labels = vec![TOTAL_LABEL.to_string()];
    labels.extend(specs.iter().map(GroupSpec::label));

    self
      .store
      .execute_one(statement, sql.into_params(), move |row| {
        let mut out = BTreeMap::new();
        for (i, label) in labels.into_iter().enumerate() {
          out.insert(label, row.get::<_, i64>(i)?);
        }
        Ok(out)
      })
      .await
  }

  /// Average followers per platform, truncated; `None` when no row has a count.
  pub async fn average_followers(&self, filters: &ProfileFilters) -> Result<Vec<Option<i64>>> {
    let columns = Platform::ALL
      .iter()
      .map(|p| format!("AVG({})", p.followers_column()))
      .collect::<Vec<_>>()
      .join(", ");

    let mut sql = SqlBuilder::new();
    filters.apply(&mut sql);
    let statement = format!("SELECT {} FROM profiles{}", columns, sql.where_clause());

    self
      .store
      .execute_one(statement, sql.into_params(), |row| {
        (0..Platform::ALL.len())
          .map(|i| -> rusqlite::Result<Option<i64>> {
            Ok(row.get::<_, Option<f64>>(i)?.map(|avg| avg.trunc() as i64))
          })
          .collect()
      })
      .await
  }

  /// Top `limit` profiles by `metric`, ranked by the store.
  pub async fn top_profiles(
    &self,
    metric: RankMetric,
    limit: u32,
    filters: &ProfileFilters,
  ) -> Result<Vec<Ranked>> {
    if limit == 0 {
      return Err(DirectoryError::InvalidQuery("limit must be positive".into()));
    }

    let mut sql = SqlBuilder::new();
    filters.apply(&mut sql);
    let statement = format!(
      "SELECT id, name, zone, {} AS metric_value FROM profiles{} \
       ORDER BY metric_value DESC, id ASC LIMIT ?",
      metric.expr(),
      sql.where_clause()
    );
    let mut params = sql.into_params();
    params.push(Value::Integer(i64::from(limit)));

    self
      .store
      .execute(statement, params, |row| {
        Ok(Ranked {
          id: row.get(0)?,
          name: row.get(1)?,
          zone: row.get(2)?,
          value: row.get(3)?,
        })
      })
      .await
  }

  /// Group by `column`, largest buckets first, ties by label.
  pub async fn distribution(
    &self,
    column: GroupColumn,
    measure: Measure,
    limit: Option<u32>,
    filters: &ProfileFilters,
  ) -> Result<Vec<Bucket>> {
    let col = column.column();
    let value_expr = match measure {
      Measure::Count => "COUNT(*)".to_string(),
      Measure::TotalFollowers => format!("COALESCE(SUM({}), 0)", total_followers_expr()),
    };

    let mut sql = SqlBuilder::new();
    filters.apply(&mut sql);
    let mut statement = format!(
      "SELECT {col}, {value} AS bucket_value FROM profiles{filters} \
       GROUP BY {col} ORDER BY bucket_value DESC, ({col} IS NULL), {col} ASC",
      col = col,
      value = value_expr,
      filters = sql.where_clause()
    );
    let mut params = sql.into_params();
    if let Some(limit) = limit {
      statement.push_str(" LIMIT ?");
      params.push(Value::Integer(i64::from(limit)));
    }

    self
      .store
      .execute(statement, params, |row| {
        Ok(Bucket {
          label: row.get(0)?,
          value: row.get(1)?,
        })
      })
      .await
  }

  /// Distinct non-null values of every categorical column, in one statement.
  pub async fn distinct_values(&self) -> Result<BTreeMap<GroupColumn, Vec<String>>> {
    let statement = GroupColumn::ALL
      .iter()
      .enumerate()
      .map(|(i, c)| {
        format!(
          "SELECT {i} AS field, {col} AS value FROM profiles WHERE {col} IS NOT NULL",
          i = i,
          col = c.column()
        )
      })
      .collect::<Vec<_>>()
      .join(" UNION ")
      + " ORDER BY field, value";

    let rows = self
      .store
      .execute(statement, vec![], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
      })
      .await?;

    let mut out: BTreeMap<GroupColumn, Vec<String>> =
      GroupColumn::ALL.iter().map(|c| (*c, Vec::new())).collect();
    for (field, value) in rows {
      if let Some(column) = usize::try_from(field).ok().and_then(|i| GroupColumn::ALL.get(i)) {
        out.entry(*column).or_default().push(value);
      }
    }
    Ok(out)
  }
}

fn total_followers_expr() -> String {
  Platform::ALL
    .iter()
    .map(|p| format!("COALESCE({}, 0)", p.followers_column()))
    .collect::<Vec<_>>()
    .join(" + ")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::directory::types::{ProfileData, MAX_FOLLOWERS};
  use crate::test_support::{insert_profiles, temp_store};

  fn row(zone: &str, designation: Option<&str>, fb: (Option<bool>, Option<bool>, Option<i64>), tw_followers: Option<i64>) -> ProfileData {
    let mut data = ProfileData {
      name: Some(format!("{}-{:?}", zone, designation)),
      zone: Some(zone.to_string()),
      designation: designation.map(String::from),
      ..Default::default()
    };
    data.facebook.active = fb.0;
    data.facebook.verified = fb.1;
    data.facebook.followers = fb.2;
    data.twitter.followers = tw_followers;
    data.twitter.active = Some(tw_followers.is_some());
    data
  }

  fn fixture() -> Vec<ProfileData> {
    vec![
      row("North", Some("MLA"), (Some(true), Some(true), Some(100)), Some(5)),
      row("North", Some("MP"), (Some(true), None, None), None),
      row("South", Some("MLA"), (Some(false), Some(true), Some(40)), Some(7)),
      row("South", None, (None, Some(false), Some(10)), None),
      row("East", Some("MLA"), (Some(true), Some(false), Some(1)), Some(1000)),
    ]
  }

  #[tokio::test]
  async fn test_single_pass_matches_independent_counts() {
    let (_dir, store) = temp_store().await;
    insert_profiles(&store, &fixture()).await;
    let aggregator = Aggregator::new(store.clone());

    for filters in [
      ProfileFilters::default(),
      ProfileFilters {
        zone: Some("North".into()),
        ..Default::default()
      },
    ] {
      let specs = GroupSpec::all();
      let stats = aggregator.compute_stats(&specs, &filters).await.unwrap();
      assert_eq!(stats.len(), specs.len() + 1);

      for spec in &specs {
        let (select, predicate) = match spec {
          GroupSpec::Active(p) => ("COUNT(*)".to_string(), Some(format!("{} = 1", p.active_column()))),
          GroupSpec::Verified(p) => ("COUNT(*)".to_string(), Some(format!("{} = 1", p.verified_column()))),
          // SUM skips NULLs on its own; only the empty set needs the COALESCE.
          GroupSpec::Followers(p) => (format!("COALESCE(SUM({}), 0)", p.followers_column()), None),
        };
        let mut sql = SqlBuilder::new();
        filters.apply(&mut sql);
        if let Some(predicate) = predicate {
          sql.and(predicate, std::iter::empty());
        }
        let independent: i64 = store
          .execute_scalar(
            format!("SELECT {} FROM profiles{}", select, sql.where_clause()),
            sql.into_params(),
          )
          .await
          .unwrap();
        assert_eq!(stats[&spec.label()], independent, "{}", spec);
      }
    }

    // Row 2 has no facebook count and the instagram column is NULL throughout.
    let stats = aggregator
      .compute_stats(&GroupSpec::all(), &ProfileFilters::default())
      .await
      .unwrap();
    assert_eq!(stats["facebook_followers"], 151);
    assert_eq!(stats["twitter_followers"], 1012);
    assert_eq!(stats["instagram_followers"], 0);
  }

  #[tokio::test]
  async fn test_sums_at_the_follower_ceiling() {
    let (_dir, store) = temp_store().await;
    let rows: Vec<ProfileData> = (0..4)
      .map(|i| {
        let mut data = ProfileData {
          name: Some(format!("big{}", i)),
          zone: Some("North".into()),
          ..Default::default()
        };
        data.facebook.followers = Some(MAX_FOLLOWERS);
        data.twitter.followers = Some(MAX_FOLLOWERS);
        data.instagram.followers = Some(MAX_FOLLOWERS);
        data
      })
      .collect();
    insert_profiles(&store, &rows).await;
    let aggregator = Aggregator::new(store);
    let all = ProfileFilters::default();

    let stats = aggregator.compute_stats(&GroupSpec::all(), &all).await.unwrap();
    assert_eq!(stats["facebook_followers"], 4 * MAX_FOLLOWERS);

    let top = aggregator
      .top_profiles(RankMetric::TotalFollowers, 2, &all)
      .await
      .unwrap();
    assert_eq!(
      top.iter().map(|r| (r.id, r.value)).collect::<Vec<_>>(),
      vec![(1, 3 * MAX_FOLLOWERS), (2, 3 * MAX_FOLLOWERS)]
    );

    let zones = aggregator
      .distribution(GroupColumn::Zone, Measure::TotalFollowers, None, &all)
      .await
      .unwrap();
    assert_eq!(zones[0].value, 12 * MAX_FOLLOWERS);
  }

  #[tokio::test]
  async fn test_three_metrics_exact() {
    let (_dir, store) = temp_store().await;
    insert_profiles(&store, &fixture()).await;
    let aggregator = Aggregator::new(store);

    let specs: Vec<GroupSpec> = ["facebook_active", "facebook_verified", "twitter_active"]
      .iter()
      .map(|s| s.parse().unwrap())
      .collect();
    let stats = aggregator
      .compute_stats(&specs, &ProfileFilters::default())
      .await
      .unwrap();

    assert_eq!(stats[TOTAL_LABEL], 5);
    assert_eq!(stats["facebook_active"], 3);
    assert_eq!(stats["facebook_verified"], 2);
    assert_eq!(stats["twitter_active"], 3);
  }

  #[tokio::test]
  async fn test_empty_table_sums_are_zero() {
    let (_dir, store) = temp_store().await;
    let stats = Aggregator::new(store)
      .compute_stats(&GroupSpec::all(), &ProfileFilters::default())
      .await
      .unwrap();
    assert!(stats.values().all(|v| *v == 0));
  }

  #[test]
  fn test_unknown_metric_names() {
    assert!(matches!(
      "myspace_active".parse::<GroupSpec>(),
      Err(DirectoryError::InvalidQuery(_))
    ));
    assert!("facebook_likes".parse::<GroupSpec>().is_err());
    assert!("total".parse::<RankMetric>().is_err());
    assert_eq!(
      "instagram_followers".parse::<RankMetric>().unwrap(),
      RankMetric::Followers(Platform::Instagram)
    );
  }

  #[tokio::test]
  async fn test_top_profiles_ranked_by_store() {
    let (_dir, store) = temp_store().await;
    insert_profiles(&store, &fixture()).await;
    let aggregator = Aggregator::new(store);

    let top = aggregator
      .top_profiles(RankMetric::TotalFollowers, 3, &ProfileFilters::default())
      .await
      .unwrap();
    assert_eq!(
      top.iter().map(|r| (r.id, r.value)).collect::<Vec<_>>(),
      vec![(5, 1001), (1, 105), (3, 47)]
    );

    let north = aggregator
      .top_profiles(
        RankMetric::Followers(Platform::Facebook),
        10,
        &ProfileFilters {
          zone: Some("North".into()),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    assert_eq!(north.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
  }

  #[tokio::test]
  async fn test_distribution_and_distinct_values() {
    let (_dir, store) = temp_store().await;
    insert_profiles(&store, &fixture()).await;
    let aggregator = Aggregator::new(store);

    let by_designation = aggregator
      .distribution(GroupColumn::Designation, Measure::Count, None, &ProfileFilters::default())
      .await
      .unwrap();
    assert_eq!(
      by_designation,
      vec![
        Bucket { label: Some("MLA".into()), value: 3 },
        Bucket { label: Some("MP".into()), value: 1 },
        Bucket { label: None, value: 1 },
      ]
    );

    let zone_followers = aggregator
      .distribution(GroupColumn::Zone, Measure::TotalFollowers, Some(2), &ProfileFilters::default())
      .await
      .unwrap();
    assert_eq!(
      zone_followers,
      vec![
        Bucket { label: Some("East".into()), value: 1001 },
        Bucket { label: Some("North".into()), value: 105 },
      ]
    );

    let distinct = aggregator.distinct_values().await.unwrap();
    assert_eq!(distinct[&GroupColumn::Zone], vec!["East", "North", "South"]);
    assert_eq!(distinct[&GroupColumn::Designation], vec!["MLA", "MP"]);
    assert!(distinct[&GroupColumn::PartyDistrict].is_empty());
  }

  #[tokio::test]
  async fn test_average_followers() {
    let (_dir, store) = temp_store().await;
    insert_profiles(&store, &fixture()).await;
    let averages = Aggregator::new(store)
      .average_followers(&ProfileFilters::default())
      .await
      .unwrap();
    // facebook: (100 + 40 + 10 + 1) / 4, twitter: (5 + 7 + 1000) / 3
    assert_eq!(averages, vec![Some(37), Some(337), None]);
  }
}
