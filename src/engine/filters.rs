//! Filter and sort vocabulary shared by the listing and aggregation engines.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::directory::types::Platform;
use crate::error::{DirectoryError, Result};

/// Shortest term the trigram index can answer; shorter terms scan with LIKE.
const TRIGRAM_MIN_CHARS: usize = 3;

/// Columns searched by the free-text filter, all covered by `profiles_fts`.
const SEARCH_COLUMNS: [&str; 8] = [
  "name",
  "constituency",
  "designation",
  "zone",
  "email_id",
  "facebook_id",
  "twitter_id",
  "instagram_id",
];

/// Predicates applied to profile reads.
///
/// Empty strings are treated as absent so `zone=""` and no zone filter
/// describe the same query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFilters {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub zone: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub party_district: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub constituency: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub designation: Option<String>,
  #[serde(default)]
  pub active_only: bool,
  #[serde(default)]
  pub verified_only: bool,
}

impl ProfileFilters {
  /// Set one filter by name, rejecting unknown names.
  pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
    let value = value.trim();
    let text = || (!value.is_empty()).then(|| value.to_string());
    match name {
      "search" => self.search = text(),
      "zone" => self.zone = text(),
      "party_district" => self.party_district = text(),
      "constituency" => self.constituency = text(),
      "designation" => self.designation = text(),
      "active_only" => self.active_only = parse_flag(name, value)?,
      "verified_only" => self.verified_only = parse_flag(name, value)?,
      other => {
        return Err(DirectoryError::InvalidQuery(format!(
          "unknown filter '{}'",
          other
        )))
      }
    }
    Ok(())
  }

  /// Copy with blank strings dropped and surrounding whitespace trimmed.
  pub fn normalized(&self) -> Self {
    let clean = |v: &Option<String>| {
      v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
    };
    Self {
      search: clean(&self.search),
      zone: clean(&self.zone),
      party_district: clean(&self.party_district),
      constituency: clean(&self.constituency),
      designation: clean(&self.designation),
      active_only: self.active_only,
      verified_only: self.verified_only,
    }
  }

  /// Only the categorical equality filters, as the analytics charts accept.
  pub fn categorical(&self) -> Self {
    Self {
      zone: self.zone.clone(),
      party_district: self.party_district.clone(),
      constituency: self.constituency.clone(),
      designation: self.designation.clone(),
      ..Default::default()
    }
    .normalized()
  }

  /// Append this filter set's predicates to `sql`.
  pub fn apply(&self, sql: &mut SqlBuilder) {
    let f = self.normalized();

    if let Some(term) = &f.search {
      if term.chars().count() >= TRIGRAM_MIN_CHARS {
        sql.and(
          "id IN (SELECT rowid FROM profiles_fts WHERE profiles_fts MATCH ?)".to_string(),
          [Value::Text(fts_phrase(term))],
        );
      } else {
        let pattern = format!("%{}%", escape_like(term));
        let clause = SEARCH_COLUMNS
          .iter()
          .map(|col| format!("{} LIKE ? ESCAPE '\\'", col))
          .collect::<Vec<_>>()
          .join(" OR ");
        sql.and(
          format!("({})", clause),
          SEARCH_COLUMNS.iter().map(|_| Value::Text(pattern.clone())),
        );
      }
    }

    for (column, value) in [
      ("zone", &f.zone),
      ("party_district", &f.party_district),
      ("constituency", &f.constituency),
      ("designation", &f.designation),
    ] {
      if let Some(v) = value {
        sql.and(format!("{} = ?", column), [Value::Text(v.clone())]);
      }
    }

    if f.active_only {
      sql.and(any_platform(Platform::active_column), std::iter::empty());
    }
    if f.verified_only {
      sql.and(any_platform(Platform::verified_column), std::iter::empty());
    }
  }
}

fn any_platform(column: fn(Platform) -> &'static str) -> String {
  let clause = Platform::ALL
    .iter()
    .map(|p| format!("{} = 1", column(*p)))
    .collect::<Vec<_>>()
    .join(" OR ");
  format!("({})", clause)
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
  match value.to_ascii_lowercase().as_str() {
    "" | "false" | "0" | "no" => Ok(false),
    "true" | "1" | "yes" => Ok(true),
    other => Err(DirectoryError::InvalidQuery(format!(
      "filter '{}' expects a boolean, got '{}'",
      name, other
    ))),
  }
}

/// Quote `term` as a single FTS5 phrase so its characters match literally.
fn fts_phrase(term: &str) -> String {
  format!("\"{}\"", term.replace('"', "\"\""))
}

fn escape_like(term: &str) -> String {
  let mut out = String::with_capacity(term.len());
  for c in term.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

/// Accumulates `WHERE` predicates with their positional parameters.
#[derive(Debug, Default)]
pub struct SqlBuilder {
  clauses: Vec<String>,
  params: Vec<Value>,
}

impl SqlBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn and<I>(&mut self, clause: String, params: I)
  where
    I: IntoIterator<Item = Value>,
  {
    self.clauses.push(clause);
    self.params.extend(params);
  }

  /// ` WHERE a AND b`, or an empty string when no predicate was added.
  pub fn where_clause(&self) -> String {
    if self.clauses.is_empty() {
      String::new()
    } else {
      format!(" WHERE {}", self.clauses.join(" AND "))
    }
  }

  pub fn into_params(self) -> Vec<Value> {
    self.params
  }
}

/// Column a listing may be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
  #[default]
  Id,
  Name,
  Zone,
  PartyDistrict,
  Constituency,
  Designation,
  FacebookFollowers,
  TwitterFollowers,
  InstagramFollowers,
}

impl SortColumn {
  pub const ALL: [SortColumn; 9] = [
    SortColumn::Id,
    SortColumn::Name,
    SortColumn::Zone,
    SortColumn::PartyDistrict,
    SortColumn::Constituency,
    SortColumn::Designation,
    SortColumn::FacebookFollowers,
    SortColumn::TwitterFollowers,
    SortColumn::InstagramFollowers,
  ];

  pub fn column(self) -> &'static str {
    match self {
      Self::Id => "id",
      Self::Name => "name",
      Self::Zone => "zone",
      Self::PartyDistrict => "party_district",
      Self::Constituency => "constituency",
      Self::Designation => "designation",
      Self::FacebookFollowers => "facebook_followers",
      Self::TwitterFollowers => "twitter_followers",
      Self::InstagramFollowers => "instagram_followers",
    }
  }
}

impl FromStr for SortColumn {
  type Err = DirectoryError;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|c| c.column() == s)
      .ok_or_else(|| DirectoryError::InvalidQuery(format!("cannot sort by '{}'", s)))
  }
}

impl fmt::Display for SortColumn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.column())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  #[default]
  Asc,
  Desc,
}

impl SortOrder {
  pub fn sql(self) -> &'static str {
    match self {
      Self::Asc => "ASC",
      Self::Desc => "DESC",
    }
  }
}

impl FromStr for SortOrder {
  type Err = DirectoryError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "asc" => Ok(Self::Asc),
      "desc" => Ok(Self::Desc),
      other => Err(DirectoryError::InvalidQuery(format!(
        "sort order must be 'asc' or 'desc', got '{}'",
        other
      ))),
    }
  }
}

/// Sort column plus direction; `id` always breaks ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
  pub column: SortColumn,
  pub order: SortOrder,
}

impl SortSpec {
  pub fn new(column: SortColumn, order: SortOrder) -> Self {
    Self { column, order }
  }

  pub fn parse(column: &str, order: &str) -> Result<Self> {
    Ok(Self::new(column.parse()?, order.parse()?))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unknown_filter_is_invalid_query() {
    let err = ProfileFilters::default().set("color", "red").unwrap_err();
    assert!(matches!(err, DirectoryError::InvalidQuery(_)));
  }

  #[test]
  fn test_set_by_name() {
    let mut filters = ProfileFilters::default();
    for (name, value) in [("zone", " North "), ("active_only", "true"), ("search", "")] {
      filters.set(name, value).unwrap();
    }
    assert_eq!(filters.zone.as_deref(), Some("North"));
    assert!(filters.active_only);
    assert_eq!(filters.search, None);
  }

  #[test]
  fn test_sort_parsing() {
    assert_eq!(
      SortSpec::parse("twitter_followers", "DESC").unwrap(),
      SortSpec::new(SortColumn::TwitterFollowers, SortOrder::Desc)
    );
    assert!(matches!(
      SortSpec::parse("password", "asc"),
      Err(DirectoryError::InvalidQuery(_))
    ));
    assert!(SortSpec::parse("id", "sideways").is_err());
  }

  #[test]
  fn test_apply_builds_parameterized_clause() {
    let filters = ProfileFilters {
      search: Some("say \"hi\"".into()),
      zone: Some("North".into()),
      designation: Some("  ".into()),
      verified_only: true,
      ..Default::default()
    };
    let mut sql = SqlBuilder::new();
    filters.apply(&mut sql);

    let clause = sql.where_clause();
    assert!(clause.starts_with(" WHERE id IN (SELECT rowid FROM profiles_fts"));
    assert!(clause.contains("zone = ?"));
    assert!(!clause.contains("designation = ?"));
    assert!(clause.contains("facebook_verified_status = 1 OR twitter_verified_status = 1"));

    let params = sql.into_params();
    assert_eq!(
      params,
      vec![
        Value::Text("\"say \"\"hi\"\"\"".into()),
        Value::Text("North".into())
      ]
    );
  }

  #[test]
  fn test_short_search_scans_with_like() {
    let filters = ProfileFilters {
      search: Some("%_".into()),
      ..Default::default()
    };
    let mut sql = SqlBuilder::new();
    filters.apply(&mut sql);

    assert!(sql.where_clause().starts_with(" WHERE (name LIKE ? ESCAPE '\\'"));
    let params = sql.into_params();
    assert_eq!(params.len(), SEARCH_COLUMNS.len());
    assert_eq!(params[0], Value::Text("%\\%\\_%".into()));
  }

  #[test]
  fn test_empty_filters_have_no_where() {
    let mut sql = SqlBuilder::new();
    ProfileFilters::default().apply(&mut sql);
    assert_eq!(sql.where_clause(), "");
  }
}
