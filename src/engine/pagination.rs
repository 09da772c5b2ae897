//! Keyset pagination over profiles.
//!
//! A page is located by the last id of the previous page rather than by an
//! offset, so fetching page N costs the same as fetching page 1. When sorting
//! by a column other than `id`, rows are ordered by `(column IS NULL, column,
//! id)` and the listing resumes strictly after the composite key `(value,
//! id)`. Each page hands back the last row's sort value next to its id; a
//! request that carries it keeps working even if that row was deleted in the
//! meantime. Without it, the value is looked up from the cursor row. Rows
//! sharing a sort value are never skipped or repeated across pages.

use rusqlite::types::Value;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use super::filters::{ProfileFilters, SortColumn, SortOrder, SortSpec, SqlBuilder};
use crate::db::{query_rows, SqliteStore};
use crate::directory::types::{Profile, PROFILE_COLUMNS};
use crate::error::{DirectoryError, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Sort column value of a cursor row. Serializes as plain JSON (`null`, a
/// number or a string).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortValue {
  Null,
  Integer(i64),
  Text(String),
}

impl From<Value> for SortValue {
  fn from(value: Value) -> Self {
    match value {
      Value::Null => Self::Null,
      Value::Integer(n) => Self::Integer(n),
      // Compared against a numeric column, SQLite converts the text back.
      Value::Real(f) => Self::Text(f.to_string()),
      Value::Text(s) => Self::Text(s),
      Value::Blob(b) => Self::Text(String::from_utf8_lossy(&b).into_owned()),
    }
  }
}

impl From<SortValue> for Value {
  fn from(value: SortValue) -> Self {
    match value {
      SortValue::Null => Value::Null,
      SortValue::Integer(n) => Value::Integer(n),
      SortValue::Text(s) => Value::Text(s),
    }
  }
}

/// A bounded slice of an ordered listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  /// Id of the last item, or `None` once the listing is exhausted.
  pub next_cursor: Option<i64>,
  /// Sort value of the last item, under a column sort.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_cursor_value: Option<SortValue>,
  /// Rows matching the filters, independent of the page.
  pub total: i64,
}

/// A validated page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
  pub filters: ProfileFilters,
  pub sort: SortSpec,
  /// Last id of the previous page; 0 starts from the beginning.
  pub cursor: i64,
  /// The previous page's `next_cursor_value`, when the client kept it.
  pub cursor_value: Option<SortValue>,
  pub page_size: u32,
}

impl PageRequest {
  pub fn new(filters: ProfileFilters, sort: SortSpec, cursor: i64, page_size: u32) -> Self {
    Self {
      filters,
      sort,
      cursor,
      cursor_value: None,
      page_size,
    }
  }

  pub fn with_cursor_value(mut self, value: Option<SortValue>) -> Self {
    self.cursor_value = value;
    self
  }

  /// Continue after the last item of `page`.
  pub fn after<T>(mut self, page: &Page<T>) -> Option<Self> {
    self.cursor = page.next_cursor?;
    self.cursor_value = page.next_cursor_value.clone();
    Some(self)
  }

  pub fn validate(&self, max_page_size: u32) -> Result<()> {
    if self.cursor < 0 {
      return Err(DirectoryError::InvalidQuery(format!(
        "cursor must not be negative, got {}",
        self.cursor
      )));
    }
    if self.page_size == 0 || self.page_size > max_page_size {
      return Err(DirectoryError::InvalidQuery(format!(
        "page size must be between 1 and {}, got {}",
        max_page_size, self.page_size
      )));
    }
    Ok(())
  }
}

/// Translates page requests into bounded range queries.
#[derive(Clone)]
pub struct Paginator {
  store: SqliteStore,
}

impl Paginator {
  pub fn new(store: SqliteStore) -> Self {
    Self { store }
  }

  /// Fetch one page and the filtered total.
  ///
  /// Both statements run in one read transaction so `total` and `items`
  /// describe the same snapshot.
  pub async fn fetch_page(&self, request: &PageRequest) -> Result<Page<Profile>> {
    request.validate(MAX_PAGE_SIZE)?;
    let request = request.clone();

    self
      .store
      .transaction(move |tx| {
        let anchor = match (request.sort.column, &request.cursor_value) {
          (SortColumn::Id, _) => None,
          _ if request.cursor == 0 => None,
          (_, Some(value)) => Some(Value::from(value.clone())),
          (column, None) => Some(lookup_anchor(tx, column, request.cursor)?),
        };

        let mut count = SqlBuilder::new();
        request.filters.apply(&mut count);
        let total: i64 = tx
          .query_row(
            &format!("SELECT COUNT(*) FROM profiles{}", count.where_clause()),
            rusqlite::params_from_iter(count.into_params().iter()),
            |row| row.get(0),
          )
          .map_err(|e| DirectoryError::store("failed to count profiles", e))?;

        let column = request.sort.column.column();
        let (sql, params) = page_query(&request, anchor);
        let mut rows = query_rows(tx, &sql, &params, |row| {
          Ok((Profile::from_row(row)?, row.get::<_, Value>(column)?))
        })?;

        let mut next = None;
        if rows.len() > request.page_size as usize {
          rows.truncate(request.page_size as usize);
          next = rows.last().map(|(profile, value)| (profile.id, value.clone()));
        }
        let (next_cursor, next_cursor_value) = match next {
          Some((id, value)) => {
            let value = match request.sort.column {
              SortColumn::Id => None,
              _ => Some(SortValue::from(value)),
            };
            (Some(id), value)
          }
          None => (None, None),
        };

        Ok(Page {
          items: rows.into_iter().map(|(profile, _)| profile).collect(),
          next_cursor,
          next_cursor_value,
          total,
        })
      })
      .await
  }
}

/// Sort value of the cursor row, for requests that did not carry it.
fn lookup_anchor(tx: &rusqlite::Transaction<'_>, column: SortColumn, cursor: i64) -> Result<Value> {
  tx.query_row(
    &format!("SELECT {} FROM profiles WHERE id = ?", column.column()),
    [cursor],
    |row| row.get::<_, Value>(0),
  )
  .optional()
  .map_err(|e| DirectoryError::store("failed to resolve cursor", e))?
  .ok_or_else(|| {
    DirectoryError::InvalidQuery(format!(
      "cursor {} no longer references a profile; pass the page's cursor value to continue",
      cursor
    ))
  })
}

/// Build the page statement. Requests one row beyond the page size so the
/// caller can tell whether another page exists.
fn page_query(request: &PageRequest, anchor: Option<Value>) -> (String, Vec<Value>) {
  let mut sql = SqlBuilder::new();
  request.filters.apply(&mut sql);

  let SortSpec { column, order } = request.sort;
  let col = column.column();

  let order_by = match column {
    SortColumn::Id => format!("id {}", order.sql()),
    _ => format!("({} IS NULL), {} {}, id ASC", col, col, order.sql()),
  };

  match (column, anchor) {
    (SortColumn::Id, _) if request.cursor > 0 => {
      let op = match order {
        SortOrder::Asc => ">",
        SortOrder::Desc => "<",
      };
      sql.and(format!("id {} ?", op), [Value::Integer(request.cursor)]);
    }
    (_, Some(Value::Null)) => {
      sql.and(
        format!("({} IS NULL AND id > ?)", col),
        [Value::Integer(request.cursor)],
      );
    }
    (_, Some(value)) => {
      let op = match order {
        SortOrder::Asc => ">",
        SortOrder::Desc => "<",
      };
      sql.and(
        format!(
          "({col} IS NULL OR {col} {op} ? OR ({col} = ? AND id > ?))",
          col = col,
          op = op
        ),
        [value.clone(), value, Value::Integer(request.cursor)],
      );
    }
    _ => {}
  }

  let statement = format!(
    "SELECT {} FROM profiles{} ORDER BY {} LIMIT ?",
    PROFILE_COLUMNS,
    sql.where_clause(),
    order_by
  );
  let mut params = sql.into_params();
  params.push(Value::Integer(i64::from(request.page_size) + 1));

  (statement, params)
}
