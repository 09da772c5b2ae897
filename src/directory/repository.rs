//! Profile persistence: single-row reads and every write.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, OptionalExtension};

use super::types::{Profile, ProfileData, PROFILE_COLUMNS};
use crate::db::SqliteStore;
use crate::error::{DirectoryError, Result};

/// Upper bound on ids accepted by one bulk delete.
pub const MAX_BULK_DELETE: usize = 500;

#[derive(Clone)]
pub struct ProfileRepository {
  store: SqliteStore,
}

impl ProfileRepository {
  pub fn new(store: SqliteStore) -> Self {
    Self { store }
  }

  pub async fn get(&self, id: i64) -> Result<Profile> {
    self
      .store
      .with_connection(move |conn| select_by_id(conn, id)?.ok_or(DirectoryError::NotFound(id)))
      .await
  }

  /// Insert a validated payload and read the stored row back.
  pub async fn insert(&self, data: &ProfileData) -> Result<Profile> {
    let now = Value::Text(Utc::now().to_rfc3339());
    let (mut columns, mut params): (Vec<&'static str>, Vec<Value>) = data
      .column_values()
      .into_iter()
      .filter_map(|(column, value)| value.map(|v| (column, v)))
      .unzip();
    columns.extend(["created_at", "updated_at"]);
    params.extend([now.clone(), now]);

    let sql = format!(
      "INSERT INTO profiles ({}) VALUES ({})",
      columns.join(", "),
      vec!["?"; columns.len()].join(", ")
    );

    self
      .store
      .transaction(move |tx| {
        tx.execute(&sql, params_from_iter(params.iter()))
          .map_err(|e| DirectoryError::store("failed to insert profile", e))?;
        let id = tx.last_insert_rowid();
        select_by_id(tx, id)?.ok_or_else(|| {
          DirectoryError::StoreUnavailable(format!("profile {} vanished after insert", id))
        })
      })
      .await
  }

  /// Apply the supplied fields of `patch`; absent fields keep their value.
  pub async fn update(&self, id: i64, patch: &ProfileData) -> Result<Profile> {
    let (mut assignments, mut params): (Vec<String>, Vec<Value>) = patch
      .column_values()
      .into_iter()
      .filter_map(|(column, value)| value.map(|v| (format!("{} = ?", column), v)))
      .unzip();
    assignments.push("updated_at = ?".to_string());
    params.push(Value::Text(Utc::now().to_rfc3339()));
    params.push(Value::Integer(id));

    let sql = format!(
      "UPDATE profiles SET {} WHERE id = ?",
      assignments.join(", ")
    );

    self
      .store
      .transaction(move |tx| {
        let changed = tx
          .execute(&sql, params_from_iter(params.iter()))
          .map_err(|e| DirectoryError::store("failed to update profile", e))?;
        if changed == 0 {
          return Err(DirectoryError::NotFound(id));
        }
        select_by_id(tx, id)?.ok_or(DirectoryError::NotFound(id))
      })
      .await
  }

  pub async fn delete(&self, id: i64) -> Result<()> {
    let deleted = self
      .store
      .execute_write(
        "DELETE FROM profiles WHERE id = ?".into(),
        vec![Value::Integer(id)],
      )
      .await?;
    if deleted == 0 {
      return Err(DirectoryError::NotFound(id));
    }
    Ok(())
  }

  /// Delete every listed id that exists; returns how many rows went.
  pub async fn bulk_delete(&self, ids: &[i64]) -> Result<usize> {
    let sql = format!(
      "DELETE FROM profiles WHERE id IN ({})",
      vec!["?"; ids.len()].join(", ")
    );
    let params = ids.iter().map(|id| Value::Integer(*id)).collect();
    self.store.execute_write(sql, params).await
  }
}

fn select_by_id(conn: &rusqlite::Connection, id: i64) -> Result<Option<Profile>> {
  conn
    .query_row(
      &format!("SELECT {} FROM profiles WHERE id = ?", PROFILE_COLUMNS),
      [id],
      Profile::from_row,
    )
    .optional()
    .map_err(|e| DirectoryError::store("failed to read profile", e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::directory::types::SocialAccount;
  use crate::test_support::{named, temp_store};

  #[tokio::test]
  async fn test_insert_reads_back_row() {
    let (_dir, store) = temp_store().await;
    let repo = ProfileRepository::new(store);

    let mut data = named("Asha");
    data.zone = Some("North".into());
    data.dob = chrono::NaiveDate::from_ymd_opt(1980, 4, 2);
    data.twitter = SocialAccount {
      handle: Some("@asha".into()),
      followers: Some(120),
      active: Some(true),
      verified: None,
    };

    let profile = repo.insert(&data).await.unwrap();
    assert_eq!(profile.id, 1);
    assert_eq!(profile.data, data);
    assert_eq!(profile.created_at, profile.updated_at);
    assert_eq!(repo.get(1).await.unwrap(), profile);
  }

  #[tokio::test]
  async fn test_ids_are_not_reused() {
    let (_dir, store) = temp_store().await;
    let repo = ProfileRepository::new(store);
    repo.insert(&named("a")).await.unwrap();
    let b = repo.insert(&named("b")).await.unwrap();
    repo.delete(b.id).await.unwrap();
    let c = repo.insert(&named("c")).await.unwrap();
    assert_eq!(c.id, 3);
  }

  #[tokio::test]
  async fn test_update_is_partial() {
    let (_dir, store) = temp_store().await;
    let repo = ProfileRepository::new(store);
    let mut data = named("Ravi");
    data.zone = Some("South".into());
    data.facebook.followers = Some(10);
    let created = repo.insert(&data).await.unwrap();

    let mut patch = ProfileData::default();
    patch.facebook.followers = Some(99);
    let updated = repo.update(created.id, &patch).await.unwrap();

    assert_eq!(updated.data.name.as_deref(), Some("Ravi"));
    assert_eq!(updated.data.zone.as_deref(), Some("South"));
    assert_eq!(updated.data.facebook.followers, Some(99));
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
  }

  #[tokio::test]
  async fn test_missing_rows_are_not_found() {
    let (_dir, store) = temp_store().await;
    let repo = ProfileRepository::new(store);
    assert!(matches!(repo.get(9).await, Err(DirectoryError::NotFound(9))));
    assert!(matches!(
      repo.update(9, &named("x")).await,
      Err(DirectoryError::NotFound(9))
    ));
    assert!(matches!(repo.delete(9).await, Err(DirectoryError::NotFound(9))));
  }

  #[tokio::test]
  async fn test_bulk_delete_counts_existing_rows() {
    let (_dir, store) = temp_store().await;
    let repo = ProfileRepository::new(store);
    for name in ["a", "b", "c"] {
      repo.insert(&named(name)).await.unwrap();
    }
    assert_eq!(repo.bulk_delete(&[1, 3, 42]).await.unwrap(), 2);
    assert!(repo.get(2).await.is_ok());
    assert!(repo.get(1).await.is_err());
  }
}
