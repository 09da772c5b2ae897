use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, Result};

/// Columns selected whenever a full profile row is read.
pub const PROFILE_COLUMNS: &str = "id, zone, party_district, constituency, designation, name, \
   whatsapp_number, dob, address, email_id, \
   facebook_id, facebook_followers, facebook_active_status, facebook_verified_status, \
   twitter_id, twitter_followers, twitter_active_status, twitter_verified_status, \
   instagram_id, instagram_followers, instagram_active_status, instagram_verified_status, \
   created_at, updated_at";

/// Upper bound for one follower count. Summing three platforms over millions
/// of profiles stays inside SQLite's 64-bit integer range.
pub const MAX_FOLLOWERS: i64 = 1_000_000_000_000;

/// Social platform a profile can have an account on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  Facebook,
  Twitter,
  Instagram,
}

impl Platform {
  pub const ALL: [Platform; 3] = [Platform::Facebook, Platform::Twitter, Platform::Instagram];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Facebook => "facebook",
      Self::Twitter => "twitter",
      Self::Instagram => "instagram",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|p| p.as_str() == s)
  }

  pub fn display_name(self) -> &'static str {
    match self {
      Self::Facebook => "Facebook",
      Self::Twitter => "Twitter",
      Self::Instagram => "Instagram",
    }
  }

  /// Brand color used by chart datasets.
  pub fn color(self) -> &'static str {
    match self {
      Self::Facebook => "#1877F2",
      Self::Twitter => "#1DA1F2",
      Self::Instagram => "#E1306C",
    }
  }

  pub fn handle_column(self) -> &'static str {
    match self {
      Self::Facebook => "facebook_id",
      Self::Twitter => "twitter_id",
      Self::Instagram => "instagram_id",
    }
  }

  pub fn followers_column(self) -> &'static str {
    match self {
      Self::Facebook => "facebook_followers",
      Self::Twitter => "twitter_followers",
      Self::Instagram => "instagram_followers",
    }
  }

  pub fn active_column(self) -> &'static str {
    match self {
      Self::Facebook => "facebook_active_status",
      Self::Twitter => "twitter_active_status",
      Self::Instagram => "instagram_active_status",
    }
  }

  pub fn verified_column(self) -> &'static str {
    match self {
      Self::Facebook => "facebook_verified_status",
      Self::Twitter => "twitter_verified_status",
      Self::Instagram => "instagram_verified_status",
    }
  }
}

/// A profile's account on one platform.
///
/// Status flags are tri-state: `None` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialAccount {
  #[serde(rename = "id", default)]
  pub handle: Option<String>,
  #[serde(default)]
  pub followers: Option<i64>,
  #[serde(default)]
  pub active: Option<bool>,
  #[serde(default)]
  pub verified: Option<bool>,
}

impl SocialAccount {
  fn from_row(row: &Row<'_>, platform: Platform) -> rusqlite::Result<Self> {
    Ok(Self {
      handle: row.get(platform.handle_column())?,
      followers: row.get(platform.followers_column())?,
      active: row.get(platform.active_column())?,
      verified: row.get(platform.verified_column())?,
    })
  }

  fn is_empty(&self) -> bool {
    self.handle.is_none() && self.followers.is_none() && self.active.is_none() && self.verified.is_none()
  }
}

/// Profile attributes without identity or timestamps.
///
/// Used as the create payload (name required) and as the update payload, where
/// every `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
  #[serde(default)]
  pub zone: Option<String>,
  #[serde(default)]
  pub party_district: Option<String>,
  #[serde(default)]
  pub constituency: Option<String>,
  #[serde(default)]
  pub designation: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub whatsapp_number: Option<String>,
  #[serde(default)]
  pub dob: Option<NaiveDate>,
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub email_id: Option<String>,
  #[serde(default)]
  pub facebook: SocialAccount,
  #[serde(default)]
  pub twitter: SocialAccount,
  #[serde(default)]
  pub instagram: SocialAccount,
}

impl ProfileData {
  pub fn account(&self, platform: Platform) -> &SocialAccount {
    match platform {
      Platform::Facebook => &self.facebook,
      Platform::Twitter => &self.twitter,
      Platform::Instagram => &self.instagram,
    }
  }

  /// Every writable column paired with its value, `None` where unset.
  pub fn column_values(&self) -> Vec<(&'static str, Option<Value>)> {
    let mut columns = vec![
      ("zone", text(&self.zone)),
      ("party_district", text(&self.party_district)),
      ("constituency", text(&self.constituency)),
      ("designation", text(&self.designation)),
      ("name", text(&self.name)),
      ("whatsapp_number", text(&self.whatsapp_number)),
      (
        "dob",
        self
          .dob
          .map(|d| Value::Text(d.format("%Y-%m-%d").to_string())),
      ),
      ("address", text(&self.address)),
      ("email_id", text(&self.email_id)),
    ];

    for platform in Platform::ALL {
      let account = self.account(platform);
      columns.push((platform.handle_column(), text(&account.handle)));
      columns.push((platform.followers_column(), account.followers.map(Value::Integer)));
      columns.push((platform.active_column(), account.active.map(Value::from)));
      columns.push((platform.verified_column(), account.verified.map(Value::from)));
    }

    columns
  }

  pub fn is_empty(&self) -> bool {
    self.zone.is_none()
      && self.party_district.is_none()
      && self.constituency.is_none()
      && self.designation.is_none()
      && self.name.is_none()
      && self.whatsapp_number.is_none()
      && self.dob.is_none()
      && self.address.is_none()
      && self.email_id.is_none()
      && Platform::ALL.iter().all(|p| self.account(*p).is_empty())
  }

  /// Checks for a create payload: a non-blank name plus field limits.
  pub fn validate_new(&self) -> Result<()> {
    match self.name.as_deref().map(str::trim) {
      None | Some("") => return Err(DirectoryError::Validation("name is required".into())),
      Some(_) => {}
    }
    self.validate_fields()
  }

  /// Checks for an update payload: at least one field plus field limits.
  pub fn validate_patch(&self) -> Result<()> {
    if self.is_empty() {
      return Err(DirectoryError::Validation(
        "at least one field must be provided for an update".into(),
      ));
    }
    self.validate_fields()
  }

  fn validate_fields(&self) -> Result<()> {
    check_len("zone", &self.zone, 200)?;
    check_len("party_district", &self.party_district, 200)?;
    check_len("constituency", &self.constituency, 200)?;
    check_len("designation", &self.designation, 200)?;
    check_len("name", &self.name, 500)?;
    check_len("whatsapp_number", &self.whatsapp_number, 50)?;
    check_len("email_id", &self.email_id, 500)?;

    if let Some(email) = &self.email_id {
      if !looks_like_email(email) {
        return Err(DirectoryError::Validation(format!(
          "email_id '{}' is not a valid address",
          email
        )));
      }
    }

    for platform in Platform::ALL {
      let account = self.account(platform);
      check_len(platform.handle_column(), &account.handle, 500)?;
      if let Some(n) = account.followers {
        if !(0..=MAX_FOLLOWERS).contains(&n) {
          return Err(DirectoryError::Validation(format!(
            "{} must be between 0 and {}",
            platform.followers_column(),
            MAX_FOLLOWERS
          )));
        }
      }
    }

    Ok(())
  }
}

/// A stored profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub id: i64,
  #[serde(flatten)]
  pub data: ProfileData,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Profile {
  /// Map a row selected with [`PROFILE_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id: row.get("id")?,
      data: ProfileData {
        zone: row.get("zone")?,
        party_district: row.get("party_district")?,
        constituency: row.get("constituency")?,
        designation: row.get("designation")?,
        name: row.get("name")?,
        whatsapp_number: row.get("whatsapp_number")?,
        dob: row.get("dob")?,
        address: row.get("address")?,
        email_id: row.get("email_id")?,
        facebook: SocialAccount::from_row(row, Platform::Facebook)?,
        twitter: SocialAccount::from_row(row, Platform::Twitter)?,
        instagram: SocialAccount::from_row(row, Platform::Instagram)?,
      },
      created_at: row.get("created_at")?,
      updated_at: row.get("updated_at")?,
    })
  }
}

/// Follower and status totals for one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
  pub active: i64,
  pub verified: i64,
  pub followers: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
  pub label: String,
  pub count: i64,
}

/// Dashboard summary across the whole directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryStats {
  pub total: i64,
  pub facebook: PlatformStats,
  pub twitter: PlatformStats,
  pub instagram: PlatformStats,
  pub by_designation: Vec<LabelCount>,
  pub by_zone: Vec<LabelCount>,
}

/// Distinct values available for each categorical filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
  pub zones: Vec<String>,
  pub party_districts: Vec<String>,
  pub constituencies: Vec<String>,
  pub designations: Vec<String>,
}

/// Chart payload: one label per bar, one or more datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
  pub labels: Vec<String>,
  pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
  pub label: String,
  pub data: Vec<i64>,
  pub background_color: Colors,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Colors {
  Single(String),
  PerBar(Vec<String>),
}

impl Chart {
  pub fn single(labels: Vec<String>, label: &str, data: Vec<i64>, color: &str) -> Self {
    Self {
      labels,
      datasets: vec![Dataset {
        label: label.to_string(),
        data,
        background_color: Colors::Single(color.to_string()),
      }],
    }
  }

  /// One bar per platform, colored by brand.
  pub fn per_platform(label: &str, data: Vec<i64>) -> Self {
    Self {
      labels: Platform::ALL.iter().map(|p| p.display_name().to_string()).collect(),
      datasets: vec![Dataset {
        label: label.to_string(),
        data,
        background_color: Colors::PerBar(Platform::ALL.iter().map(|p| p.color().to_string()).collect()),
      }],
    }
  }
}

fn text(value: &Option<String>) -> Option<Value> {
  value.clone().map(Value::Text)
}

fn check_len(field: &str, value: &Option<String>, max: usize) -> Result<()> {
  match value {
    Some(v) if v.chars().count() > max => Err(DirectoryError::Validation(format!(
      "{} must be at most {} characters",
      field, max
    ))),
    _ => Ok(()),
  }
}

fn looks_like_email(s: &str) -> bool {
  if s.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = s.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && domain.contains('.')
    && domain.split('.').all(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn named(name: &str) -> ProfileData {
    ProfileData {
      name: Some(name.to_string()),
      ..Default::default()
    }
  }

  #[test]
  fn test_create_requires_name() {
    assert!(named("Asha").validate_new().is_ok());
    assert!(matches!(
      named("   ").validate_new(),
      Err(DirectoryError::Validation(_))
    ));
    assert!(ProfileData::default().validate_new().is_err());
  }

  #[test]
  fn test_patch_requires_a_field() {
    assert!(ProfileData::default().validate_patch().is_err());

    let mut patch = ProfileData::default();
    patch.twitter.verified = Some(true);
    assert!(patch.validate_patch().is_ok());
  }

  #[test]
  fn test_field_limits() {
    let mut data = named("Asha");
    data.zone = Some("z".repeat(201));
    assert!(data.validate_new().is_err());

    let mut data = named("Asha");
    data.instagram.followers = Some(-1);
    assert!(data.validate_new().is_err());
    data.instagram.followers = Some(MAX_FOLLOWERS);
    assert!(data.validate_new().is_ok());
    data.instagram.followers = Some(i64::MAX / 2 + 1);
    assert!(matches!(data.validate_new(), Err(DirectoryError::Validation(_))));

    let mut data = named("Asha");
    data.email_id = Some("asha@example".to_string());
    assert!(data.validate_new().is_err());
    data.email_id = Some("asha@example.org".to_string());
    assert!(data.validate_new().is_ok());
  }

  #[test]
  fn test_column_values_cover_every_writable_column() {
    let columns = named("Asha").column_values();
    assert_eq!(columns.len(), 21);
    let set: Vec<_> = columns.iter().filter(|(_, v)| v.is_some()).collect();
    assert_eq!(set.len(), 1);
    assert_eq!(set[0].0, "name");
  }

  #[test]
  fn test_profile_json_shape() {
    let mut data = named("Asha");
    data.facebook.handle = Some("asha.fb".to_string());
    data.facebook.followers = Some(10);
    let profile = Profile {
      id: 4,
      data,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    };

    let json = serde_json::to_value(&profile).unwrap();
    assert_eq!(json["id"], 4);
    assert_eq!(json["name"], "Asha");
    assert_eq!(json["facebook"]["id"], "asha.fb");
    assert_eq!(json["facebook"]["followers"], 10);

    let back: Profile = serde_json::from_value(json).unwrap();
    assert_eq!(back, profile);
  }
}
