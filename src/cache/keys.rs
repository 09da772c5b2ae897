//! Cache namespaces and stable key derivation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Hex characters of the digest kept in a key.
const DIGEST_LEN: usize = 16;

/// Group of cache entries that are always invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
  Listing,
  Stats,
  Analytics,
  Options,
}

impl Namespace {
  pub const ALL: [Namespace; 4] = [
    Namespace::Listing,
    Namespace::Stats,
    Namespace::Analytics,
    Namespace::Options,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Listing => "listing",
      Self::Stats => "stats",
      Self::Analytics => "analytics",
      Self::Options => "options",
    }
  }

  /// Prefix shared by every key in this namespace, separator included.
  pub fn prefix(self) -> String {
    format!("{}:", self.as_str())
  }
}

impl fmt::Display for Namespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Parameters identifying one cached read.
///
/// Parts live in a `BTreeMap`, so the order they were added in never reaches
/// the serialized form. Null parts are dropped: an absent filter and an
/// explicit `None` describe the same query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyParts(BTreeMap<String, Value>);

impl KeyParts {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: &str, value: impl Serialize) -> Self {
    self.insert(name, value);
    self
  }

  pub fn insert(&mut self, name: &str, value: impl Serialize) {
    match serde_json::to_value(value) {
      Ok(Value::Null) | Err(_) => {
        self.0.remove(name);
      }
      Ok(v) => {
        self.0.insert(name.to_string(), v);
      }
    }
  }

  /// Merge the fields of a serializable struct (e.g. a filter set) as parts.
  pub fn extend_from(mut self, value: &impl Serialize) -> Self {
    if let Ok(Value::Object(fields)) = serde_json::to_value(value) {
      for (name, v) in fields {
        self.insert(&name, v);
      }
    }
    self
  }
}

/// `namespace:` followed by a truncated SHA-256 of the canonical parts.
pub fn derive_key(namespace: Namespace, parts: &KeyParts) -> String {
  // serde_json writes maps in key order and BTreeMap iterates sorted, so the
  // encoding is canonical.
  let canonical = serde_json::json!([namespace.as_str(), parts]).to_string();

  let mut hasher = Sha256::new();
  hasher.update(canonical.as_bytes());
  let digest = hex::encode(hasher.finalize());

  format!("{}{}", namespace.prefix(), &digest[..DIGEST_LEN])
}

/// A cacheable read, identified by its namespace and parameters.
pub trait QueryKey {
  fn namespace(&self) -> Namespace;

  fn key_parts(&self) -> KeyParts;

  /// Human-readable description for logs.
  fn description(&self) -> String;

  fn cache_key(&self) -> String {
    derive_key(self.namespace(), &self.key_parts())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::filters::ProfileFilters;

  #[test]
  fn test_key_shape() {
    let key = derive_key(Namespace::Stats, &KeyParts::new());
    assert!(key.starts_with("stats:"));
    assert_eq!(key.len(), "stats:".len() + DIGEST_LEN);
    assert!(key["stats:".len()..].chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_key_is_order_independent() {
    let a = KeyParts::new()
      .with("zone", "North")
      .with("cursor", 40)
      .with("limit", 20);
    let b = KeyParts::new()
      .with("limit", 20)
      .with("zone", "North")
      .with("cursor", 40);
    assert_eq!(
      derive_key(Namespace::Listing, &a),
      derive_key(Namespace::Listing, &b)
    );
  }

  #[test]
  fn test_null_parts_are_dropped() {
    let none: Option<String> = None;
    let with_null = KeyParts::new().with("zone", none).with("limit", 20);
    let without = KeyParts::new().with("limit", 20);
    assert_eq!(with_null, without);

    let filters = ProfileFilters {
      zone: Some("North".into()),
      ..Default::default()
    };
    let parts = KeyParts::new().extend_from(&filters);
    let expected = KeyParts::new()
      .with("zone", "North")
      .with("active_only", false)
      .with("verified_only", false);
    assert_eq!(parts, expected);
  }

  #[test]
  fn test_namespace_and_params_separate_keys() {
    let parts = KeyParts::new().with("zone", "North");
    assert_ne!(
      derive_key(Namespace::Stats, &parts),
      derive_key(Namespace::Analytics, &parts)
    );
    assert_ne!(
      derive_key(Namespace::Stats, &parts),
      derive_key(Namespace::Stats, &KeyParts::new().with("zone", "South"))
    );
  }
}
