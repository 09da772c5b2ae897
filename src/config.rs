use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{Namespace, TtlPolicy};
use crate::engine::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub store: StoreConfig,
  pub cache: CacheConfig,
  pub ttl: TtlConfig,
  pub pagination: PaginationConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Database file (defaults to the platform data directory)
  pub path: Option<PathBuf>,
  pub pool_size: usize,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      path: None,
      pool_size: 10,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// Per-process map; lost on exit
  Memory,
  /// SQLite file shared by processes on one host
  #[default]
  Sqlite,
  /// Shared Redis server
  Redis,
  /// Caching disabled
  None,
}

impl FromStr for CacheBackend {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "memory" => Ok(Self::Memory),
      "sqlite" => Ok(Self::Sqlite),
      "redis" => Ok(Self::Redis),
      "none" | "off" => Ok(Self::None),
      other => Err(eyre!(
        "Unknown cache backend '{}' (expected memory, sqlite, redis or none)",
        other
      )),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub backend: CacheBackend,
  pub redis_url: Option<String>,
  /// Namespace for redis keys when several deployments share a server
  pub key_prefix: Option<String>,
  /// SQLite cache file (defaults to the platform cache directory)
  pub path: Option<PathBuf>,
}

/// Seconds each namespace's entries live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
  pub stats: u64,
  pub analytics: u64,
  pub options: u64,
  pub listing: u64,
}

impl Default for TtlConfig {
  fn default() -> Self {
    Self {
      stats: 300,
      analytics: 300,
      options: 600,
      listing: 300,
    }
  }
}

impl TtlConfig {
  fn slot(&mut self, namespace: Namespace) -> &mut u64 {
    match namespace {
      Namespace::Listing => &mut self.listing,
      Namespace::Stats => &mut self.stats,
      Namespace::Analytics => &mut self.analytics,
      Namespace::Options => &mut self.options,
    }
  }

  pub fn policy(&self) -> TtlPolicy {
    TtlPolicy {
      listing: Duration::from_secs(self.listing),
      stats: Duration::from_secs(self.stats),
      analytics: Duration::from_secs(self.analytics),
      options: Duration::from_secs(self.options),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
  pub default_limit: u32,
  pub max_limit: u32,
}

impl Default for PaginationConfig {
  fn default() -> Self {
    Self {
      default_limit: DEFAULT_PAGE_SIZE,
      max_limit: MAX_PAGE_SIZE,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter directive when RUST_LOG is unset
  pub level: String,
  /// Write to a daily rolling file in the data directory instead of stderr
  pub file: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: false,
    }
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./profiledir.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/profiledir/config.yaml
  ///
  /// With no file found the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("profiledir.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("profiledir").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file deserializes to null rather than an empty mapping.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Apply overrides from `lookup` (the process environment in production).
  ///
  /// - `DATABASE_PATH`: store file
  /// - `REDIS_URL`: Redis server; also selects the redis backend unless
  ///   `PROFILEDIR_CACHE` says otherwise
  /// - `PROFILEDIR_CACHE`: memory, sqlite, redis or none
  /// - `TTL_<NAMESPACE>_SECONDS`: per-namespace TTL, e.g. `TTL_STATS_SECONDS`
  pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(path) = lookup("DATABASE_PATH").filter(|s| !s.is_empty()) {
      self.store.path = Some(PathBuf::from(path));
    }

    if let Some(url) = lookup("REDIS_URL").filter(|s| !s.is_empty()) {
      self.cache.redis_url = Some(url);
      self.cache.backend = CacheBackend::Redis;
    }

    if let Some(backend) = lookup("PROFILEDIR_CACHE").filter(|s| !s.is_empty()) {
      self.cache.backend = backend.parse()?;
    }

    for namespace in Namespace::ALL {
      let key = format!("TTL_{}_SECONDS", namespace.as_str().to_ascii_uppercase());
      if let Some(raw) = lookup(&key) {
        let seconds = raw
          .trim()
          .parse::<u64>()
          .map_err(|e| eyre!("Invalid {} '{}': {}", key, raw, e))?;
        *self.ttl.slot(namespace) = seconds;
      }
    }

    Ok(())
  }

  pub fn validate(&self) -> Result<()> {
    let p = &self.pagination;
    if p.max_limit == 0 || p.max_limit > MAX_PAGE_SIZE {
      return Err(eyre!(
        "pagination.max_limit must be between 1 and {}, got {}",
        MAX_PAGE_SIZE,
        p.max_limit
      ));
    }
    if p.default_limit == 0 || p.default_limit > p.max_limit {
      return Err(eyre!(
        "pagination.default_limit must be between 1 and max_limit ({}), got {}",
        p.max_limit,
        p.default_limit
      ));
    }
    if self.store.pool_size == 0 {
      return Err(eyre!("store.pool_size must be at least 1"));
    }
    if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
      return Err(eyre!("cache.backend is redis but no redis_url (or REDIS_URL) is set"));
    }
    Ok(())
  }

  /// Store file from config, or the platform default.
  pub fn store_path(&self) -> Result<PathBuf> {
    self
      .store
      .path
      .clone()
      .or_else(crate::db::SqliteStore::default_path)
      .ok_or_else(|| eyre!("Could not determine data directory; set store.path or DATABASE_PATH"))
  }
}
