//! Public facade over the store, the engines and the cache.

pub mod analytics;
mod export;
pub mod keys;
pub mod repository;
pub mod service;
pub mod types;

pub use analytics::AnalyticsChart;
pub use export::EXPORT_FIELDS;
pub use keys::DirectoryQuery;
pub use service::{connect_cache, ListQuery, ProfileDirectory};
pub use types::{Chart, DirectoryStats, FilterOptions, Platform, Profile, ProfileData, SocialAccount};
