//! Profile directory service.
//!
//! Profiles live in SQLite. Listings page by keyset cursor, dashboard numbers
//! come from single-pass aggregation, and every read goes through a lookaside
//! cache that is purged namespace by namespace after each write.

pub mod cache;
pub mod config;
pub mod db;
pub mod directory;
pub mod engine;
pub mod error;
pub mod logging;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use directory::{ListQuery, ProfileDirectory};
pub use error::{DirectoryError, Result};
