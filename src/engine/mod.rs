//! Query engines: filtering, keyset pagination and aggregation.

pub mod aggregation;
pub mod filters;
pub mod pagination;

pub use aggregation::{Aggregator, GroupSpec, RankMetric};
pub use filters::{ProfileFilters, SortColumn, SortOrder, SortSpec};
pub use pagination::{Page, PageRequest, Paginator, SortValue};
