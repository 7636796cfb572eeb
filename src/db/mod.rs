//! # Database
//!
//! Postgres pool shared by the relay (one connection per live session)
//! and the read-only stats and aggregate endpoints.

mod analytics;
mod errors;
mod pool;

pub use analytics::{
    histogram, kpis, trend, value_range, Bucket, Kpis, MetricColumn, QueryFilters, TrendPoint,
};
pub use errors::{DbError, DbResult};
pub use pool::{connect, row_count, DatabaseConfig};
