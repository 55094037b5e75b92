mod migration;
mod query;
mod repository;
mod schema;

use chrono::{DateTime, Utc};

pub use migration::MigrationError;
pub use repository::Repository;
pub use schema::{CURRENT_VERSION, MIN_SUPPORTED_VERSION};

/// Timestamps are stored as fractional unix seconds.
pub(crate) fn to_epoch(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

pub(crate) fn from_epoch(secs: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64).unwrap_or_default()
}
