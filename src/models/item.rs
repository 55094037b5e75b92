use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Playlist;

/// Publish timestamp used when the source does not report one.
pub const MIN_PUBLISH_TIMESTAMP: i64 = 169_201;

/// A resolved item that has not been written to the store yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub title: String,
    pub url: String,
    pub description: String,
    /// Length in seconds, `None` if the source does not know it.
    pub duration: Option<f64>,
    pub publish_date: DateTime<Utc>,
    pub watch_date: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
    pub content_hash: String,
}

/// An item as stored, with every playlist it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedItem {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: String,
    pub duration: Option<f64>,
    pub publish_date: DateTime<Utc>,
    pub watch_date: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
    pub content_hash: String,
    pub playlists: Vec<Playlist>,
}

impl MappedItem {
    pub fn is_watched(&self) -> bool {
        self.watch_date.is_some()
    }
}
