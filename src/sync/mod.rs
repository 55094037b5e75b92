//! Playlist synchronization: fetching new entries and persisting them.

mod fetcher;
mod updater;

use std::time::Duration;

pub use fetcher::{FetchOutcome, ItemFetcher};
pub use updater::{PlaylistReport, UpdateReport, Updater};

/// Knobs of one update run.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOptions {
    /// Failed resolutions after which an entry is never tried again.
    pub max_fail: u32,
    /// Number of entries inspected per non-reversed playlist.
    pub max_backlog: usize,
    pub playlist_concurrency: usize,
    pub resolve_concurrency: usize,
    /// Limit for every single extractor call.
    pub timeout: Duration,
    /// Highest accepted age limit.
    pub age_limit: u32,
    pub skip_live_stream: bool,
}

impl UpdateOptions {
    pub fn new(max_fail: u32, max_backlog: usize) -> Self {
        Self {
            max_fail,
            max_backlog,
            ..Default::default()
        }
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            max_fail: 5,
            max_backlog: 20,
            playlist_concurrency: 4,
            resolve_concurrency: 8,
            timeout: Duration::from_secs(120),
            age_limit: 0,
            skip_live_stream: true,
        }
    }
}
