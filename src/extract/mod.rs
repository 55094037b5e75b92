//! Access to remote playlists.
//!
//! The synchronization engine only talks to an [`Extractor`]. Two
//! implementations are provided: [`YtDlpExtractor`] drives the `yt-dlp`
//! binary, [`FeedExtractor`] reads RSS/Atom feeds.

mod feed;
mod ytdlp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

pub use feed::FeedExtractor;
pub use ytdlp::YtDlpExtractor;

/// A lightweight playlist entry as returned by enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Id of the item on its source site.
    pub id: Option<String>,
    /// Name of the site or extractor the id belongs to, e.g. `Youtube`.
    pub source: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

impl Entry {
    /// Stable identifier used to recognise an item across runs, independent
    /// of its URL and metadata.
    ///
    /// `"<source> <id>"` when both are known, otherwise a digest of the URL.
    pub fn content_hash(&self) -> Option<String> {
        match (&self.source, &self.id) {
            (Some(source), Some(id)) if !source.is_empty() && !id.is_empty() => {
                Some(format!("{} {}", source.to_lowercase(), id))
            }
            _ => self
                .url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(|url| format!("url {}", hex::encode(Sha256::digest(url.as_bytes())))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Thumbnail {
    fn pixels(&self) -> u64 {
        u64::from(self.width.unwrap_or(0)) * u64::from(self.height.unwrap_or(0))
    }
}

/// Everything the resolver learned about one entry. Fields are optional
/// because sources are unreliable; the fetcher decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub duration: Option<f64>,
    pub publish_date: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
    pub thumbnails: Vec<Thumbnail>,
    pub age_limit: Option<u32>,
    pub is_live: bool,
}

impl Metadata {
    /// The largest thumbnail, falling back to the single `thumbnail` field.
    pub fn best_thumbnail(&self) -> Option<String> {
        self.thumbnails
            .iter()
            .max_by_key(|t| t.pixels())
            .map(|t| t.url.clone())
            .or_else(|| self.thumbnail.clone())
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Enumerates the entries of a playlist in source order. With a window
    /// only the first `window` entries need to be returned.
    async fn list_entries(&self, url: &str, window: Option<usize>) -> Result<Vec<Entry>>;

    /// Fetches the full metadata of one entry.
    async fn resolve(&self, entry: &Entry) -> Result<Metadata>;

    /// Checks that `url` points to a playlist and returns its canonical URL.
    async fn probe(&self, url: &str) -> Result<String> {
        match self.list_entries(url, Some(1)).await {
            Ok(_) => Ok(url.to_string()),
            Err(e) => {
                tracing::debug!("Probing {} failed: {}", url, e);
                Err(AppError::BadSource(url.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_prefers_source_and_id() {
        let entry = Entry {
            id: Some("abc".into()),
            source: Some("Youtube".into()),
            url: Some("https://www.youtube.com/watch?v=abc".into()),
            title: None,
        };
        assert_eq!(entry.content_hash().as_deref(), Some("youtube abc"));
    }

    #[test]
    fn content_hash_falls_back_to_url_digest() {
        let entry = Entry {
            url: Some("https://example.com/a.mp3".into()),
            ..Default::default()
        };
        let hash = entry.content_hash().unwrap();
        assert!(hash.starts_with("url "));
        assert_eq!(hash.len(), 4 + 64);
        assert_eq!(entry.content_hash(), Some(hash));

        let other = Entry {
            url: Some("https://example.com/b.mp3".into()),
            ..Default::default()
        };
        assert_ne!(other.content_hash(), entry.content_hash());
    }

    #[test]
    fn content_hash_needs_some_identity() {
        let entry = Entry {
            id: Some("abc".into()),
            title: Some("no source".into()),
            ..Default::default()
        };
        assert_eq!(entry.content_hash(), None);
    }

    #[test]
    fn best_thumbnail_picks_highest_resolution() {
        let metadata = Metadata {
            thumbnail: Some("fallback".into()),
            thumbnails: vec![
                Thumbnail {
                    url: "small".into(),
                    width: Some(120),
                    height: Some(90),
                },
                Thumbnail {
                    url: "large".into(),
                    width: Some(1280),
                    height: Some(720),
                },
                Thumbnail {
                    url: "unknown".into(),
                    width: None,
                    height: None,
                },
            ],
            ..Default::default()
        };
        assert_eq!(metadata.best_thumbnail().as_deref(), Some("large"));

        let single = Metadata {
            thumbnail: Some("fallback".into()),
            ..Default::default()
        };
        assert_eq!(single.best_thumbnail().as_deref(), Some("fallback"));
    }
}
