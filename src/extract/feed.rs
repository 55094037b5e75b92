use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::Entry as FeedEntry;
use feed_rs::parser;
use reqwest::Client;
use tokio::sync::Mutex;

use super::{Entry, Extractor, Metadata, Thumbnail};
use crate::error::{AppError, Result};

const YOUTUBE_VIDEO_PREFIX: &str = "yt:video:";

/// Reads playlists published as RSS or Atom feeds.
///
/// Feeds carry full metadata, so enumeration already knows everything.
/// The metadata of the latest listing of every feed is kept for `resolve`.
pub struct FeedExtractor {
    client: Client,
    /// Feed URL -> content hash -> metadata.
    listed: Mutex<HashMap<String, HashMap<String, Metadata>>>,
}

impl FeedExtractor {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("playlist-sync/1.0")
            .build()?;

        Ok(Self {
            client,
            listed: Mutex::new(HashMap::new()),
        })
    }

    async fn fetch(&self, url: &str) -> Result<(String, feed_rs::model::Feed)> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let final_url = response.url().to_string();
        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;
        Ok((final_url, feed))
    }

    /// Turns a fetched feed into entries and replaces whatever was kept from
    /// the previous listing of `url`.
    async fn remember(&self, url: &str, feed: &feed_rs::model::Feed, window: Option<usize>) -> Vec<Entry> {
        let source = feed_source(url);
        let limit = window.unwrap_or(usize::MAX);

        let mut entries = Vec::new();
        let mut metadata_by_hash = HashMap::new();
        for feed_entry in feed.entries.iter().take(limit) {
            let metadata = to_metadata(feed_entry);
            let (source, id) = entry_identity(&feed_entry.id, source.as_deref());
            let entry = Entry {
                id,
                source,
                url: metadata.url.clone(),
                title: metadata.title.clone(),
            };
            if let Some(hash) = entry.content_hash() {
                metadata_by_hash.insert(hash, metadata);
            }
            entries.push(entry);
        }

        self.listed
            .lock()
            .await
            .insert(url.to_string(), metadata_by_hash);
        entries
    }
}

/// Host of the feed, used as the source of entries without a better one.
fn feed_source(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

/// Splits a feed entry id into (source, id). YouTube feeds use
/// `yt:video:<id>`, which maps onto the same hash yt-dlp produces.
fn entry_identity(id: &str, fallback_source: Option<&str>) -> (Option<String>, Option<String>) {
    if id.is_empty() {
        return (None, None);
    }
    match id.strip_prefix(YOUTUBE_VIDEO_PREFIX) {
        Some(video) => (Some("youtube".to_string()), Some(video.to_string())),
        None => (fallback_source.map(str::to_string), Some(id.to_string())),
    }
}

fn to_metadata(entry: &FeedEntry) -> Metadata {
    let content_html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_ref())
        .or_else(|| entry.summary.as_ref().map(|s| &s.content))
        .or_else(|| {
            entry
                .media
                .iter()
                .find_map(|m| m.description.as_ref().map(|d| &d.content))
        });

    let description = content_html.and_then(|html| html2text::from_read(html.as_bytes(), 80).ok());

    let thumbnails = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| Thumbnail {
            url: t.image.uri.clone(),
            width: t.image.width,
            height: t.image.height,
        })
        .collect();

    Metadata {
        title: entry.title.as_ref().map(|t| t.content.clone()),
        url: entry.links.first().map(|l| l.href.clone()),
        description,
        duration: entry
            .media
            .iter()
            .find_map(|m| m.duration)
            .map(|d| d.as_secs_f64()),
        publish_date: entry.published.or(entry.updated),
        thumbnail: None,
        thumbnails,
        age_limit: None,
        is_live: false,
    }
}

#[async_trait]
impl Extractor for FeedExtractor {
    async fn list_entries(&self, url: &str, window: Option<usize>) -> Result<Vec<Entry>> {
        let (_, feed) = self.fetch(url).await?;
        let entries = self.remember(url, &feed, window).await;

        tracing::debug!("Fetched {} entries from {}", entries.len(), url);
        Ok(entries)
    }

    /// Looks the entry up in the listings kept so far. The same item may be
    /// listed by several feeds; every one of them can resolve it.
    async fn resolve(&self, entry: &Entry) -> Result<Metadata> {
        let hash = entry
            .content_hash()
            .ok_or_else(|| AppError::MalformedEntry("entry has no identity".into()))?;

        self.listed
            .lock()
            .await
            .values()
            .find_map(|by_hash| by_hash.get(&hash).cloned())
            .ok_or_else(|| AppError::Extraction(format!("{} was not listed by any feed", hash)))
    }

    async fn probe(&self, url: &str) -> Result<String> {
        match self.fetch(url).await {
            Ok((final_url, _)) => Ok(final_url),
            Err(e) => {
                tracing::debug!("Probing {} failed: {}", url, e);
                Err(AppError::BadSource(url.to_string()))
            }
        }
    }
}
