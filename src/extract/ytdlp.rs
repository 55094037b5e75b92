use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio::process::Command;

use super::{Entry, Extractor, Metadata, Thumbnail};
use crate::error::{AppError, Result};

/// Output of `yt-dlp --flat-playlist --dump-single-json`.
#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    #[serde(rename = "_type")]
    kind: Option<String>,
    webpage_url: Option<String>,
    extractor_key: Option<String>,
    #[serde(default)]
    entries: Vec<FlatEntry>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    ie_key: Option<String>,
    url: Option<String>,
    title: Option<String>,
}

/// Output of `yt-dlp --dump-json` for a single video.
#[derive(Debug, Default, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    description: Option<String>,
    duration: Option<f64>,
    timestamp: Option<f64>,
    upload_date: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<ThumbnailInfo>,
    age_limit: Option<u32>,
    is_live: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailInfo {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

impl From<VideoInfo> for Metadata {
    fn from(info: VideoInfo) -> Self {
        let publish_date = info
            .timestamp
            .and_then(|ts| DateTime::from_timestamp(ts as i64, 0))
            .or_else(|| info.upload_date.as_deref().and_then(parse_upload_date));

        Metadata {
            title: info.title,
            url: info.webpage_url,
            description: info.description,
            duration: info.duration,
            publish_date,
            thumbnail: info.thumbnail,
            thumbnails: info
                .thumbnails
                .into_iter()
                .map(|t| Thumbnail {
                    url: t.url,
                    width: t.width,
                    height: t.height,
                })
                .collect(),
            age_limit: info.age_limit,
            is_live: info.is_live.unwrap_or(false),
        }
    }
}

/// `upload_date` comes as `YYYYMMDD`.
fn parse_upload_date(date: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(date, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

pub struct YtDlpExtractor {
    binary: String,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        tracing::debug!("Running {} {:?}", self.binary, args);

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::Extraction(format!("Could not run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Extraction(stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }

    async fn flat_playlist(&self, url: &str, window: Option<usize>) -> Result<FlatPlaylist> {
        let end = window.map(|w| w.to_string());
        let mut args = vec!["--flat-playlist", "--dump-single-json", "--no-warnings"];
        if let Some(end) = &end {
            args.push("--playlist-end");
            args.push(end);
        }
        args.push("--");
        args.push(url);

        let stdout = self.run(&args).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }
}

fn into_entries(playlist: FlatPlaylist) -> Vec<Entry> {
    let fallback_source = playlist.extractor_key;
    playlist
        .entries
        .into_iter()
        .map(|e| Entry {
            id: e.id,
            source: e.ie_key.or_else(|| fallback_source.clone()),
            url: e.url,
            title: e.title,
        })
        .collect()
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn list_entries(&self, url: &str, window: Option<usize>) -> Result<Vec<Entry>> {
        let playlist = self.flat_playlist(url, window).await?;
        Ok(into_entries(playlist))
    }

    async fn resolve(&self, entry: &Entry) -> Result<Metadata> {
        let target = entry
            .url
            .as_deref()
            .or(entry.id.as_deref())
            .ok_or_else(|| AppError::MalformedEntry("entry has neither url nor id".into()))?;

        let stdout = self
            .run(&["--dump-json", "--no-warnings", "--no-playlist", "--", target])
            .await?;
        let info: VideoInfo = serde_json::from_slice(&stdout)?;
        Ok(info.into())
    }

    async fn probe(&self, url: &str) -> Result<String> {
        let playlist = self.flat_playlist(url, Some(1)).await.map_err(|e| {
            tracing::debug!("Probing {} failed: {}", url, e);
            AppError::BadSource(url.to_string())
        })?;

        if playlist.kind.as_deref() != Some("playlist") {
            return Err(AppError::BadSource(url.to_string()));
        }
        Ok(playlist.webpage_url.unwrap_or_else(|| url.to_string()))
    }
}
