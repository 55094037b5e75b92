use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{CleanupPolicy, OrderBy};
use crate::sync::UpdateOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractorKind {
    #[default]
    #[serde(rename = "yt-dlp")]
    YtDlp,
    #[serde(rename = "feed")]
    Feed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: String,

    pub max_backlog: usize,
    pub max_fail: u32,
    pub age_limit: u32,
    pub skip_live_stream: bool,

    pub playlist_concurrency: usize,
    pub resolve_concurrency: usize,
    pub extraction_timeout_secs: u64,

    pub extractor: ExtractorKind,
    pub ytdlp_path: String,

    pub player_path: String,
    pub player_flags: Vec<String>,

    /// Default listing order, e.g. `["playlist_name", "publish_date:desc"]`.
    pub order_by: Vec<String>,

    pub cleanup_keep: usize,
    pub cleanup_policy: CleanupPolicy,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("playlist-sync");
    data_dir.join("playlist-sync.db").to_string_lossy().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_backlog: 20,
            max_fail: 5,
            age_limit: 0,
            skip_live_stream: true,
            playlist_concurrency: 4,
            resolve_concurrency: 8,
            extraction_timeout_secs: 120,
            extractor: ExtractorKind::default(),
            ytdlp_path: "yt-dlp".to_string(),
            player_path: "mpv".to_string(),
            player_flags: vec!["--really-quiet".to_string(), "--no-terminal".to_string()],
            order_by: vec!["playlist_name".to_string(), "publish_date:desc".to_string()],
            cleanup_keep: 30,
            cleanup_policy: CleanupPolicy::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads the config at `path`, writing the defaults there first if the
    /// file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.order_by()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("playlist-sync")
            .join("config.toml")
    }

    pub fn order_by(&self) -> Result<Vec<OrderBy>> {
        self.order_by.iter().map(|s| s.parse()).collect()
    }

    pub fn update_options(&self) -> UpdateOptions {
        UpdateOptions {
            max_fail: self.max_fail,
            max_backlog: self.max_backlog,
            playlist_concurrency: self.playlist_concurrency,
            resolve_concurrency: self.resolve_concurrency,
            timeout: Duration::from_secs(self.extraction_timeout_secs),
            age_limit: self.age_limit,
            skip_live_stream: self.skip_live_stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemAttribute;

    #[test]
    fn writes_defaults_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.max_backlog, 20);
        assert_eq!(config.max_fail, 5);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn saved_changes_are_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::load_from(&path).unwrap();
        config.max_backlog = 7;
        config.extractor = ExtractorKind::Feed;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            max_fail = 3
            extractor = "feed"
            cleanup_policy = "any_playlist"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_fail, 3);
        assert_eq!(config.extractor, ExtractorKind::Feed);
        assert_eq!(config.cleanup_policy, CleanupPolicy::AnyPlaylist);
        assert_eq!(config.player_path, "mpv");
        assert_eq!(config.update_options().timeout, Duration::from_secs(120));
    }

    #[test]
    fn parses_order_by() {
        let config = Config::default();
        assert_eq!(
            config.order_by().unwrap(),
            vec![
                OrderBy::asc(ItemAttribute::PlaylistName),
                OrderBy::desc(ItemAttribute::PublishDate)
            ]
        );
    }

    #[test]
    fn rejects_unknown_order_by_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "order_by = [\"title\", \"views:desc\"]\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
    }
}
