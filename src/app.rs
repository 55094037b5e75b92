use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, ExtractorKind};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::extract::{Extractor, FeedExtractor, YtDlpExtractor};
use crate::models::{CleanupPolicy, ItemFilter, MappedItem, MappedPlaylist, OrderBy};
use crate::player::{MpvPlayer, Player};
use crate::subscriptions::parse_opml_file;
use crate::sync::{UpdateOptions, UpdateReport, Updater};

pub struct App {
    pub repository: Repository,
    extractor: Arc<dyn Extractor>,
    player: Box<dyn Player>,
    options: UpdateOptions,
    order_by: Vec<OrderBy>,
    cleanup_policy: CleanupPolicy,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;

        let extractor: Arc<dyn Extractor> = match config.extractor {
            ExtractorKind::YtDlp => Arc::new(YtDlpExtractor::new(config.ytdlp_path.clone())),
            ExtractorKind::Feed => Arc::new(FeedExtractor::new()?),
        };
        let player = Box::new(MpvPlayer::new(
            config.player_path.clone(),
            config.player_flags.clone(),
        ));

        Self::with_parts(repository, extractor, player, config)
    }

    /// Assembles an app from already constructed collaborators.
    pub fn with_parts(
        repository: Repository,
        extractor: Arc<dyn Extractor>,
        player: Box<dyn Player>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            repository,
            extractor,
            player,
            options: config.update_options(),
            order_by: config.order_by()?,
            cleanup_policy: config.cleanup_policy,
        })
    }

    /// Adds a playlist after checking that the URL resolves to one.
    pub async fn subscribe(&self, name: &str, url: &str, reverse: bool) -> Result<()> {
        let canonical = self.extractor.probe(url).await?;
        self.repository.add_playlist(name, &canonical, reverse).await?;
        tracing::info!("Subscribed to '{}' ({})", name, canonical);
        Ok(())
    }

    pub async fn unsubscribe(&self, name: &str) -> Result<()> {
        if !self.repository.delete_playlist(name).await? {
            return Err(AppError::PlaylistNotFound(name.to_string()));
        }
        Ok(())
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        if !self.repository.rename_playlist(old, new).await? {
            return Err(AppError::PlaylistNotFound(old.to_string()));
        }
        Ok(())
    }

    pub async fn reverse(&self, name: &str) -> Result<()> {
        if !self.repository.reverse_playlist(name).await? {
            return Err(AppError::PlaylistNotFound(name.to_string()));
        }
        Ok(())
    }

    pub async fn tag(&self, name: &str, tags: Vec<String>) -> Result<()> {
        self.repository.tag_playlist(name, tags).await
    }

    pub fn updater(&self) -> Updater<'_> {
        Updater::new(&self.repository, Arc::clone(&self.extractor), self.options.clone())
    }

    pub async fn update(&self) -> Result<UpdateReport> {
        self.updater().update().await
    }

    /// Lists items. Without explicit ids or order the configured default
    /// order applies.
    pub async fn list_items(&self, mut filter: ItemFilter) -> Result<Vec<MappedItem>> {
        if filter.ids.is_empty() && filter.order_by.is_empty() {
            filter.order_by = self.order_by.clone();
        }
        self.repository.list_items(filter).await
    }

    pub async fn list_playlists(&self) -> Result<Vec<MappedPlaylist>> {
        self.repository.list_playlists().await
    }

    pub async fn list_tags(&self) -> Result<Vec<String>> {
        self.repository.list_tags().await
    }

    pub async fn mark_watched(&self, ids: Vec<i64>) -> Result<usize> {
        self.repository.mark_watched(ids).await
    }

    pub async fn mark_unwatched(&self, ids: Vec<i64>) -> Result<usize> {
        self.repository.mark_unwatched(ids).await
    }

    pub async fn cleanup(&self, keep: usize) -> Result<usize> {
        self.repository.cleanup(keep, self.cleanup_policy).await
    }

    /// Plays the given items in order. An item is marked watched only when
    /// the player exits successfully. Returns the number of such items.
    pub async fn play(&self, ids: Vec<i64>) -> Result<usize> {
        let items = self
            .repository
            .list_items(ItemFilter {
                ids,
                ..Default::default()
            })
            .await?;

        let mut played = 0;
        for item in items {
            if self.player.play(&item.url).await? {
                self.repository.mark_watched(vec![item.id]).await?;
                played += 1;
            } else {
                tracing::warn!("Playback of '{}' failed, leaving it unwatched", item.title);
            }
        }
        Ok(played)
    }

    /// Subscribes to every playlist of an OPML file. Playlists that cannot
    /// be added are skipped. Returns the number of new subscriptions.
    pub async fn import_subscriptions(&self, path: &Path) -> Result<usize> {
        let playlists = parse_opml_file(path)?;

        let mut imported = 0;
        for playlist in playlists {
            match self.subscribe(&playlist.name, &playlist.url, playlist.reverse).await {
                Ok(()) => imported += 1,
                Err(AppError::NameConflict(_)) => {
                    tracing::warn!("'{}' is already subscribed, skipping", playlist.name);
                }
                Err(e) => {
                    tracing::warn!("Failed to import '{}': {}", playlist.name, e);
                }
            }
        }
        Ok(imported)
    }
}
