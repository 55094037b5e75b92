use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{ItemFetcher, UpdateOptions};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::extract::Extractor;
use crate::models::Playlist;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaylistReport {
    pub name: String,
    /// New items linked to the playlist.
    pub added: usize,
    /// Entries that could not be resolved.
    pub failed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub playlists: Vec<PlaylistReport>,
}

impl UpdateReport {
    pub fn added(&self) -> usize {
        self.playlists.iter().map(|p| p.added).sum()
    }

    pub fn failed(&self) -> usize {
        self.playlists.iter().map(|p| p.failed).sum()
    }

    pub fn errors(&self) -> impl Iterator<Item = &PlaylistReport> {
        self.playlists.iter().filter(|p| p.error.is_some())
    }

    pub fn get(&self, name: &str) -> Option<&PlaylistReport> {
        self.playlists.iter().find(|p| p.name == name)
    }
}

/// Brings every subscribed playlist up to date.
pub struct Updater<'a> {
    repository: &'a Repository,
    fetcher: ItemFetcher,
    options: UpdateOptions,
    cancel: CancellationToken,
}

impl<'a> Updater<'a> {
    pub fn new(repository: &'a Repository, extractor: Arc<dyn Extractor>, options: UpdateOptions) -> Self {
        Self {
            repository,
            fetcher: ItemFetcher::new(extractor, options.clone()),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops in-flight extractor calls when cancelled. Results of
    /// calls that already finished are still stored.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Updates all playlists concurrently and waits for every one of them.
    /// A failing playlist is logged and reported without affecting the
    /// others; only failing to list the playlists is an error.
    pub async fn update(&self) -> Result<UpdateReport> {
        let playlists = self.repository.list_playlists().await?;
        tracing::info!("Updating {} playlists", playlists.len());

        let mut reports: Vec<PlaylistReport> = stream::iter(playlists)
            .map(|playlist| self.update_playlist(playlist.into()))
            .buffer_unordered(self.options.playlist_concurrency.max(1))
            .collect()
            .await;
        reports.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(UpdateReport { playlists: reports })
    }

    async fn update_playlist(&self, playlist: Playlist) -> PlaylistReport {
        let mut report = PlaylistReport {
            name: playlist.name.clone(),
            ..Default::default()
        };

        let persisted = async {
            let outcome = self
                .fetcher
                .fetch_new(self.repository, &playlist, &self.cancel)
                .await?;
            let failed = outcome.failed_hashes.len();
            let added = self
                .repository
                .persist_fetch_result(
                    &playlist.name,
                    outcome.items,
                    outcome.failed_hashes,
                    Some(self.options.max_fail),
                )
                .await?;
            Ok::<_, AppError>((added, failed))
        };

        match persisted.await {
            Ok((added, failed)) => {
                tracing::info!(
                    "Playlist '{}': {} new, {} failed",
                    playlist.name,
                    added,
                    failed
                );
                report.added = added;
                report.failed = failed;
            }
            Err(e) => {
                tracing::error!("Failed to update playlist '{}': {}", playlist.name, e);
                report.error = Some(e.to_string());
            }
        }
        report
    }
}
