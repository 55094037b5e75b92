use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::DateTime;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::UpdateOptions;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::extract::{Entry, Extractor, Metadata};
use crate::models::{Item, Playlist, MIN_PUBLISH_TIMESTAMP};

/// Result of fetching one playlist.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<Item>,
    /// Hashes of entries that could not be turned into items this run.
    pub failed_hashes: Vec<String>,
}

/// Finds the entries of a playlist that are not stored yet and resolves them.
pub struct ItemFetcher {
    extractor: Arc<dyn Extractor>,
    options: UpdateOptions,
}

impl ItemFetcher {
    pub fn new(extractor: Arc<dyn Extractor>, options: UpdateOptions) -> Self {
        Self { extractor, options }
    }

    pub async fn fetch_new(
        &self,
        repo: &Repository,
        playlist: &Playlist,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let candidates = self.window(playlist, cancel).await?;
        let inspected = candidates.len();

        let known = repo.known_hashes(&playlist.name).await?;
        let quarantined = repo.quarantined_hashes(self.options.max_fail).await?;
        let pending: Vec<(String, Entry)> = candidates
            .into_iter()
            .filter(|(hash, _)| !known.contains(hash) && !quarantined.contains(hash))
            .collect();

        tracing::debug!(
            "Playlist '{}': {} entries inspected, {} to resolve",
            playlist.name,
            inspected,
            pending.len()
        );

        let results: Vec<(String, Result<Item>)> = stream::iter(pending)
            .map(|(hash, entry)| self.process_entry(hash, entry, cancel))
            .buffer_unordered(self.options.resolve_concurrency.max(1))
            .collect()
            .await;

        let mut outcome = FetchOutcome::default();
        for (hash, result) in results {
            match result {
                Ok(item) => outcome.items.push(item),
                Err(AppError::Cancelled) => {}
                Err(e) => {
                    if e.is_entry_failure() {
                        tracing::warn!("{} ({})", e, hash);
                    } else {
                        tracing::error!("Resolving {} failed: {}", hash, e);
                    }
                    outcome.failed_hashes.push(hash);
                }
            }
        }
        Ok(outcome)
    }

    /// Enumerates the playlist and returns the entries to inspect, keyed by
    /// content hash, newest first and without duplicates.
    pub async fn window(
        &self,
        playlist: &Playlist,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, Entry)>> {
        let requested = if playlist.reverse {
            None
        } else {
            Some(self.options.max_backlog)
        };

        let extractor = Arc::clone(&self.extractor);
        let url = playlist.url.clone();
        let mut entries = self
            .offload(cancel, async move { extractor.list_entries(&url, requested).await })
            .await?;

        if playlist.reverse {
            entries.reverse();
        } else {
            entries.truncate(self.options.max_backlog);
        }

        let mut seen = HashSet::new();
        let mut window = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(hash) = entry.content_hash() else {
                tracing::warn!(
                    "Skipping malformed entry in '{}': no id, source or url ({:?})",
                    playlist.name,
                    entry.title
                );
                continue;
            };
            if seen.insert(hash.clone()) {
                window.push((hash, entry));
            }
        }
        Ok(window)
    }

    async fn process_entry(
        &self,
        hash: String,
        entry: Entry,
        cancel: &CancellationToken,
    ) -> (String, Result<Item>) {
        tracing::debug!("Resolving {}", hash);

        let extractor = Arc::clone(&self.extractor);
        let result = self
            .offload(cancel, async move { extractor.resolve(&entry).await })
            .await
            .and_then(|metadata| self.to_item(&hash, metadata));
        (hash, result)
    }

    /// Runs an extractor call on the runtime's worker threads, bounded by the
    /// configured timeout and aborted on cancellation.
    async fn offload<T, F>(&self, cancel: &CancellationToken, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let handle = tokio::spawn(call);
        let abort = handle.abort_handle();
        let limit = self.options.timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                abort.abort();
                Err(AppError::Cancelled)
            }
            joined = tokio::time::timeout(limit, handle) => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(AppError::Extraction(e.to_string())),
                Err(_) => {
                    abort.abort();
                    Err(AppError::Timeout(limit))
                }
            },
        }
    }

    fn to_item(&self, hash: &str, metadata: Metadata) -> Result<Item> {
        let thumbnail_url = metadata.best_thumbnail();

        let title = metadata
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::MalformedEntry(format!("{} has no title", hash)))?;

        let url = metadata
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::MalformedEntry(format!("'{}' has no URL", title)))?;

        let age_limit = metadata.age_limit.unwrap_or(0);
        if age_limit > self.options.age_limit {
            return Err(AppError::AgeRestricted {
                title,
                limit: age_limit,
                allowed: self.options.age_limit,
            });
        }

        if metadata.is_live && self.options.skip_live_stream {
            return Err(AppError::LiveStreamSkipped(title));
        }

        let publish_date = metadata.publish_date.unwrap_or_else(|| {
            tracing::warn!("No upload date for '{}', using minimum timestamp", title);
            DateTime::from_timestamp(MIN_PUBLISH_TIMESTAMP, 0).unwrap_or_default()
        });

        let duration = match metadata.duration {
            Some(d) if d >= 0.0 => Some(d),
            _ => {
                tracing::warn!("Unknown duration for '{}'", title);
                None
            }
        };

        Ok(Item {
            title,
            url,
            description: metadata.description.unwrap_or_default(),
            duration,
            publish_date,
            watch_date: None,
            thumbnail_url,
            content_hash: hash.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Numbered {
        count: usize,
        without_identity: Vec<usize>,
    }

    fn numbered_entry(i: usize) -> Entry {
        Entry {
            id: Some(format!("v{}", i)),
            source: Some("Test".into()),
            url: Some(format!("https://example.com/{}", i)),
            title: Some(format!("Video {}", i)),
        }
    }

    #[async_trait]
    impl Extractor for Numbered {
        async fn list_entries(&self, _url: &str, window: Option<usize>) -> Result<Vec<Entry>> {
            Ok((0..self.count)
                .take(window.unwrap_or(usize::MAX))
                .map(|i| {
                    if self.without_identity.contains(&i) {
                        Entry::default()
                    } else {
                        numbered_entry(i)
                    }
                })
                .collect())
        }

        async fn resolve(&self, entry: &Entry) -> Result<Metadata> {
            if entry.id.as_deref() == Some("v13") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(Metadata {
                title: entry.title.clone(),
                url: entry.url.clone(),
                ..Default::default()
            })
        }
    }

    fn fetcher(count: usize, options: UpdateOptions) -> ItemFetcher {
        let extractor = Numbered {
            count,
            without_identity: vec![],
        };
        ItemFetcher::new(Arc::new(extractor), options)
    }

    fn ids(window: &[(String, Entry)]) -> Vec<String> {
        window
            .iter()
            .map(|(_, e)| e.id.clone().unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn window_is_limited_by_backlog() {
        let fetcher = fetcher(10, UpdateOptions::new(5, 3));
        let playlist = Playlist::new("pl", "url", false);
        let window = fetcher.window(&playlist, &CancellationToken::new()).await.unwrap();
        assert_eq!(ids(&window), vec!["v0", "v1", "v2"]);
        assert_eq!(window[0].0, "test v0");
    }

    #[tokio::test]
    async fn reversed_playlist_inspects_everything_from_the_tail() {
        let fetcher = fetcher(5, UpdateOptions::new(5, 2));
        let playlist = Playlist::new("pl", "url", true);
        let window = fetcher.window(&playlist, &CancellationToken::new()).await.unwrap();
        assert_eq!(ids(&window), vec!["v4", "v3", "v2", "v1", "v0"]);
    }

    #[tokio::test]
    async fn window_skips_entries_without_identity() {
        let extractor = Numbered {
            count: 4,
            without_identity: vec![1],
        };
        let fetcher = ItemFetcher::new(Arc::new(extractor), UpdateOptions::new(5, 10));
        let playlist = Playlist::new("pl", "url", false);
        let window = fetcher.window(&playlist, &CancellationToken::new()).await.unwrap();
        assert_eq!(ids(&window), vec!["v0", "v2", "v3"]);
    }

    #[tokio::test]
    async fn cancelled_listing_fails_with_cancelled() {
        let fetcher = fetcher(3, UpdateOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let playlist = Playlist::new("pl", "url", false);
        let result = fetcher.window(&playlist, &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn slow_resolution_times_out_and_counts_as_failure() {
        let options = UpdateOptions {
            timeout: Duration::from_millis(50),
            ..UpdateOptions::new(5, 20)
        };
        let fetcher = fetcher(14, options);
        let repo = Repository::open_in_memory().await.unwrap();
        repo.add_playlist("pl", "url", false).await.unwrap();
        let playlist = Playlist::new("pl", "url", false);

        let outcome = fetcher
            .fetch_new(&repo, &playlist, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.items.len(), 13);
        assert_eq!(outcome.failed_hashes, vec!["test v13".to_string()]);
    }

    #[tokio::test]
    async fn skips_known_and_quarantined_hashes() {
        let fetcher = fetcher(4, UpdateOptions::new(2, 20));
        let repo = Repository::open_in_memory().await.unwrap();
        repo.add_playlist("pl", "url", false).await.unwrap();
        let playlist = Playlist::new("pl", "url", false);

        let first = fetcher
            .fetch_new(&repo, &playlist, &CancellationToken::new())
            .await
            .unwrap();
        let stored: Vec<Item> = first.items.into_iter().filter(|i| i.content_hash != "test v3").collect();
        repo.add_items(stored, &playlist).await.unwrap();
        repo.increase_failure_count("test v3", Some(2)).await.unwrap();
        repo.increase_failure_count("test v3", Some(2)).await.unwrap();

        let second = fetcher
            .fetch_new(&repo, &playlist, &CancellationToken::new())
            .await
            .unwrap();
        assert!(second.items.is_empty());
        assert!(second.failed_hashes.is_empty());
    }

    fn options_with(age_limit: u32, skip_live_stream: bool) -> UpdateOptions {
        UpdateOptions {
            age_limit,
            skip_live_stream,
            ..Default::default()
        }
    }

    fn complete_metadata() -> Metadata {
        Metadata {
            title: Some("Title".into()),
            url: Some("https://example.com/v".into()),
            duration: Some(12.0),
            publish_date: DateTime::from_timestamp(1_000_000, 0),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_unusable_metadata() {
        let fetcher = fetcher(0, options_with(0, true));

        let untitled = Metadata {
            title: None,
            ..complete_metadata()
        };
        assert!(matches!(fetcher.to_item("h", untitled), Err(AppError::MalformedEntry(_))));

        let no_url = Metadata {
            url: Some(String::new()),
            ..complete_metadata()
        };
        assert!(matches!(fetcher.to_item("h", no_url), Err(AppError::MalformedEntry(_))));

        let restricted = Metadata {
            age_limit: Some(18),
            ..complete_metadata()
        };
        assert!(matches!(
            fetcher.to_item("h", restricted),
            Err(AppError::AgeRestricted { limit: 18, allowed: 0, .. })
        ));

        let live = Metadata {
            is_live: true,
            ..complete_metadata()
        };
        assert!(matches!(fetcher.to_item("h", live), Err(AppError::LiveStreamSkipped(_))));
    }

    #[test]
    fn accepts_live_streams_and_adult_content_when_configured() {
        let fetcher = fetcher(0, options_with(18, false));
        let metadata = Metadata {
            age_limit: Some(18),
            is_live: true,
            ..complete_metadata()
        };
        assert!(fetcher.to_item("h", metadata).is_ok());
    }

    #[test]
    fn fills_in_missing_date_and_drops_negative_duration() {
        let fetcher = fetcher(0, UpdateOptions::default());
        let metadata = Metadata {
            publish_date: None,
            duration: Some(-1.0),
            description: None,
            ..complete_metadata()
        };
        let item = fetcher.to_item("hash", metadata).unwrap();

        assert_eq!(item.publish_date.timestamp(), MIN_PUBLISH_TIMESTAMP);
        assert_eq!(item.duration, None);
        assert_eq!(item.description, "");
        assert_eq!(item.content_hash, "hash");
        assert_eq!(item.watch_date, None);
    }
}
