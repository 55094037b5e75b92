use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{CleanupPolicy, Item, ItemFilter, MappedItem, MappedPlaylist, Playlist};

use super::migration::{self, SchemaStatus};
use super::query::{build_item_query, coalesce, item_row, order_by_ids};
use super::schema::{CURRENT_VERSION, MIN_SUPPORTED_VERSION, SCHEMA};
use super::to_epoch;

/// A row matched by URL keeps its stored content hash. The new hash may already
/// belong to another row, and rewriting it would break the unique index.
const UPSERT_ITEM: &str = r#"INSERT INTO item (title, url, description, duration, publish_date, watch_date, content_hash, thumbnail_url)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
       ON CONFLICT(url) DO UPDATE SET
           title = excluded.title,
           description = excluded.description,
           duration = excluded.duration,
           publish_date = excluded.publish_date,
           thumbnail_url = excluded.thumbnail_url
       ON CONFLICT(content_hash) DO UPDATE SET
           title = excluded.title,
           url = excluded.url,
           description = excluded.description,
           duration = excluded.duration,
           publish_date = excluded.publish_date,
           thumbnail_url = excluded.thumbnail_url
       RETURNING id"#;

/// 0-based rank of every (playlist, item) pair by publish date, newest first.
const RANKED_CONTENT: &str = r#"WITH ranked AS (
           SELECT c.item_id,
                  ROW_NUMBER() OVER (
                      PARTITION BY c.playlist_id
                      ORDER BY i.publish_date DESC, i.id DESC
                  ) - 1 AS rank
           FROM content c
           JOIN item i ON i.id = c.item_id
       )"#;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    /// Opens (or creates) the database at `db_path` and brings its schema up
    /// to date.
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        let status = conn
            .call(|conn| Ok(migration::inspect(conn)?))
            .await?;

        match status {
            SchemaStatus::Fresh => {
                conn.call(|conn| {
                    let tx = conn.transaction()?;
                    tx.execute_batch(SCHEMA)?;
                    tx.pragma_update(None, "user_version", CURRENT_VERSION)?;
                    tx.commit()?;
                    Ok(())
                })
                .await?;
            }
            SchemaStatus::UpToDate => {}
            SchemaStatus::Outdated(version) => {
                tracing::info!(
                    "Migrating database schema from version {} to {}",
                    version,
                    CURRENT_VERSION
                );
                conn.call(move |conn| Ok(migration::migrate(conn, version, CURRENT_VERSION)))
                    .await?
                    .map_err(|e| AppError::Migration(e.to_string()))?;
            }
            SchemaStatus::Incompatible(found) => {
                return Err(AppError::IncompatibleSchemaVersion {
                    found,
                    min: MIN_SUPPORTED_VERSION,
                    max: CURRENT_VERSION,
                });
            }
        }

        conn.call(|conn| {
            conn.pragma_update(None, "foreign_keys", true)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    pub async fn schema_version(&self) -> Result<u32> {
        let version = self
            .conn
            .call(|conn| Ok(migration::user_version(conn)?))
            .await?;
        Ok(version)
    }

    // Playlist operations

    pub async fn add_playlist(&self, name: &str, url: &str, reverse: bool) -> Result<()> {
        let name = name.to_string();
        let url = url.to_string();
        let label = name.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO playlist (name, url, reverse) VALUES (?1, ?2, ?3)",
                    params![name, url, reverse],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| name_conflict(e, &label))?;
        Ok(())
    }

    /// Returns `false` when no playlist has this name.
    pub async fn delete_playlist(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM playlist WHERE name = ?1", params![name])?;
                Ok(changed > 0)
            })
            .await?;
        Ok(deleted)
    }

    /// Returns `false` when `old` does not exist, fails with
    /// [`AppError::NameConflict`] when `new` is taken.
    pub async fn rename_playlist(&self, old: &str, new: &str) -> Result<bool> {
        let old = old.to_string();
        let new = new.to_string();
        let label = new.clone();
        let renamed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE playlist SET name = ?1 WHERE name = ?2",
                    params![new, old],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(|e| name_conflict(e, &label))?;
        Ok(renamed)
    }

    /// Flips the `reverse` flag. Returns `false` when the playlist does not exist.
    pub async fn reverse_playlist(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        let reversed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE playlist SET reverse = NOT reverse WHERE name = ?1",
                    params![name],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(reversed)
    }

    /// Replaces all tags of a playlist.
    pub async fn tag_playlist(&self, name: &str, tags: Vec<String>) -> Result<()> {
        let playlist = name.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(id) = playlist_id(&tx, &playlist)? else {
                    return Ok(false);
                };
                tx.execute("DELETE FROM tag WHERE playlist = ?1", params![id])?;
                {
                    let mut stmt =
                        tx.prepare("INSERT OR IGNORE INTO tag (name, playlist) VALUES (?1, ?2)")?;
                    for tag in &tags {
                        stmt.execute(params![tag, id])?;
                    }
                }
                tx.commit()?;
                Ok(true)
            })
            .await?;

        if found {
            Ok(())
        } else {
            Err(AppError::PlaylistNotFound(name.to_string()))
        }
    }

    pub async fn get_playlist(&self, name: &str) -> Result<Option<Playlist>> {
        let name = name.to_string();
        let playlist = self
            .conn
            .call(move |conn| {
                let playlist = conn
                    .query_row(
                        "SELECT name, url, reverse FROM playlist WHERE name = ?1",
                        params![name],
                        |row| {
                            Ok(Playlist {
                                name: row.get(0)?,
                                url: row.get(1)?,
                                reverse: row.get(2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(playlist)
            })
            .await?;
        Ok(playlist)
    }

    pub async fn list_playlists(&self) -> Result<Vec<MappedPlaylist>> {
        let playlists = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT p.id, p.name, p.url, p.reverse, t.name
                       FROM playlist p
                       LEFT JOIN tag t ON t.playlist = p.id
                       ORDER BY p.id, t.name"#,
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        MappedPlaylist {
                            name: row.get(1)?,
                            url: row.get(2)?,
                            reverse: row.get(3)?,
                            tags: Vec::new(),
                        },
                        row.get::<_, Option<String>>(4)?,
                    ))
                })?;

                let mut playlists: Vec<(i64, MappedPlaylist)> = Vec::new();
                for row in rows {
                    let (id, playlist, tag) = row?;
                    if playlists.last().map(|(last, _)| *last) != Some(id) {
                        playlists.push((id, playlist));
                    }
                    if let (Some(tag), Some((_, current))) = (tag, playlists.last_mut()) {
                        current.tags.push(tag);
                    }
                }
                Ok(playlists.into_iter().map(|(_, p)| p).collect::<Vec<_>>())
            })
            .await?;
        Ok(playlists)
    }

    pub async fn list_tags(&self) -> Result<Vec<String>> {
        let tags = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT DISTINCT name FROM tag ORDER BY name")?;
                let tags = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    // Item operations

    /// Upserts `items` and links them to `playlist`. Returns the number of new
    /// playlist-item links.
    pub async fn add_items(&self, items: Vec<Item>, playlist: &Playlist) -> Result<usize> {
        self.persist_fetch_result(&playlist.name, items, Vec::new(), None)
            .await
    }

    /// Writes the outcome of one playlist fetch in a single transaction:
    /// upserts and links the resolved items and bumps the failure count of
    /// every hash that could not be resolved.
    pub async fn persist_fetch_result(
        &self,
        playlist: &str,
        items: Vec<Item>,
        failed_hashes: Vec<String>,
        max_fail: Option<u32>,
    ) -> Result<usize> {
        if items.is_empty() && failed_hashes.is_empty() {
            return Ok(0);
        }

        let name = playlist.to_string();
        let added = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(playlist_id) = playlist_id(&tx, &name)? else {
                    return Ok(None);
                };

                let mut added = 0;
                for item in &items {
                    match upsert_item(&tx, item) {
                        Ok(item_id) => {
                            added += tx.execute(
                                "INSERT OR IGNORE INTO content (playlist_id, item_id) VALUES (?1, ?2)",
                                params![playlist_id, item_id],
                            )?;
                        }
                        Err(e) => {
                            // A failed statement is rolled back on its own,
                            // the rest of the transaction stays valid.
                            tracing::warn!("Failed to store '{}' ({}): {}", item.title, item.url, e);
                        }
                    }
                }

                for hash in &failed_hashes {
                    bump_failure_count(&tx, hash, max_fail)?;
                }

                tx.commit()?;
                Ok(Some(added))
            })
            .await?;

        added.ok_or_else(|| AppError::PlaylistNotFound(playlist.to_string()))
    }

    pub async fn list_items(&self, filter: ItemFilter) -> Result<Vec<MappedItem>> {
        let query = build_item_query(&filter);
        let items = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&query.sql)?;
                let rows = stmt.query_map(params_from_iter(query.params.iter()), item_row)?;
                Ok(coalesce(rows)?)
            })
            .await?;

        if !filter.ids.is_empty() && filter.order_by.is_empty() {
            return Ok(order_by_ids(items, &filter.ids));
        }
        Ok(items)
    }

    /// Content hashes of all items already linked to the playlist.
    pub async fn known_hashes(&self, playlist: &str) -> Result<HashSet<String>> {
        let name = playlist.to_string();
        let hashes = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT i.content_hash
                       FROM item i
                       JOIN content c ON c.item_id = i.id
                       JOIN playlist p ON p.id = c.playlist_id
                       WHERE p.name = ?1 AND i.content_hash IS NOT NULL"#,
                )?;
                let hashes = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<std::result::Result<HashSet<String>, _>>()?;
                Ok(hashes)
            })
            .await?;
        Ok(hashes)
    }

    /// Marks items as watched now. Items that are already watched keep their
    /// original watch date.
    pub async fn mark_watched(&self, ids: Vec<i64>) -> Result<usize> {
        let now = to_epoch(&Utc::now());
        self.update_watch_date(
            "UPDATE item SET watch_date = COALESCE(watch_date, ?1) WHERE id = ?2",
            Some(now),
            ids,
        )
        .await
    }

    pub async fn mark_unwatched(&self, ids: Vec<i64>) -> Result<usize> {
        self.update_watch_date(
            "UPDATE item SET watch_date = ?1 WHERE id = ?2",
            None,
            ids,
        )
        .await
    }

    async fn update_watch_date(
        &self,
        sql: &'static str,
        value: Option<f64>,
        ids: Vec<i64>,
    ) -> Result<usize> {
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut changed = 0;
                {
                    let mut stmt = tx.prepare(sql)?;
                    for id in &ids {
                        changed += stmt.execute(params![value, id])?;
                    }
                }
                tx.commit()?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    /// Deletes watched items that are not among the `keep` most recently
    /// published items of their playlists. Unwatched items are never deleted.
    pub async fn cleanup(&self, keep: usize, policy: CleanupPolicy) -> Result<usize> {
        let selection = match policy {
            CleanupPolicy::AllPlaylists => {
                "SELECT item_id FROM ranked GROUP BY item_id HAVING MIN(rank) >= ?1"
            }
            CleanupPolicy::AnyPlaylist => "SELECT item_id FROM ranked WHERE rank >= ?1",
        };
        let sql = format!(
            "{}\n       DELETE FROM item WHERE watch_date IS NOT NULL AND id IN ({})",
            RANKED_CONTENT, selection
        );
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);

        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute(&sql, params![keep])?;
                if deleted > 0 {
                    conn.execute_batch("VACUUM")?;
                }
                Ok(deleted)
            })
            .await?;
        tracing::info!("Cleanup removed {} watched items", deleted);
        Ok(deleted)
    }

    // Failure accounting

    pub async fn get_failure_count(&self, content_hash: &str) -> Result<u32> {
        let hash = content_hash.to_string();
        let count = self
            .conn
            .call(move |conn| {
                let count: Option<u32> = conn
                    .query_row(
                        "SELECT failure_count FROM quarantine WHERE content_hash = ?1",
                        params![hash],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(count.unwrap_or(0))
            })
            .await?;
        Ok(count)
    }

    /// Increments the failure count of a hash while it is below `max_fail`.
    /// `None` means no cap.
    pub async fn increase_failure_count(&self, content_hash: &str, max_fail: Option<u32>) -> Result<()> {
        let hash = content_hash.to_string();
        self.conn
            .call(move |conn| {
                bump_failure_count(conn, &hash, max_fail)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Hashes whose failure count reached `max_fail`.
    pub async fn quarantined_hashes(&self, max_fail: u32) -> Result<HashSet<String>> {
        let hashes = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT content_hash FROM quarantine WHERE failure_count >= ?1")?;
                let hashes = stmt
                    .query_map(params![max_fail], |row| row.get(0))?
                    .collect::<std::result::Result<HashSet<String>, _>>()?;
                Ok(hashes)
            })
            .await?;
        Ok(hashes)
    }
}

fn name_conflict(err: tokio_rusqlite::Error, name: &str) -> AppError {
    let err = AppError::from(err);
    if err.is_constraint_violation() {
        AppError::NameConflict(name.to_string())
    } else {
        err
    }
}

fn playlist_id(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM playlist WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
}

fn upsert_item(conn: &rusqlite::Connection, item: &Item) -> rusqlite::Result<i64> {
    conn.query_row(
        UPSERT_ITEM,
        params![
            item.title,
            item.url,
            item.description,
            item.duration,
            to_epoch(&item.publish_date),
            item.watch_date.as_ref().map(to_epoch),
            item.content_hash,
            item.thumbnail_url,
        ],
        |row| row.get(0),
    )
}

fn bump_failure_count(
    conn: &rusqlite::Connection,
    content_hash: &str,
    max_fail: Option<u32>,
) -> rusqlite::Result<()> {
    let cap = max_fail.map(i64::from).unwrap_or(i64::MAX);
    conn.execute(
        "INSERT OR IGNORE INTO quarantine (content_hash, failure_count) VALUES (?1, 0)",
        params![content_hash],
    )?;
    conn.execute(
        "UPDATE quarantine SET failure_count = failure_count + 1 WHERE content_hash = ?1 AND failure_count < ?2",
        params![content_hash, cap],
    )?;
    Ok(())
}
