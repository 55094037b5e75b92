use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("'{0}' does not point to a playlist or channel")]
    BadSource(String),

    #[error("A playlist with this name or URL already exists: {0}")]
    NameConflict(String),

    #[error("Playlist not found: {0}")]
    PlaylistNotFound(String),

    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    #[error("Skipping '{title}' due to age limit {limit} (allowed: {allowed})")]
    AgeRestricted {
        title: String,
        limit: u32,
        allowed: u32,
    },

    #[error("Skipping live stream '{0}'")]
    LiveStreamSkipped(String),

    #[error(
        "Incompatible database schema version {found}; supported versions are {min} to {max}"
    )]
    IncompatibleSchemaVersion { found: u32, min: u32, max: u32 },

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Extractor did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Player error: {0}")]
    Player(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),

    #[error("OPML error: {0}")]
    Opml(#[from] opml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True for failures that concern a single entry and are recovered by
    /// counting them against the entry's content hash.
    pub fn is_entry_failure(&self) -> bool {
        matches!(
            self,
            AppError::MalformedEntry(_)
                | AppError::AgeRestricted { .. }
                | AppError::LiveStreamSkipped(_)
                | AppError::Extraction(_)
                | AppError::Timeout(_)
        )
    }

    /// True when the error is a SQLite unique/foreign-key constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        let sqlite = match self {
            AppError::Database(tokio_rusqlite::Error::Rusqlite(e)) => e,
            AppError::Sqlite(e) => e,
            _ => return false,
        };
        matches!(
            sqlite,
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_hoc_messages_pass_through() {
        let err: AppError = anyhow::anyhow!("Failed to fetch feed: HTTP {}", 404).into();
        assert!(matches!(err, AppError::Other(_)));
        assert_eq!(err.to_string(), "Failed to fetch feed: HTTP 404");
        assert!(!err.is_entry_failure());
    }

    #[test]
    fn detects_constraint_violations() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: AppError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert!(err.is_constraint_violation());
        assert!(!AppError::Cancelled.is_constraint_violation());
    }
}
