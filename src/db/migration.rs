//! Versioned schema upgrades.
//!
//! `STEPS[n]` upgrades a database from version `n` to `n + 1`. The version
//! itself lives in `PRAGMA user_version`.

use rusqlite::Connection;
use thiserror::Error;

use super::schema::{CURRENT_VERSION, MIN_SUPPORTED_VERSION};

/// Replaces the boolean `watched` flag by a nullable watch timestamp.
///
/// The real watch time of already watched items is unknown, they get the
/// time the migration runs.
const V3_WATCH_DATE: &str = r#"
CREATE TABLE new_item (
    id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    title VARCHAR NOT NULL,
    url VARCHAR UNIQUE NOT NULL,
    description VARCHAR,
    duration FLOAT,
    publish_date FLOAT,
    watch_date FLOAT,
    content_hash VARCHAR UNIQUE
);

INSERT INTO new_item
SELECT id, title, url, description, duration, publish_date, NULL, content_hash
FROM item
WHERE watched = 0;

INSERT INTO new_item
SELECT id, title, url, description, duration, publish_date, unixepoch(), content_hash
FROM item
WHERE watched = 1;

DROP TABLE item;

ALTER TABLE new_item RENAME TO item;

CREATE INDEX IF NOT EXISTS idx_item_publish_date ON item(publish_date DESC);
CREATE INDEX IF NOT EXISTS idx_content_item_id ON content(item_id);
"#;

const V4_PLAYLIST_REVERSE: &str = r#"
ALTER TABLE playlist ADD COLUMN reverse BOOLEAN NOT NULL DEFAULT false;
"#;

const V5_ITEM_THUMBNAIL_URL: &str = r#"
ALTER TABLE item ADD COLUMN thumbnail_url VARCHAR;
"#;

const STEPS: [&str; CURRENT_VERSION as usize] = [
    "-- noop",
    "-- noop",
    V3_WATCH_DATE,
    V4_PLAYLIST_REVERSE,
    V5_ITEM_THUMBNAIL_URL,
];

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("no migration path from version {from} to {to}")]
    NoPath { from: u32, to: u32 },

    #[error("{0} foreign key violation(s) after migrating to version {1}")]
    ForeignKeyViolation(usize, u32),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    /// No tables yet, the full schema can be created directly.
    Fresh,
    UpToDate,
    Outdated(u32),
    Incompatible(u32),
}

pub fn user_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

pub fn inspect(conn: &Connection) -> rusqlite::Result<SchemaStatus> {
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    if tables == 0 {
        return Ok(SchemaStatus::Fresh);
    }

    let version = user_version(conn)?;
    let status = if version == CURRENT_VERSION {
        SchemaStatus::UpToDate
    } else if (MIN_SUPPORTED_VERSION..CURRENT_VERSION).contains(&version) {
        SchemaStatus::Outdated(version)
    } else {
        SchemaStatus::Incompatible(version)
    };
    Ok(status)
}

/// Applies the steps `[old, new)` in a single transaction and stores `new`
/// as the schema version. Foreign keys are off while the steps run.
pub fn migrate(conn: &mut Connection, old: u32, new: u32) -> Result<(), MigrationError> {
    if new <= old {
        return Ok(());
    }
    if new as usize > STEPS.len() {
        return Err(MigrationError::NoPath { from: old, to: new });
    }

    conn.pragma_update(None, "foreign_keys", false)?;
    let result = apply_steps(conn, old, new);
    conn.pragma_update(None, "foreign_keys", true)?;
    result
}

fn apply_steps(conn: &mut Connection, old: u32, new: u32) -> Result<(), MigrationError> {
    let tx = conn.transaction()?;

    for (version, step) in STEPS[old as usize..new as usize].iter().enumerate() {
        tracing::debug!("Applying schema step {} -> {}", old as usize + version, old as usize + version + 1);
        tx.execute_batch(step)?;
    }

    let violations = {
        let mut stmt = tx.prepare("PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |_| Ok(()))?;
        rows.count()
    };
    if violations > 0 {
        // Dropping the transaction rolls it back.
        return Err(MigrationError::ForeignKeyViolation(violations, new));
    }

    tx.pragma_update(None, "user_version", new)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::schema::SCHEMA;

    /// Layout of a version 2 database, the oldest one that can be upgraded.
    pub(crate) const V2_SCHEMA: &str = r#"
        CREATE TABLE playlist (
            id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            name VARCHAR UNIQUE,
            url VARCHAR UNIQUE
        );
        CREATE TABLE tag (
            name VARCHAR,
            playlist INTEGER REFERENCES playlist (id) ON DELETE CASCADE,
            PRIMARY KEY (name, playlist)
        );
        CREATE TABLE item (
            id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            title VARCHAR NOT NULL,
            url VARCHAR UNIQUE NOT NULL,
            description VARCHAR,
            duration FLOAT,
            publish_date FLOAT,
            watched INTEGER NOT NULL DEFAULT 0,
            content_hash VARCHAR UNIQUE
        );
        CREATE TABLE content (
            playlist_id INTEGER NOT NULL REFERENCES playlist (id) ON DELETE CASCADE,
            item_id INTEGER NOT NULL REFERENCES item (id) ON DELETE CASCADE,
            PRIMARY KEY (playlist_id, item_id)
        );
        CREATE TABLE quarantine (
            content_hash VARCHAR NOT NULL PRIMARY KEY,
            failure_count INTEGER NOT NULL DEFAULT 0
        );

        INSERT INTO playlist (id, name, url) VALUES (1, 'pl1', 'a');
        INSERT INTO item (id, title, url, description, duration, publish_date, watched, content_hash)
        VALUES
            (1, 'unwatched', 'url1', '', 1.0, 100.0, 0, 'hash1'),
            (2, 'watched', 'url2', '', 2.0, 200.0, 1, 'hash2');
        INSERT INTO content (playlist_id, item_id) VALUES (1, 1), (1, 2);

        PRAGMA user_version = 2;
    "#;

    #[test]
    fn fresh_database_needs_no_migration() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(inspect(&conn).unwrap(), SchemaStatus::Fresh);

        conn.execute_batch(SCHEMA).unwrap();
        conn.pragma_update(None, "user_version", CURRENT_VERSION).unwrap();
        assert_eq!(inspect(&conn).unwrap(), SchemaStatus::UpToDate);
    }

    #[test]
    fn rejects_versions_outside_supported_range() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE channel (id INTEGER PRIMARY KEY); PRAGMA user_version = 1;")
            .unwrap();
        assert_eq!(inspect(&conn).unwrap(), SchemaStatus::Incompatible(1));

        conn.pragma_update(None, "user_version", CURRENT_VERSION + 1).unwrap();
        assert_eq!(
            inspect(&conn).unwrap(),
            SchemaStatus::Incompatible(CURRENT_VERSION + 1)
        );
    }

    #[test]
    fn migrates_v2_to_current() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(V2_SCHEMA).unwrap();
        assert_eq!(inspect(&conn).unwrap(), SchemaStatus::Outdated(2));

        let before = chrono::Utc::now().timestamp() as f64;
        migrate(&mut conn, 2, CURRENT_VERSION).unwrap();

        assert_eq!(user_version(&conn).unwrap(), CURRENT_VERSION);

        let unwatched: Option<f64> = conn
            .query_row("SELECT watch_date FROM item WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(unwatched, None);

        let watched: Option<f64> = conn
            .query_row("SELECT watch_date FROM item WHERE id = 2", [], |row| row.get(0))
            .unwrap();
        assert!(watched.unwrap() >= before);

        let reverse: bool = conn
            .query_row("SELECT reverse FROM playlist WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert!(!reverse);

        let thumbnail: Option<String> = conn
            .query_row("SELECT thumbnail_url FROM item WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(thumbnail, None);

        let associations: i64 = conn
            .query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))
            .unwrap();
        assert_eq!(associations, 2);
    }

    #[test]
    fn migrating_to_same_or_older_version_is_a_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(V2_SCHEMA).unwrap();
        migrate(&mut conn, 2, 2).unwrap();
        migrate(&mut conn, 2, 1).unwrap();
        assert_eq!(user_version(&conn).unwrap(), 2);
    }

    #[test]
    fn failed_step_leaves_version_untouched() {
        let mut conn = Connection::open_in_memory().unwrap();
        // Version 4 layout without the item table the last step alters.
        conn.execute_batch(
            "CREATE TABLE playlist (id INTEGER PRIMARY KEY); PRAGMA user_version = 4;",
        )
        .unwrap();

        assert!(migrate(&mut conn, 4, CURRENT_VERSION).is_err());
        assert_eq!(user_version(&conn).unwrap(), 4);
    }
}
