/// Schema version written by [`SCHEMA`].
pub const CURRENT_VERSION: u32 = 5;

/// Oldest schema version that can still be migrated.
pub const MIN_SUPPORTED_VERSION: u32 = 2;

pub const SCHEMA: &str = r#"
-- playlist table
CREATE TABLE IF NOT EXISTS playlist (
    id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    name VARCHAR UNIQUE NOT NULL,
    url VARCHAR UNIQUE NOT NULL,
    reverse BOOLEAN NOT NULL DEFAULT false
);

-- tag table
CREATE TABLE IF NOT EXISTS tag (
    name VARCHAR NOT NULL,
    playlist INTEGER NOT NULL REFERENCES playlist (id) ON DELETE CASCADE,
    PRIMARY KEY (name, playlist)
);

-- item table
CREATE TABLE IF NOT EXISTS item (
    id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    title VARCHAR NOT NULL,
    url VARCHAR UNIQUE NOT NULL,
    description VARCHAR,
    duration FLOAT,
    publish_date FLOAT,
    watch_date FLOAT,
    content_hash VARCHAR UNIQUE,
    thumbnail_url VARCHAR
);

CREATE INDEX IF NOT EXISTS idx_item_publish_date ON item(publish_date DESC);

-- content table (playlist <-> item)
CREATE TABLE IF NOT EXISTS content (
    playlist_id INTEGER NOT NULL REFERENCES playlist (id) ON DELETE CASCADE,
    item_id INTEGER NOT NULL REFERENCES item (id) ON DELETE CASCADE,
    PRIMARY KEY (playlist_id, item_id)
);

CREATE INDEX IF NOT EXISTS idx_content_item_id ON content(item_id);

-- quarantine table (resolution failures per content hash)
CREATE TABLE IF NOT EXISTS quarantine (
    content_hash VARCHAR NOT NULL PRIMARY KEY,
    failure_count INTEGER NOT NULL DEFAULT 0
);
"#;
