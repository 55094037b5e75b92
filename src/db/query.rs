use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::Row;

use crate::models::{ItemFilter, MappedItem, Playlist, MIN_PUBLISH_TIMESTAMP};

use super::{from_epoch, to_epoch};

const SELECT_ITEMS: &str = r#"SELECT i.id, i.title, i.url, i.description, i.duration, i.publish_date,
              i.watch_date, i.content_hash, i.thumbnail_url,
              p.name, p.url, p.reverse
       FROM item i
       JOIN content c ON c.item_id = i.id
       JOIN playlist p ON p.id = c.playlist_id"#;

/// SQL text plus its positional parameters.
#[derive(Debug)]
pub(crate) struct ItemQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn build_item_query(filter: &ItemFilter) -> ItemQuery {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(since) = &filter.since {
        conditions.push("i.publish_date >= ?".to_string());
        params.push(Value::Real(to_epoch(since)));
    }
    if let Some(till) = &filter.till {
        conditions.push("i.publish_date < ?".to_string());
        params.push(Value::Real(to_epoch(till)));
    }

    match filter.watched {
        Some(true) => conditions.push("i.watch_date IS NOT NULL".to_string()),
        Some(false) => conditions.push("i.watch_date IS NULL".to_string()),
        None => {}
    }

    // Playlist and tag filters select items; the join above still yields
    // every playlist an item belongs to.
    if !filter.playlists.is_empty() {
        conditions.push(format!(
            "i.id IN (SELECT c2.item_id FROM content c2 JOIN playlist p2 ON p2.id = c2.playlist_id WHERE p2.name IN ({}))",
            placeholders(filter.playlists.len())
        ));
        params.extend(filter.playlists.iter().cloned().map(Value::Text));
    }

    if !filter.tags.is_empty() {
        conditions.push(format!(
            "i.id IN (SELECT c3.item_id FROM content c3 JOIN tag t ON t.playlist = c3.playlist_id WHERE t.name IN ({}))",
            placeholders(filter.tags.len())
        ));
        params.extend(filter.tags.iter().cloned().map(Value::Text));
    }

    if !filter.ids.is_empty() {
        conditions.push(format!("i.id IN ({})", placeholders(filter.ids.len())));
        params.extend(filter.ids.iter().copied().map(Value::Integer));
    }

    let mut sql = SELECT_ITEMS.to_string();
    if !conditions.is_empty() {
        sql.push_str("\n       WHERE ");
        sql.push_str(&conditions.join("\n         AND "));
    }

    let mut order: Vec<String> = filter
        .order_by
        .iter()
        .map(|o| format!("{} {}", o.attribute.column(), o.direction.keyword()))
        .collect();
    order.push("i.id ASC".to_string());
    order.push("p.id ASC".to_string());
    sql.push_str("\n       ORDER BY ");
    sql.push_str(&order.join(", "));

    ItemQuery { sql, params }
}

/// Reads one (item, playlist) row.
pub(crate) fn item_row(row: &Row) -> rusqlite::Result<(MappedItem, Playlist)> {
    let item = MappedItem {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        duration: row.get(4)?,
        publish_date: from_epoch(
            row.get::<_, Option<f64>>(5)?
                .unwrap_or(MIN_PUBLISH_TIMESTAMP as f64),
        ),
        watch_date: row.get::<_, Option<f64>>(6)?.map(from_epoch),
        content_hash: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        thumbnail_url: row.get(8)?,
        playlists: Vec::new(),
    };
    let playlist = Playlist {
        name: row.get(9)?,
        url: row.get(10)?,
        reverse: row.get(11)?,
    };
    Ok((item, playlist))
}

/// Merges rows of the same item, keeping the first row's fields and
/// collecting playlists in row order.
pub(crate) fn coalesce<I>(rows: I) -> rusqlite::Result<Vec<MappedItem>>
where
    I: IntoIterator<Item = rusqlite::Result<(MappedItem, Playlist)>>,
{
    let mut items: Vec<MappedItem> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();

    for row in rows {
        let (item, playlist) = row?;
        match positions.get(&item.id) {
            Some(&pos) => items[pos].playlists.push(playlist),
            None => {
                positions.insert(item.id, items.len());
                let mut item = item;
                item.playlists.push(playlist);
                items.push(item);
            }
        }
    }

    Ok(items)
}

/// Puts `items` in the order of `ids`. Ids without a matching item are skipped.
pub(crate) fn order_by_ids(items: Vec<MappedItem>, ids: &[i64]) -> Vec<MappedItem> {
    let mut by_id: HashMap<i64, MappedItem> = items.into_iter().map(|i| (i.id, i)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
