use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Item attributes that listings may be sorted by.
///
/// Each variant maps to one fixed column expression, so user supplied sort
/// keys never reach the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemAttribute {
    Id,
    Title,
    Url,
    Description,
    Duration,
    PublishDate,
    WatchDate,
    ContentHash,
    PlaylistName,
}

impl ItemAttribute {
    pub(crate) fn column(self) -> &'static str {
        match self {
            ItemAttribute::Id => "i.id",
            ItemAttribute::Title => "i.title",
            ItemAttribute::Url => "i.url",
            ItemAttribute::Description => "i.description",
            ItemAttribute::Duration => "i.duration",
            ItemAttribute::PublishDate => "i.publish_date",
            ItemAttribute::WatchDate => "i.watch_date",
            ItemAttribute::ContentHash => "i.content_hash",
            ItemAttribute::PlaylistName => "p.name",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ItemAttribute::Id => "id",
            ItemAttribute::Title => "title",
            ItemAttribute::Url => "url",
            ItemAttribute::Description => "description",
            ItemAttribute::Duration => "duration",
            ItemAttribute::PublishDate => "publish_date",
            ItemAttribute::WatchDate => "watch_date",
            ItemAttribute::ContentHash => "content_hash",
            ItemAttribute::PlaylistName => "playlist_name",
        }
    }
}

impl fmt::Display for ItemAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemAttribute {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "id" => Ok(ItemAttribute::Id),
            "title" => Ok(ItemAttribute::Title),
            "url" => Ok(ItemAttribute::Url),
            "description" => Ok(ItemAttribute::Description),
            "duration" => Ok(ItemAttribute::Duration),
            "publish_date" => Ok(ItemAttribute::PublishDate),
            "watch_date" => Ok(ItemAttribute::WatchDate),
            "content_hash" => Ok(ItemAttribute::ContentHash),
            "playlist_name" | "playlists" => Ok(ItemAttribute::PlaylistName),
            other => Err(AppError::Config(format!("unknown sort attribute '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub attribute: ItemAttribute,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(attribute: ItemAttribute) -> Self {
        Self {
            attribute,
            direction: Direction::Asc,
        }
    }

    pub fn desc(attribute: ItemAttribute) -> Self {
        Self {
            attribute,
            direction: Direction::Desc,
        }
    }
}

/// Parses `attribute` or `attribute:asc` / `attribute:desc`.
impl FromStr for OrderBy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, direction) = match s.split_once(':') {
            Some((name, dir)) => {
                let direction = match dir.trim().to_ascii_lowercase().as_str() {
                    "asc" => Direction::Asc,
                    "desc" => Direction::Desc,
                    other => {
                        return Err(AppError::Config(format!(
                            "unknown sort direction '{}'",
                            other
                        )))
                    }
                };
                (name, direction)
            }
            None => (s, Direction::Asc),
        };
        Ok(Self {
            attribute: name.parse()?,
            direction,
        })
    }
}

/// Filters for listing items. The default matches every item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    /// Inclusive lower bound on the publish date.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the publish date.
    pub till: Option<DateTime<Utc>>,
    /// `Some(true)` only watched, `Some(false)` only unwatched, `None` both.
    pub watched: Option<bool>,
    pub tags: Vec<String>,
    pub playlists: Vec<String>,
    pub ids: Vec<i64>,
    pub order_by: Vec<OrderBy>,
}

/// Decides which playlists must agree before a watched item is removed by
/// retention cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Delete only when the item is outside the kept window of every playlist
    /// it belongs to.
    #[default]
    AllPlaylists,
    /// Delete as soon as one owning playlist has it outside its kept window.
    AnyPlaylist,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_order_by_with_direction() {
        let order: OrderBy = "publish_date:desc".parse().unwrap();
        assert_eq!(order, OrderBy::desc(ItemAttribute::PublishDate));

        let order: OrderBy = " title ".parse().unwrap();
        assert_eq!(order, OrderBy::asc(ItemAttribute::Title));
    }

    #[test]
    fn rejects_unknown_sort_keys() {
        assert!("title; DROP TABLE item".parse::<OrderBy>().is_err());
        assert!("title:sideways".parse::<OrderBy>().is_err());
    }

    #[test]
    fn attribute_names_round_trip_through_display() {
        for attr in [
            ItemAttribute::Id,
            ItemAttribute::PublishDate,
            ItemAttribute::PlaylistName,
        ] {
            assert_eq!(attr.to_string().parse::<ItemAttribute>().unwrap(), attr);
        }
    }
}
