mod filter;
mod item;
mod playlist;

pub use filter::{CleanupPolicy, Direction, ItemAttribute, ItemFilter, OrderBy};
pub use item::{Item, MappedItem, MIN_PUBLISH_TIMESTAMP};
pub use playlist::{MappedPlaylist, Playlist};
