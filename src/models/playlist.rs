use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    pub url: String,
    /// New items are appended at the end of the source instead of the front.
    pub reverse: bool,
}

impl Playlist {
    pub fn new(name: impl Into<String>, url: impl Into<String>, reverse: bool) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            reverse,
        }
    }
}

/// A playlist together with the tags attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedPlaylist {
    pub name: String,
    pub url: String,
    pub reverse: bool,
    pub tags: Vec<String>,
}

impl From<MappedPlaylist> for Playlist {
    fn from(mapped: MappedPlaylist) -> Self {
        Self {
            name: mapped.name,
            url: mapped.url,
            reverse: mapped.reverse,
        }
    }
}
