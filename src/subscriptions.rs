use std::path::Path;

use opml::{Outline, OPML};

use crate::error::Result;
use crate::models::Playlist;

/// Reads the playlists listed in an OPML file. Nested outlines are
/// flattened; outlines without an `xmlUrl` are only folders and skipped.
pub fn parse_opml_file(path: &Path) -> Result<Vec<Playlist>> {
    let content = std::fs::read_to_string(path)?;
    parse_opml(&content)
}

pub fn parse_opml(content: &str) -> Result<Vec<Playlist>> {
    let document = OPML::from_str(content)?;
    let mut playlists = Vec::new();
    collect(&document.body.outlines, &mut playlists);
    Ok(playlists)
}

fn collect(outlines: &[Outline], playlists: &mut Vec<Playlist>) {
    for outline in outlines {
        if let Some(url) = outline.xml_url.as_deref().filter(|u| !u.is_empty()) {
            let name = outline
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| outline.text.clone());
            playlists.push(Playlist::new(name, url, false));
        }
        collect(&outline.outlines, playlists);
    }
}
