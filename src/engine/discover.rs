//! Walk an image-set folder for candidate media files.

use log::warn;
use std::path::Path;
use walkdir::WalkDir;

use crate::CandidateFile;
use crate::engine::tools::{is_media_file, is_os_hidden_file};

/// Media files under `root` (recursively), with their file-system timestamps.
///
/// Unreadable entries are logged and skipped. The database and its WAL files never match
/// the media extensions, so they need no special case.
pub fn discover_candidates(root: &Path) -> Vec<CandidateFile> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || is_os_hidden_file(path) || !is_media_file(path) {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => out.push(CandidateFile {
                path: path.to_path_buf(),
                created: meta.created().ok(),
                modified: meta.modified().ok(),
            }),
            Err(e) => warn!("Skipping {}: {e}", path.display()),
        }
    }
    out
}
