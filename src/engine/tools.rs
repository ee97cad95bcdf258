//! Path and filter utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::utils::config::{IMAGE_EXTENSIONS, PackagePaths, VIDEO_EXTENSIONS};

/// Convert absolute path to relative path from base
pub fn path_relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// Path as stored in the database: `/`-separated on every platform.
pub fn path_to_db_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Key for case-insensitive path comparison (separators unified, lowercased).
pub fn path_match_key(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Check if a file should be excluded based on OS-specific hidden files
pub fn is_os_hidden_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            // macOS
            ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
            // Windows
            "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" => true,
            // Linux
            ".directory" => true,
            _ => name.starts_with("._") || name.starts_with(".Trash-"),
        }
    } else {
        false
    }
}

/// True for the image and video extensions the loader knows how to describe.
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| {
            IMAGE_EXTENSIONS.contains(&e.as_str()) || VIDEO_EXTENSIONS.contains(&e.as_str())
        })
}

/// MIME-style media type for a lowercase extension: `image/jpeg`, `video/<ext>`, else `video`.
pub fn media_type_for(extension: &str) -> String {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        "image/jpeg".to_string()
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        format!("video/{ext}")
    } else {
        "video".to_string()
    }
}

pub fn check_root_and_canonicalize(path: &Path) -> Result<PathBuf> {
    let path = path.canonicalize().context("canonicalize path")?;
    if !path.is_dir() {
        anyhow::bail!("Not a directory: {}", path.display());
    }
    Ok(path)
}

/// Database path: explicit, or the package db file inside `root`.
pub fn db_path_for(root: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.join(PackagePaths::get().db_filename()))
}
