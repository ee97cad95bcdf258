//! Path-length checks and the list of folders skipped because of them.

use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::engine::tools::{path_relative_to, path_to_db_string};

/// The resolved path of a candidate is too long for the store or the tool.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("path too long ({len} >= {limit}): {folder}")]
pub struct PathTooLong {
    /// Containing folder, as recorded in the [`SkipList`].
    pub folder: String,
    pub len: usize,
    pub limit: usize,
}

/// Relative folder of `path` under `root`, `/`-separated; empty for files at the root.
///
/// Fails with [`PathTooLong`] when the directory part reaches `max_dir_len` or the full
/// path reaches `max_path_len` characters.
pub fn resolve_relative(
    path: &Path,
    root: &Path,
    max_dir_len: usize,
    max_path_len: usize,
) -> Result<String, PathTooLong> {
    let parent = path.parent().unwrap_or(root);
    let dir = parent.to_string_lossy();
    let dir_len = dir.chars().count();
    let full_len = path.to_string_lossy().chars().count();
    let too_long = |len, limit| PathTooLong {
        folder: dir.to_string(),
        len,
        limit,
    };
    if dir_len >= max_dir_len {
        return Err(too_long(dir_len, max_dir_len));
    }
    if full_len >= max_path_len {
        return Err(too_long(full_len, max_path_len));
    }
    Ok(path_relative_to(parent, root)
        .map(|rel| path_to_db_string(&rel))
        .unwrap_or_else(|| path_to_db_string(parent)))
}

/// Folders skipped during one run, in first-seen order, each at most once.
#[derive(Debug, Default)]
pub struct SkipList {
    folders: Mutex<Vec<String>>,
}

impl SkipList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `folder`; returns false if it was already listed.
    pub fn record(&self, folder: &str) -> bool {
        let mut folders = self
            .folders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if folders.iter().any(|f| f == folder) {
            return false;
        }
        folders.push(folder.to_string());
        true
    }

    pub fn into_vec(self) -> Vec<String> {
        self.folders
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
