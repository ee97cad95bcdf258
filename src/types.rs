//! Public and internal types for the imgload API and pipeline.

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::utils::config::{
    IMAGE_EXTENSIONS, MAX_DIR_LEN, MAX_PATH_LEN, PROGRESS_INTERVAL, VIDEO_EXTENSIONS,
};

/// One file pending or already loaded into the image set.
///
/// Built by a single loader task and not touched again once handed to the insert queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Folder of the file relative to the image-set root, `/`-separated; empty at the root.
    pub relative_path: String,
    /// File name with extension.
    pub file: String,
    /// Capture time: metadata `DateTimeOriginal` when available, else file-system time.
    pub date_time: DateTime<FixedOffset>,
    /// True when the record must be written by the insert phase.
    pub requires_insert: bool,
    /// Data label → value, filled from metadata on load and from export-standard fields.
    pub fields: BTreeMap<String, String>,
}

impl FileRecord {
    pub fn new(
        relative_path: impl Into<String>,
        file: impl Into<String>,
        date_time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            file: file.into(),
            date_time,
            requires_insert: true,
            fields: BTreeMap::new(),
        }
    }

    /// Absolute path of the file under `root`.
    pub fn full_path(&self, root: &Path) -> PathBuf {
        if self.relative_path.is_empty() {
            root.join(&self.file)
        } else {
            root.join(&self.relative_path).join(&self.file)
        }
    }

    /// Lowercase extension without the dot (empty when there is none).
    pub fn extension(&self) -> String {
        Path::new(&self.file)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn is_image(&self) -> bool {
        IMAGE_EXTENSIONS.contains(&self.extension().as_str())
    }

    pub fn is_video(&self) -> bool {
        VIDEO_EXTENSIONS.contains(&self.extension().as_str())
    }

    /// Key used to order the batch insert: (relative path, file name).
    pub fn sort_key(&self) -> (&str, &str) {
        (self.relative_path.as_str(), self.file.as_str())
    }
}

/// A file-system descriptor for one candidate file: path plus the timestamps the loader needs.
#[derive(Clone, Debug)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

impl CandidateFile {
    /// Descriptor with explicit timestamps (no disk access).
    pub fn new(path: impl Into<PathBuf>, modified: Option<SystemTime>) -> Self {
        Self {
            path: path.into(),
            created: None,
            modified,
        }
    }

    /// Read the descriptor from disk.
    pub fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let meta = std::fs::metadata(&path)?;
        Ok(Self {
            created: meta.created().ok(),
            modified: meta.modified().ok(),
            path,
        })
    }

    /// Earliest of creation and last-write time, in local time.
    /// Copying from a camera card often leaves the write time before the creation time.
    pub fn earliest_time(&self) -> Option<DateTime<FixedOffset>> {
        let earliest = match (self.created, self.modified) {
            (Some(c), Some(m)) => Some(c.min(m)),
            (c, m) => c.or(m),
        }?;
        Some(DateTime::<Local>::from(earliest).fixed_offset())
    }
}

/// Cross-standard export mode of the target image set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportStandard {
    #[default]
    None,
    /// Camera Trap Data Package: each record gets media/observation ids and a media type.
    CamtrapDp,
}

/// What the loader fills in besides the core fields. Carried by the ingest context.
#[derive(Clone, Debug, Default)]
pub struct LoadSettings {
    /// Metadata tag → data label. Empty means no metadata import.
    pub metadata_fields: BTreeMap<String, String>,
    pub export_standard: ExportStandard,
}

impl LoadSettings {
    /// Tags to request from the metadata tool, in tag order.
    pub fn tags(&self) -> Vec<String> {
        self.metadata_fields.keys().cloned().collect()
    }
}

/// Lib options for [`ingest_files`](crate::ingest_files) and [`ImageSetLoader`](crate::pipeline::ImageSetLoader).
#[derive(Clone, Debug)]
pub struct IngestOpts {
    /// Bound on concurrent loader tasks. `None` uses the global rayon pool as-is.
    pub max_concurrency: Option<usize>,
    /// Interval between progress reports.
    pub progress_interval: Duration,
    /// Full paths at or above this length are skipped and their folder recorded.
    pub max_path_len: usize,
    /// Directory parts at or above this length are skipped and their folder recorded.
    pub max_dir_len: usize,
}

impl Default for IngestOpts {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            progress_interval: PROGRESS_INTERVAL,
            max_path_len: MAX_PATH_LEN,
            max_dir_len: MAX_DIR_LEN,
        }
    }
}

/// Full options (CLI). Use [`IngestOpts`] for lib.
#[derive(Clone, Debug, Default)]
pub struct Opts {
    /// Database path. When None, uses `root.join(<package db filename>)` (e.g. `.imgload`).
    pub db_path: Option<PathBuf>,
    /// Metadata tool executable. When None, looked up next to the running binary.
    pub tool_path: Option<PathBuf>,
    /// Show progress bar and debug logging.
    pub verbose: bool,
    /// List new files without loading or inserting them.
    pub dry_run: bool,
    pub max_concurrency: Option<usize>,
    pub progress_interval: Option<Duration>,
    pub load: LoadSettings,
}

impl From<&Opts> for IngestOpts {
    fn from(o: &Opts) -> Self {
        IngestOpts {
            max_concurrency: o.max_concurrency,
            progress_interval: o.progress_interval.unwrap_or(PROGRESS_INTERVAL),
            ..IngestOpts::default()
        }
    }
}

/// Which pass of the loader a progress report belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Phase 1: concurrent per-file load.
    Load,
    /// Phase 2: ordered batch insert.
    Insert,
}

impl Phase {
    pub fn number(self) -> u8 {
        match self {
            Phase::Load => 1,
            Phase::Insert => 2,
        }
    }
}

/// Snapshot handed to a [`ProgressReporter`](crate::pipeline::ProgressReporter).
#[derive(Clone, Debug)]
pub struct LoadProgress {
    pub phase: Phase,
    /// `100 * current / total` for this phase (100 when total is 0).
    pub percent: u32,
    pub current: usize,
    pub total: usize,
    /// File name of the most recently completed item.
    pub current_name: Option<String>,
    /// Phase 1 only: path of the last loaded image, for a preview. Videos have none.
    pub preview: Option<PathBuf>,
}

/// Outcome of one ingestion run. Counts stay accurate on partial failure and cancellation.
#[derive(Clone, Debug, Default)]
pub struct IngestSummary {
    /// New candidates after deduplication against the store.
    pub to_load: usize,
    /// Loader tasks that completed.
    pub loaded: usize,
    /// Records queued for the insert phase.
    pub awaiting_insert: usize,
    /// Rows written by the insert phase.
    pub inserted: usize,
    /// Folders whose files were skipped because their path was too long.
    pub skipped_too_long: Vec<String>,
    pub cancelled: bool,
}
