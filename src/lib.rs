//! imgload: load camera-trap images and videos into an image-set database, with metadata
//! from a persistent stay-open tool process.

pub mod engine;
pub mod ingest;
pub mod pipeline;
pub mod tool;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

use log::debug;
use std::path::Path;
use std::sync::Arc;

/// Result alias used by public imgload API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use engine::db_ops::{FileStore, SqliteStore};
pub use pipeline::{CancelSignal, ImageSetLoader, IngestContext, ProgressReporter};

/// Single entry point: load `candidates` (files under `root`) into `store`.
///
/// - **`reporter: None`** → no progress reports.
/// - **`reporter: Some(r)`** → `r` is called every `opts.progress_interval` from a timer thread.
///   Keep it fast; errors and panics inside it are ignored.
///
/// Files already in `store` are skipped (case-insensitive path match). Cancelling through
/// `ctx.cancel` before Phase 2 leaves `store` untouched.
pub fn ingest_files(
    root: &Path,
    candidates: Vec<CandidateFile>,
    store: &mut dyn FileStore,
    ctx: IngestContext,
    opts: &IngestOpts,
    reporter: Option<Arc<dyn ProgressReporter>>,
) -> Result<IngestSummary> {
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );
    let reporter = reporter.unwrap_or_else(|| Arc::new(pipeline::NoProgress));
    ingest::ingest_files(root, candidates, store, ctx, opts, reporter)
}
