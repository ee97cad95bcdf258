//! Directory ingestion: discover, open the store, start the tool, run the two-pass loader.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

use crate::engine::db_ops::{FileStore, SqliteStore};
use crate::engine::discover::discover_candidates;
use crate::engine::tools::{check_root_and_canonicalize, db_path_for};
use crate::pipeline::{CancelSignal, ImageSetLoader, IngestContext, ProgressReporter};
use crate::tool::{ToolConfig, ToolError, ToolManager};
use crate::{CandidateFile, IngestOpts, IngestSummary, Opts};

/// Start the metadata tool for this run.
///
/// Required (errors if missing) when a tool path is configured or tags are requested;
/// otherwise used only if found next to the binary.
pub fn tool_for_opts(opts: &Opts) -> Result<Option<Arc<ToolManager>>> {
    let required = opts.tool_path.is_some() || !opts.load.metadata_fields.is_empty();
    let config = ToolConfig {
        exe_path: opts.tool_path.clone(),
        ..ToolConfig::default()
    };
    match ToolManager::new(config) {
        Ok(manager) => Ok(Some(Arc::new(manager))),
        Err(ToolError::NotFound { path }) if !required => {
            debug!(
                "No metadata tool at {}; using file-system times",
                path.display()
            );
            Ok(None)
        }
        Err(e) => Err(e).context("metadata tool"),
    }
}

/// New files under `root` that the database at `opts.db_path` (or its default) does not hold yet.
pub fn list_new_files(root: &Path, opts: &Opts) -> Result<Vec<CandidateFile>> {
    let root = check_root_and_canonicalize(root)?;
    let store = SqliteStore::open(&db_path_for(&root, opts.db_path.as_deref()))?;
    let candidates = discover_candidates(&root);
    let loader = ImageSetLoader::new(
        &root,
        candidates,
        &store,
        IngestContext::default(),
        IngestOpts::from(opts),
    )?;
    Ok(loader.candidates().to_vec())
}

/// Ingest every new media file under `root` into its image-set database.
pub fn ingest_dir_with_opts(
    root: &Path,
    opts: &Opts,
    cancel: Arc<dyn CancelSignal>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<IngestSummary> {
    let root = check_root_and_canonicalize(root)?;
    let db_path = db_path_for(&root, opts.db_path.as_deref());
    let mut store = SqliteStore::open(&db_path)?;
    let candidates = discover_candidates(&root);
    info!(
        "Found {} media file(s) under {}",
        candidates.len(),
        root.display()
    );

    let tool = tool_for_opts(opts)?;
    let mut ctx = IngestContext::new(cancel, opts.load.clone());
    if let Some(tool) = &tool {
        ctx = ctx.with_tool(Arc::clone(tool));
    }

    let result = ingest_files(
        &root,
        candidates,
        &mut store,
        ctx,
        &IngestOpts::from(opts),
        reporter,
    );

    if let Some(tool) = tool {
        let process = tool.process();
        if let Some(version) = process.version() {
            debug!(
                "Metadata tool {} served the run ({} restart(s))",
                version,
                process.restarts()
            );
        }
        tool.stop().wait();
    }
    result
}

/// Load `candidates` (files under `root`) into `store`.
pub fn ingest_files(
    root: &Path,
    candidates: Vec<CandidateFile>,
    store: &mut dyn FileStore,
    ctx: IngestContext,
    opts: &IngestOpts,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<IngestSummary> {
    let loader = ImageSetLoader::new(root, candidates, store, ctx, opts.clone())?;
    loader.load(store, reporter)
}
