//! Two-pass ingestion: concurrent per-file load, then one ordered batch insert.

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::engine::db_ops::FileStore;
use crate::engine::tools::{path_match_key, path_to_db_string};
use crate::pipeline::progress::{ProgressState, Ticker, report_safely};
use crate::pipeline::{FileLoader, IngestContext, ProgressReporter, SkipList, resolve_relative};
use crate::utils::config::CANCEL_POLL_INTERVAL;
use crate::{CandidateFile, FileRecord, IngestOpts, IngestSummary, Phase};

/// Loads a batch of candidate files into a [`FileStore`].
///
/// Construction reads the store's known paths once and keeps only new candidates,
/// compared case-insensitively and sorted by full path.
pub struct ImageSetLoader {
    root: PathBuf,
    candidates: Vec<CandidateFile>,
    ctx: IngestContext,
    opts: IngestOpts,
}

/// Where Phase 1 tasks hand off: the unordered insert queue and the shared counters.
struct TaskShared {
    root: PathBuf,
    loader: FileLoader,
    state: Arc<ProgressState>,
    queue_tx: Sender<FileRecord>,
}

impl ImageSetLoader {
    pub fn new(
        root: &Path,
        candidates: Vec<CandidateFile>,
        store: &dyn FileStore,
        ctx: IngestContext,
        opts: IngestOpts,
    ) -> Result<Self> {
        let mut seen: HashSet<String> = store
            .known_paths()?
            .into_iter()
            .map(|(rel, file)| {
                let full = if rel.is_empty() {
                    root.join(file)
                } else {
                    root.join(rel).join(file)
                };
                path_match_key(&path_to_db_string(&full))
            })
            .collect();
        let known = seen.len();

        let mut candidates: Vec<CandidateFile> = candidates
            .into_iter()
            .filter(|c| seen.insert(path_match_key(&path_to_db_string(&c.path))))
            .collect();
        candidates.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            "{} new candidate(s) under {} ({} already stored)",
            candidates.len(),
            root.display(),
            known
        );

        Ok(Self {
            root: root.to_path_buf(),
            candidates,
            ctx,
            opts,
        })
    }

    /// Candidates left after deduplication, in load order.
    pub fn candidates(&self) -> &[CandidateFile] {
        &self.candidates
    }

    pub fn to_load(&self) -> usize {
        self.candidates.len()
    }

    /// Run both phases. A cancelled run inserts nothing and still returns accurate counts.
    ///
    /// Only a failing insert (or a failure to set up the worker pool) is returned as an error;
    /// per-file problems are logged and skipped.
    pub fn load(
        self,
        store: &mut dyn FileStore,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<IngestSummary> {
        let Self {
            root,
            candidates,
            ctx,
            opts,
        } = self;
        let state = Arc::new(ProgressState::new(candidates.len()));
        state.set_phase(Phase::Load);
        let ticker = Ticker::spawn(
            Arc::clone(&reporter),
            Arc::clone(&state),
            opts.progress_interval,
        )?;

        let skips = SkipList::new();
        let (queue_tx, queue_rx) = unbounded::<FileRecord>();
        let shared = Arc::new(TaskShared {
            root: root.clone(),
            loader: FileLoader::new(ctx.clone()),
            state: Arc::clone(&state),
            queue_tx,
        });

        let completed = run_load_phase(&candidates, &shared, &skips, &ctx, &opts)?;
        drop(shared);

        let mut summary = IngestSummary {
            to_load: candidates.len(),
            ..IngestSummary::default()
        };

        if !completed || ctx.is_cancelled() {
            state.quiet.store(true, Ordering::SeqCst);
            ticker.stop();
            summary.loaded = state.loaded.load(Ordering::SeqCst);
            summary.awaiting_insert = state.awaiting_insert.load(Ordering::SeqCst);
            summary.skipped_too_long = skips.into_vec();
            summary.cancelled = true;
            info!(
                "Cancelled after loading {} of {} file(s); nothing inserted",
                summary.loaded, summary.to_load
            );
            return Ok(summary);
        }

        report_safely(reporter.as_ref(), &state);
        state.set_phase(Phase::Insert);
        let inserted = run_insert_phase(store, &queue_rx, &state);
        ticker.stop();
        let inserted = inserted?;
        report_safely(reporter.as_ref(), &state);

        summary.loaded = state.loaded.load(Ordering::SeqCst);
        summary.awaiting_insert = state.awaiting_insert.load(Ordering::SeqCst);
        summary.inserted = inserted;
        summary.skipped_too_long = skips.into_vec();
        Ok(summary)
    }
}

/// Phase 1. Returns false when cancellation stopped the fan-out or the wait.
fn run_load_phase(
    candidates: &[CandidateFile],
    shared: &Arc<TaskShared>,
    skips: &SkipList,
    ctx: &IngestContext,
    opts: &IngestOpts,
) -> Result<bool> {
    let pool = match opts.max_concurrency {
        Some(n) => Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(n.max(1))
                .thread_name(|i| format!("loader-{i}"))
                .build()?,
        ),
        None => None,
    };

    // Every task holds a clone; the channel disconnects once the last task is done.
    let (done_tx, done_rx) = unbounded::<()>();
    let mut launched = 0_usize;
    for candidate in candidates {
        if ctx.is_cancelled() {
            debug!("Cancelled after launching {launched} load task(s)");
            return Ok(false);
        }
        let relative = match resolve_relative(
            &candidate.path,
            &shared.root,
            opts.max_dir_len,
            opts.max_path_len,
        ) {
            Ok(rel) => rel,
            Err(e) => {
                if skips.record(&e.folder) {
                    warn!("Skipping folder: {e}");
                }
                continue;
            }
        };

        let task = {
            let shared = Arc::clone(shared);
            let candidate = candidate.clone();
            let done_tx = done_tx.clone();
            move || {
                let _done = done_tx;
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    load_one(&shared, &candidate, &relative)
                }));
                if outcome.is_err() {
                    warn!("Load task panicked for {}", candidate.path.display());
                }
            }
        };
        match &pool {
            Some(pool) => pool.spawn(task),
            None => rayon::spawn(task),
        }
        launched += 1;
    }
    drop(done_tx);
    debug!("Launched {launched} load task(s)");

    Ok(wait_for_tasks(&done_rx, ctx))
}

/// One task: load, then the completion handler (counters, last loaded, queue).
fn load_one(shared: &TaskShared, candidate: &CandidateFile, relative: &str) {
    let state = &shared.state;
    let record = shared.loader.load(candidate, relative, |rec| {
        state.loaded.fetch_add(1, Ordering::SeqCst);
        let preview = rec.is_image().then(|| rec.full_path(&shared.root));
        state.set_last_loaded(rec.file.clone(), preview);
    });
    if shared.loader.is_cancelled() {
        state.quiet.store(true, Ordering::SeqCst);
        return;
    }
    if record.requires_insert && shared.queue_tx.send(record).is_ok() {
        state.awaiting_insert.fetch_add(1, Ordering::SeqCst);
    }
}

/// Block until every task has finished. Returns false if cancelled mid-wait.
fn wait_for_tasks(done_rx: &Receiver<()>, ctx: &IngestContext) -> bool {
    loop {
        match done_rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(()) => continue,
            Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => {
                if ctx.is_cancelled() {
                    debug!("Cancelled while waiting for load tasks");
                    return false;
                }
            }
        }
    }
}

/// Phase 2: drain, sort by (relative path, file name), insert once.
fn run_insert_phase(
    store: &mut dyn FileStore,
    queue_rx: &Receiver<FileRecord>,
    state: &ProgressState,
) -> Result<usize> {
    let mut records: Vec<FileRecord> = queue_rx.try_iter().collect();
    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    state.awaiting_insert.store(records.len(), Ordering::SeqCst);
    debug!("Inserting {} record(s)", records.len());

    let inserted = store.insert_files(&records, &mut |rec, idx| {
        state.inserted.store(idx + 1, Ordering::SeqCst);
        state.set_last_inserted(rec.file.clone());
    })?;
    info!("Inserted {inserted} record(s)");
    Ok(inserted)
}
