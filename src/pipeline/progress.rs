//! Progress reporting: a passive sink fed by a timer thread during both phases.

use anyhow::Result;
use crossbeam_channel::{Sender, bounded, select, tick};
use log::debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::{LoadProgress, Phase};

/// Receives periodic [`LoadProgress`] snapshots.
///
/// May be called after the run was cancelled, with counts that no longer move. Errors
/// and panics are caught and discarded.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: &LoadProgress) -> Result<()>;
}

impl<F> ProgressReporter for F
where
    F: Fn(&LoadProgress) -> Result<()> + Send + Sync,
{
    fn report(&self, progress: &LoadProgress) -> Result<()> {
        self(progress)
    }
}

/// Reporter that ignores everything.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _progress: &LoadProgress) -> Result<()> {
        Ok(())
    }
}

/// Counters shared between loader tasks, the insert loop and the ticker.
#[derive(Default)]
pub struct ProgressState {
    phase: AtomicU8,
    pub to_load: AtomicUsize,
    pub loaded: AtomicUsize,
    pub awaiting_insert: AtomicUsize,
    pub inserted: AtomicUsize,
    /// Set on cancellation: Phase 1 ticks stop.
    pub quiet: AtomicBool,
    last_loaded: Mutex<Option<(String, Option<PathBuf>)>>,
    last_inserted: Mutex<Option<String>>,
}

impl ProgressState {
    pub fn new(to_load: usize) -> Self {
        let state = Self::default();
        state.to_load.store(to_load, Ordering::SeqCst);
        state
    }

    pub fn phase(&self) -> Phase {
        match self.phase.load(Ordering::SeqCst) {
            2 => Phase::Insert,
            _ => Phase::Load,
        }
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.number(), Ordering::SeqCst);
    }

    /// Last-writer-wins record of the latest loaded file (and its preview path, for images).
    pub fn set_last_loaded(&self, name: String, preview: Option<PathBuf>) {
        *self
            .last_loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((name, preview));
    }

    pub fn set_last_inserted(&self, name: String) {
        *self
            .last_inserted
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(name);
    }

    pub fn snapshot(&self) -> LoadProgress {
        let phase = self.phase();
        let (current, total, current_name, preview) = match phase {
            Phase::Load => {
                let last = self
                    .last_loaded
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                let (name, preview) = last.unzip();
                (
                    self.loaded.load(Ordering::SeqCst),
                    self.to_load.load(Ordering::SeqCst),
                    name,
                    preview.flatten(),
                )
            }
            Phase::Insert => (
                self.inserted.load(Ordering::SeqCst),
                self.awaiting_insert.load(Ordering::SeqCst),
                self.last_inserted
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
                None,
            ),
        };
        LoadProgress {
            phase,
            percent: percent(current, total),
            current,
            total,
            current_name,
            preview,
        }
    }
}

/// `100 * current / total`, clamped; 100 for an empty phase.
pub fn percent(current: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((current.min(total) as u128 * 100) / total as u128) as u32
}

/// Call `reporter` with a snapshot, swallowing errors and panics.
pub fn report_safely(reporter: &dyn ProgressReporter, state: &ProgressState) {
    let progress = state.snapshot();
    match catch_unwind(AssertUnwindSafe(|| reporter.report(&progress))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("progress reporter failed: {e}"),
        Err(_) => debug!("progress reporter panicked"),
    }
}

/// Timer thread reporting every `interval` until stopped.
pub struct Ticker {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn(
        reporter: Arc<dyn ProgressReporter>,
        state: Arc<ProgressState>,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticks = tick(interval);
        let handle = thread::Builder::new()
            .name("progress".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(ticks) -> _ => {
                            let muted = state.phase() == Phase::Load
                                && state.quiet.load(Ordering::SeqCst);
                            if !muted {
                                report_safely(reporter.as_ref(), &state);
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            })?;
        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for an in-flight report to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_handles_empty_and_overflowing_counts() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(5, 4), 100);
    }

    #[test]
    fn insert_phase_snapshot_has_no_preview() {
        let state = ProgressState::new(2);
        state.set_last_loaded("x.jpg".into(), Some(PathBuf::from("/set/x.jpg")));
        state.loaded.store(1, Ordering::SeqCst);
        let p = state.snapshot();
        assert_eq!((p.phase, p.percent), (Phase::Load, 50));
        assert_eq!(p.preview, Some(PathBuf::from("/set/x.jpg")));

        state.set_phase(Phase::Insert);
        state.awaiting_insert.store(1, Ordering::SeqCst);
        state.set_last_inserted("x.jpg".into());
        let p = state.snapshot();
        assert_eq!(p.phase, Phase::Insert);
        assert_eq!(p.current_name.as_deref(), Some("x.jpg"));
        assert!(p.preview.is_none());
    }

    #[test]
    fn failing_reporter_is_contained() {
        let state = ProgressState::new(1);
        report_safely(&|_: &LoadProgress| -> Result<()> { anyhow::bail!("sink closed") }, &state);
        report_safely(&|_: &LoadProgress| -> Result<()> { panic!("sink broke") }, &state);
    }
}
