//! Progress bar utilities for displaying load and insert status

use anyhow::Result;
use kdam::{Animation, Bar, BarExt};
use std::sync::Mutex;

use crate::pipeline::ProgressReporter;
use crate::{LoadProgress, Phase};

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: &'static str,
    pub animation: Animation,
}

impl ProgressBarConfig {
    /// Create a new progress bar configuration
    pub fn new(total: usize, desc: &'static str, animation: Animation) -> Self {
        Self {
            total,
            desc,
            animation,
        }
    }
}

/// Create a progress bar with the given configuration
pub fn create_progress_bar(config: ProgressBarConfig) -> Bar {
    kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation,
        unit = " files"
    )
}

fn phase_desc(phase: Phase) -> &'static str {
    match phase {
        Phase::Load => "Loading",
        Phase::Insert => "Inserting",
    }
}

/// Terminal reporter: one kdam bar per phase, replaced when the phase changes.
pub struct BarReporter {
    bar: Mutex<Option<(Phase, Bar)>>,
}

impl BarReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    /// Leave the last bar on screen and move to a fresh line.
    pub fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock()
            && let Some((_, bar)) = slot.as_mut()
        {
            let _ = bar.refresh();
            eprintln!();
        }
    }
}

impl Default for BarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarReporter {
    fn report(&self, progress: &LoadProgress) -> Result<()> {
        // Use try_lock to avoid blocking the ticker; the next tick catches up.
        let Ok(mut slot) = self.bar.try_lock() else {
            return Ok(());
        };
        if slot.as_ref().map(|(phase, _)| *phase) != Some(progress.phase) {
            if let Some((_, old)) = slot.as_mut() {
                let _ = old.refresh();
                eprintln!();
            }
            let config = ProgressBarConfig::new(
                progress.total,
                phase_desc(progress.phase),
                Animation::Classic,
            );
            *slot = Some((progress.phase, create_progress_bar(config)));
        }
        if let Some((_, bar)) = slot.as_mut() {
            bar.total = progress.total;
            if let Some(name) = &progress.current_name {
                bar.set_postfix(name.clone());
            }
            bar.update_to(progress.current)?;
        }
        Ok(())
    }
}
