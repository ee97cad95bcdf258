//! Lazily started, shareable owner of the metadata tool process.

use log::{debug, warn};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use sysinfo::{ProcessesToUpdate, System};

use super::{ProcessState, ToolConfig, ToolError, ToolProcess};

/// Starts the tool on first use and stops it on request.
///
/// Share one manager (behind an `Arc`) between all loader tasks; commands are serialized
/// by the process itself.
pub struct ToolManager {
    config: ToolConfig,
    process: Arc<ToolProcess>,
}

/// Completion of a [`ToolManager::stop`]. Dropping it detaches the stop threads.
pub struct StopHandle {
    threads: Vec<JoinHandle<()>>,
}

impl StopHandle {
    /// Block until the stop (and the sweep, if any) has finished.
    pub fn wait(self) {
        for t in self.threads {
            let _ = t.join();
        }
    }
}

impl ToolManager {
    /// Fails fast with [`ToolError::NotFound`] if the executable is missing. Nothing is spawned yet.
    pub fn new(config: ToolConfig) -> Result<Self, ToolError> {
        let process = ToolProcess::new(config.clone())?;
        debug!("metadata tool: using {}", process.exe().display());
        Ok(Self {
            config,
            process: Arc::new(process),
        })
    }

    /// Start the process unless it is already running. Safe to call from many threads.
    pub fn start_if_needed(&self) -> Result<Arc<ToolProcess>, ToolError> {
        if self.process.state() != ProcessState::Ready {
            self.process.ensure_started()?;
        }
        Ok(Arc::clone(&self.process))
    }

    /// Tag → value pairs for one file. See [`ToolProcess::fetch_metadata`].
    pub fn fetch_metadata(
        &self,
        path: &Path,
        tags: Option<&[String]>,
    ) -> Result<HashMap<String, String>, ToolError> {
        self.start_if_needed()?.fetch_metadata(path, tags)
    }

    pub fn is_started(&self) -> bool {
        self.process.state() == ProcessState::Ready
    }

    /// The managed process (for version, pid and restart counts).
    pub fn process(&self) -> Arc<ToolProcess> {
        Arc::clone(&self.process)
    }

    /// Best-effort stop in the background. With `sweep_on_stop`, any process still named
    /// like the executable is killed after `kill_sweep_delay`.
    pub fn stop(&self) -> StopHandle {
        let mut threads = Vec::new();
        let process = Arc::clone(&self.process);
        match thread::Builder::new()
            .name("tool-stop".into())
            .spawn(move || process.stop())
        {
            Ok(t) => threads.push(t),
            Err(e) => warn!("metadata tool: could not spawn stop thread: {e}"),
        }
        if self.config.sweep_on_stop
            && let Some(name) = self.process.exe().file_name().map(OsString::from)
        {
            let delay = self.config.kill_sweep_delay;
            let spawned = thread::Builder::new()
                .name("tool-sweep".into())
                .spawn(move || {
                    thread::sleep(delay);
                    let killed = sweep_processes(&name);
                    if killed > 0 {
                        debug!("metadata tool: swept {killed} leftover process(es)");
                    }
                });
            match spawned {
                Ok(t) => threads.push(t),
                Err(e) => warn!("metadata tool: could not spawn sweep thread: {e}"),
            }
        }
        StopHandle { threads }
    }
}

impl Drop for ToolManager {
    fn drop(&mut self) {
        if self.process.state() == ProcessState::Ready {
            self.process.stop();
        }
    }
}

/// Kill every OS process whose name is exactly `name`. Returns how many were signalled.
pub fn sweep_processes(name: &OsStr) -> usize {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .processes_by_exact_name(name)
        .filter(|p| p.kill())
        .count()
}
