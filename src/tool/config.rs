//! Settings for one metadata tool process and where its executable lives.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::config::ToolConsts;

use super::ToolError;

/// How a command reaches the tool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommunicationMethod {
    /// Direct first; retried once via an argument file when the error text hints at a
    /// filename encoding problem.
    #[default]
    Auto,
    /// Write the command lines straight to stdin.
    Direct,
    /// Write the command to a temporary argument file and pass it with `-@`.
    /// Handles accented file names but is slower.
    ViaFile,
}

#[derive(Clone, Debug)]
pub struct ToolConfig {
    /// Executable path. `None` looks for [`ToolConsts::EXE_NAME`] next to the running binary.
    pub exe_path: Option<PathBuf>,
    /// Startup arguments (stay-open session, fixed formats).
    pub args: Vec<String>,
    pub method: CommunicationMethod,
    /// Restart the process when it exits without a stop request.
    pub resurrect: bool,
    pub error_grace: Duration,
    pub stop_timeout: Duration,
    pub response_timeout: Duration,
    pub startup_timeout: Duration,
    /// After a manager stop, kill any process named like the executable.
    pub sweep_on_stop: bool,
    pub kill_sweep_delay: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            exe_path: None,
            args: ToolConsts::STARTUP_ARGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            method: CommunicationMethod::Auto,
            resurrect: true,
            error_grace: ToolConsts::ERROR_GRACE,
            stop_timeout: ToolConsts::STOP_TIMEOUT,
            response_timeout: ToolConsts::RESPONSE_TIMEOUT,
            startup_timeout: ToolConsts::STARTUP_TIMEOUT,
            sweep_on_stop: true,
            kill_sweep_delay: ToolConsts::KILL_SWEEP_DELAY,
        }
    }
}

impl ToolConfig {
    pub fn with_exe(path: impl Into<PathBuf>) -> Self {
        Self {
            exe_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Resolve the executable; fails fast when it is not a file.
    pub fn resolve_exe(&self) -> Result<PathBuf, ToolError> {
        let path = match &self.exe_path {
            Some(p) => p.clone(),
            None => default_exe_path(),
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(ToolError::NotFound { path })
        }
    }
}

/// `EXE_NAME` in the directory of the running binary, or the bare name if that is unknown.
fn default_exe_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .map(|dir| dir.join(ToolConsts::EXE_NAME))
        .unwrap_or_else(|| PathBuf::from(ToolConsts::EXE_NAME))
}
