use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::process::ProcessState;

/// Faults talking to the metadata tool. A command the tool rejects is not one of these:
/// it comes back as an unsuccessful [`CommandResponse`](super::CommandResponse).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("metadata tool not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to spawn metadata tool {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata tool did not answer the version probe: {0}")]
    Handshake(String),

    #[error("metadata tool is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: ProcessState,
        actual: ProcessState,
    },

    #[error("metadata tool is not running")]
    NotRunning,

    /// Pipe broken or process gone while a command was in flight.
    #[error("lost contact with metadata tool: {0}")]
    Communication(String),

    /// Neither stdout nor stderr produced anything for the command in time.
    #[error("no response from metadata tool for command {tag} within {timeout:?}")]
    NoResponse { tag: u64, timeout: Duration },

    #[error("metadata tool I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// True when the session itself is unusable (as opposed to a setup problem).
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            ToolError::Communication(_) | ToolError::NoResponse { .. } | ToolError::Io(_)
        )
    }
}
