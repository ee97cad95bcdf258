//! Persistent metadata tool: one long-lived process, many correlated commands.

mod config;
mod error;
mod manager;
mod process;
mod protocol;

pub use config::{CommunicationMethod, ToolConfig};
pub use error::ToolError;
pub use manager::{StopHandle, ToolManager, sweep_processes};
pub use process::{ProcessState, ToolProcess};
pub use protocol::{CommandRequest, CommandResponse, parse_metadata};
