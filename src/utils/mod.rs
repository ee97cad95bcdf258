pub mod config;
pub(crate) mod imgload_toml;
pub mod logger;

pub use config::*;
pub use logger::{Colors, setup_logging};
