//! Engine module: storage, discovery, path tools, progress bar and CLI plumbing

pub mod arg_parser;
pub mod cli;
pub mod db_ops;
pub mod discover;
pub mod progress;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use cli::handle_run;
pub use db_ops::{FileStore, SqliteStore, open_db, open_db_in_memory};
pub use discover::discover_candidates;
pub use tools::{media_type_for, path_relative_to, path_to_db_string};
