//! Pipeline components: context, per-file loader, path checks, progress, two-pass orchestrator.

pub mod context;
pub mod loader;
pub mod orchestrator;
pub mod progress;
pub mod skip;

pub use context::{CancelSignal, IngestContext, NeverCancel};
pub use loader::{
    FileLoader, MEDIA_ID_FIELD, MEDIA_TYPE_FIELD, OBSERVATION_ID_FIELD, parse_capture_time,
};
pub use orchestrator::ImageSetLoader;
pub use progress::{NoProgress, ProgressReporter};
pub use skip::{PathTooLong, SkipList, resolve_relative};
