//! Ingestion context: cancellation, load settings and the shared tool, passed into the
//! pipeline and threaded through to every loader task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::LoadSettings;
use crate::tool::ToolManager;

/// Read-only view of an externally owned cancellation source.
pub trait CancelSignal: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

impl CancelSignal for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

impl<T: CancelSignal + ?Sized> CancelSignal for Arc<T> {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// Signal that is never raised.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared state for one ingestion run. Cheap to clone; every clone sees the same signal and tool.
#[derive(Clone)]
pub struct IngestContext {
    pub cancel: Arc<dyn CancelSignal>,
    pub load: LoadSettings,
    /// Metadata tool. `None` loads core fields only.
    pub tool: Option<Arc<ToolManager>>,
}

impl IngestContext {
    pub fn new(cancel: Arc<dyn CancelSignal>, load: LoadSettings) -> Self {
        Self {
            cancel,
            load,
            tool: None,
        }
    }

    pub fn with_tool(mut self, tool: Arc<ToolManager>) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for IngestContext {
    fn default() -> Self {
        Self::new(Arc::new(NeverCancel), LoadSettings::default())
    }
}
