use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::progress::{ProgressSink, TracingProgressSink};

/// Per-request state handed to every pipeline stage
///
/// Nothing in here is shared between requests.
#[derive(Clone)]
pub struct AnalysisContext {
    cancellation: CancellationToken,
    progress: Arc<dyn ProgressSink>,
}

impl AnalysisContext {
    #[must_use]
    pub fn new(cancellation: CancellationToken, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            cancellation,
            progress,
        }
    }

    /// Context for a request nobody can cancel and nobody watches progress of
    #[must_use]
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), Arc::new(TracingProgressSink))
    }

    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    #[must_use]
    pub fn progress(&self) -> Arc<dyn ProgressSink> {
        self.progress.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
