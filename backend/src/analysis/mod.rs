//! Video analysis pipeline
//!
//! Upload, readiness polling and inference run in sequence for each request,
//! with a synthetic progress ticker alongside and a cleanup pass at the end.
mod cleanup;
mod context;
mod error;
pub mod invoker;
mod pipeline;
pub mod poller;
pub mod progress;
mod prompt;
pub mod response_text;
pub mod uploader;

use std::path::PathBuf;

pub use cleanup::CleanupCoordinator;
pub use context::AnalysisContext;
pub use error::{AnalysisError, PipelineResult};
pub use pipeline::{AnalysisPipeline, AnalysisSource};
pub use poller::PollPolicy;
pub use progress::{ProgressSink, TracingProgressSink};
pub use uploader::{MediaPayload, RoutingPolicy, MAX_INLINE_UPLOAD_BYTES};

/// Deployment settings for the pipeline
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub poll: PollPolicy,
    pub routing: RoutingPolicy,
    /// Directory for per-request temp files
    pub scratch_dir: PathBuf,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            routing: RoutingPolicy::default(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}
