//! Wire types shared between the analysis backend and its clients

mod analysis;
mod progress;

pub use analysis::{
    AnalysisReport, AnalysisResponse, AnalysisResult, AnatomicalLevel, CollapsePattern,
    LevelAnalysis, LevelSeverity, RangeError, Severity,
};
pub use progress::{ProgressStage, ProgressState};

use serde::{Deserialize, Serialize};
use strum::Display;

/// How a video travels from the caller to the inference vendor
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UploadStrategy {
    /// Payload posted to the backend, which forwards it to the vendor
    Inline,
    /// Payload uploaded to object storage through a signed URL, then forwarded by the backend
    SignedUrl,
    /// Payload uploaded to object storage and read by the vendor straight from its URI
    UriPassthrough,
}
