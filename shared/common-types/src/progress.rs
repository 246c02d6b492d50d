use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Stage of an analysis request as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProgressStage {
    Idle,
    Uploading,
    Processing,
    Analyzing,
    Complete,
    Error,
}

/// Advisory progress snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub stage: ProgressStage,
    /// Percentage, 0-100
    pub progress: f64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
}

impl ProgressState {
    #[must_use]
    pub fn new(stage: ProgressStage, progress: f64, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress,
            message: message.into(),
            estimated_time_remaining: None,
        }
    }

    #[must_use]
    pub const fn with_remaining(mut self, seconds: u64) -> Self {
        self.estimated_time_remaining = Some(seconds);
        self
    }
}
