use thiserror::Error;

use crate::{gemini_api::GeminiError, media_storage::BucketError};

/// Result type for pipeline stages
pub type PipelineResult<T> = Result<T, AnalysisError>;

/// Failure of an analysis request
///
/// The `Display` text is diagnostic and only goes to logs; callers get
/// [`AnalysisError::user_message`].
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Missing or invalid credentials or settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Payload larger than the inline cap
    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    SizeLimit {
        /// Payload size in bytes
        size: u64,
        /// Applicable limit in bytes
        limit: u64,
    },

    /// Declared media type is not a video
    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// Transport failure while sending the video
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Transport failure talking to the vendor or the store
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Vendor reported the file as FAILED
    #[error("Remote processing failed for {0}")]
    Processing(String),

    /// File never became ACTIVE within the polling budget
    #[error("Remote processing timed out after {attempts} polls")]
    Timeout {
        /// Polls issued before giving up
        attempts: u32,
    },

    /// Vendor refused the content; holds the internal reason code
    #[error("Content rejected by vendor: {0}")]
    ContentRejected(String),

    /// Vendor output could not be parsed into a result
    #[error("Malformed vendor response: {0}")]
    MalformedResponse(String),

    /// Storage object to analyze does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Request cancelled by the caller
    #[error("Analysis cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Machine-readable code for the API envelope
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::SizeLimit { .. } => "payload_too_large",
            Self::UnsupportedMedia(_) => "unsupported_media_type",
            Self::Upload(_) | Self::Upstream(_) => "upstream_error",
            Self::Processing(_) => "processing_failed",
            Self::Timeout { .. } => "processing_timeout",
            Self::ContentRejected(_) => "content_rejected",
            Self::MalformedResponse(_) => "malformed_response",
            Self::NotFound(_) => "not_found",
            Self::Cancelled => "cancelled",
        }
    }

    /// Single human-readable message shown to the user
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "The analysis service is not configured",
            Self::SizeLimit { .. } => "File too large to send directly. Upload it through storage instead",
            Self::UnsupportedMedia(_) => "Only video files can be analyzed",
            Self::Upload(_) => "Failed to upload the video",
            Self::Upstream(_) => "The analysis service is temporarily unavailable",
            Self::Processing(_) => "The video could not be processed",
            Self::Timeout { .. } => "Timed out waiting for the video to be processed",
            Self::ContentRejected(_) => {
                "Video not accepted by the analysis system. Try another video"
            }
            Self::MalformedResponse(_) => "The analysis returned an invalid result",
            Self::NotFound(_) => "Uploaded video not found in storage",
            Self::Cancelled => "Analysis cancelled",
        }
    }

    /// Whether resubmitting the same request may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upload(_) | Self::Upstream(_) | Self::Timeout { .. } | Self::MalformedResponse(_)
        )
    }

    /// Maps a vendor error raised while sending the video
    pub(crate) fn upload(err: GeminiError) -> Self {
        match err {
            GeminiError::MissingApiKey => Self::Configuration(err.to_string()),
            _ => Self::Upload(err.to_string()),
        }
    }

    /// Maps a vendor error raised by a state query or inference call
    pub(crate) fn upstream(err: GeminiError) -> Self {
        match err {
            GeminiError::MissingApiKey => Self::Configuration(err.to_string()),
            _ => Self::Upstream(err.to_string()),
        }
    }
}

impl From<BucketError> for AnalysisError {
    fn from(err: BucketError) -> Self {
        match err {
            BucketError::ConfigError(msg) => Self::Configuration(msg),
            BucketError::NotFound(key) => Self::NotFound(key),
            other => Self::Upstream(other.to_string()),
        }
    }
}
