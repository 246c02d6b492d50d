//! Universal error handling for the API

use aide::OperationOutput;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use schemars::JsonSchema;
use serde::Serialize;

use crate::{analysis::AnalysisError, media_storage::BucketError};

/// Client closed the request before the response was ready (nginx convention)
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// API error envelope, shaped like a failed `AnalysisResponse`
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    /// Always `false`
    success: bool,
    /// Human-readable error message
    error: &'static str,
    /// Machine-readable error code
    code: &'static str,
    /// Whether the client should retry the request
    pub allow_retry: bool,
}

/// Application error type that wraps the API error response
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    inner: ApiErrorResponse,
}

impl AppError {
    /// Create a new application error
    #[must_use]
    pub const fn new(
        status: StatusCode,
        code: &'static str,
        msg: &'static str,
        retry: bool,
    ) -> Self {
        Self {
            status,
            inner: ApiErrorResponse {
                success: false,
                error: msg,
                code,
                allow_retry: retry,
            },
        }
    }

    /// HTTP status of the error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.inner.code
    }

    /// Human-readable message shown to the user
    #[must_use]
    pub const fn message(&self) -> &'static str {
        self.inner.error
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error based on status code
        match self.status.as_u16() {
            400..=499 => tracing::warn!(
                "Client error: {} - {}",
                self.inner.code,
                self.inner.error
            ),
            500..=599 => tracing::error!(
                "Server error: {} - {}",
                self.inner.code,
                self.inner.error
            ),
            _ => {}
        }

        (self.status, Json(self.inner)).into_response()
    }
}

/// Convert bucket errors to application errors
impl From<BucketError> for AppError {
    #[allow(clippy::cognitive_complexity)]
    fn from(err: BucketError) -> Self {
        use BucketError::{AwsError, ConfigError, InvalidInput, Io, NotFound, S3Error, UpstreamError};

        match &err {
            NotFound(key) => {
                tracing::debug!("Object not found: {key}");
                Self::new(
                    StatusCode::NOT_FOUND,
                    "not_found",
                    "Uploaded video not found in storage",
                    false,
                )
            }
            UpstreamError(msg) | S3Error(msg) | AwsError(msg) => {
                tracing::error!("Storage upstream error: {msg}");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "Storage service temporarily unavailable",
                    true,
                )
            }
            Io(msg) => {
                tracing::error!("Storage I/O error: {msg}");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                    true,
                )
            }
            ConfigError(msg) => {
                tracing::error!("Configuration error: {msg}");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    "Server configuration is incomplete",
                    false,
                )
            }
            InvalidInput(msg) => {
                tracing::warn!("Invalid input: {msg}");
                Self::new(
                    StatusCode::BAD_REQUEST,
                    "invalid_input",
                    "Invalid input provided",
                    false,
                )
            }
        }
    }
}

/// Convert pipeline errors to application errors
///
/// Internal detail (vendor payloads, reason codes) is logged here and never
/// reaches the response body.
impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match &err {
            AnalysisError::Configuration(_) => tracing::error!("Analysis failed: {err}"),
            AnalysisError::SizeLimit { .. } | AnalysisError::Cancelled => {
                tracing::info!("Analysis stopped: {err}");
            }
            _ => tracing::warn!("Analysis failed: {err}"),
        }

        let status = match &err {
            AnalysisError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AnalysisError::SizeLimit { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AnalysisError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AnalysisError::Upload(_)
            | AnalysisError::Upstream(_)
            | AnalysisError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            AnalysisError::Processing(_) | AnalysisError::ContentRejected(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AnalysisError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AnalysisError::NotFound(_) => StatusCode::NOT_FOUND,
            AnalysisError::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::BAD_REQUEST),
        };

        Self::new(status, err.code(), err.user_message(), err.is_retryable())
    }
}

impl OperationOutput for AppError {
    type Inner = ApiErrorResponse;

    fn operation_response(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Option<aide::openapi::Response> {
        Json::<ApiErrorResponse>::operation_response(ctx, operation)
    }
}
