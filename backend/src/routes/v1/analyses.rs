use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use common_types::{AnalysisResponse, AnalysisResult, ProgressState};
use futures::{stream, Stream};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::instrument;
use validator::{Validate, ValidationError};

use crate::{
    analysis::{
        AnalysisContext, AnalysisPipeline, AnalysisSource, MediaPayload, PipelineResult,
        TracingProgressSink, MAX_INLINE_UPLOAD_BYTES,
    },
    types::{AppError, ValidatedJson},
};

/// Multipart form field carrying the video
pub const VIDEO_FIELD: &str = "video";

/// Assumed when the client does not label the part
const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Request body limit for the analysis routes: the inline cap plus room for multipart framing
#[allow(clippy::cast_possible_truncation)]
pub const MULTIPART_BODY_LIMIT: usize = MAX_INLINE_UPLOAD_BYTES as usize + 1024 * 1024;

const UPLOAD_KEY_PREFIX: &str = "uploads/";

fn multipart_error(err: &MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "File too large. Maximum allowed size is 100 MB",
            false,
        );
    }

    tracing::debug!("Malformed multipart body: {err}");
    AppError::new(
        StatusCode::BAD_REQUEST,
        "invalid_multipart",
        "Invalid multipart form data",
        false,
    )
}

/// Reads the `video` part of a multipart form
async fn read_video(mut multipart: Multipart) -> Result<MediaPayload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let mime_type = field
            .content_type()
            .unwrap_or(DEFAULT_VIDEO_MIME)
            .to_string();
        let file_name = field.file_name().map(ToString::to_string);
        let bytes = field.bytes().await.map_err(|e| multipart_error(&e))?;

        let payload = MediaPayload::new(bytes, mime_type, file_name);
        if payload.is_empty() {
            break;
        }
        return Ok(payload);
    }

    Err(AppError::new(
        StatusCode::BAD_REQUEST,
        "missing_video",
        "No video file provided",
        false,
    ))
}

/// Analyzes a video posted as multipart field `video`
///
/// # Errors
///
/// Returns the `AppError` mapped from the failed pipeline stage
#[instrument(skip_all)]
pub async fn analyze_upload(
    Extension(pipeline): Extension<Arc<AnalysisPipeline>>,
    multipart: Multipart,
) -> Result<Json<AnalysisResponse>, AppError> {
    let payload = read_video(multipart).await?;
    tracing::info!(size = payload.len(), mime_type = %payload.mime_type, "Received video");

    let ctx = AnalysisContext::new(CancellationToken::new(), Arc::new(TracingProgressSink));
    let result = pipeline
        .analyze(AnalysisSource::Inline(payload), &ctx)
        .await?;

    Ok(Json(AnalysisResponse::completed(result)))
}

fn validate_object_key(object_key: &str) -> Result<(), ValidationError> {
    if !object_key.starts_with(UPLOAD_KEY_PREFIX) || object_key.contains("..") {
        return Err(ValidationError::new("invalid_object_key"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Validate)]
#[schemars(deny_unknown_fields)]
pub struct StoredAnalysisRequest {
    /// Key returned by `POST /v1/media/presigned-urls`
    #[validate(length(min = 1, max = 1024), custom(function = "validate_object_key"))]
    #[schemars(length(min = 1, max = 1024))]
    pub object_key: String,
    /// MIME type the video was uploaded with
    #[validate(length(min = 3, max = 127))]
    #[schemars(length(min = 3, max = 127))]
    pub mime_type: String,
}

/// Analyzes a video previously uploaded through a signed URL
///
/// The stored object is deleted once the analysis ends, whatever the outcome.
///
/// # Errors
///
/// Returns the `AppError` mapped from the failed pipeline stage
#[instrument(skip(pipeline, payload), fields(object_key = %payload.object_key))]
pub async fn analyze_stored(
    Extension(pipeline): Extension<Arc<AnalysisPipeline>>,
    ValidatedJson(payload): ValidatedJson<StoredAnalysisRequest>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let ctx = AnalysisContext::new(CancellationToken::new(), Arc::new(TracingProgressSink));
    let source = AnalysisSource::Stored {
        object_key: payload.object_key,
        mime_type: payload.mime_type,
    };

    let result = pipeline.analyze(source, &ctx).await?;

    Ok(Json(AnalysisResponse::completed(result)))
}

/// State of an SSE response while the analysis runs
struct StreamState {
    progress: mpsc::UnboundedReceiver<ProgressState>,
    analysis: JoinHandle<PipelineResult<AnalysisResult>>,
    /// Cancels the analysis if the client goes away
    guard: DropGuard,
}

fn final_response(
    outcome: Result<PipelineResult<AnalysisResult>, tokio::task::JoinError>,
) -> AnalysisResponse {
    match outcome {
        Ok(Ok(result)) => AnalysisResponse::completed(result),
        Ok(Err(err)) => AnalysisResponse::failed(err.user_message()),
        Err(err) => {
            tracing::error!("Analysis task failed: {err}");
            AnalysisResponse::failed("Internal server error")
        }
    }
}

fn json_event(name: &'static str, data: &impl Serialize) -> Result<Event, Infallible> {
    let event = Event::default().event(name).json_data(data).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize {name} event: {e}");
        Event::default().event(name).data("{}")
    });
    Ok(event)
}

/// Analyzes a video posted as multipart field `video`, streaming progress
///
/// Answers with Server-Sent Events: `progress` events carrying the progress
/// state and one final `result` event. Closing the connection cancels the
/// analysis.
///
/// # Errors
///
/// Fails before the stream starts only if the multipart body is unusable
#[instrument(skip_all)]
pub async fn analyze_upload_stream(
    Extension(pipeline): Extension<Arc<AnalysisPipeline>>,
    multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let payload = read_video(multipart).await?;
    tracing::info!(
        size = payload.len(),
        mime_type = %payload.mime_type,
        "Received video for streaming analysis"
    );

    let (sender, receiver) = mpsc::unbounded_channel::<ProgressState>();
    let token = CancellationToken::new();
    let ctx = AnalysisContext::new(token.clone(), Arc::new(sender));

    // The context owns the only sender, so the channel closes when the task ends
    let analysis = tokio::spawn(async move {
        pipeline
            .analyze(AnalysisSource::Inline(payload), &ctx)
            .await
    });

    let state = StreamState {
        progress: receiver,
        analysis,
        guard: token.drop_guard(),
    };

    let events = stream::unfold(Some(state), |state| async move {
        let mut state = state?;

        if let Some(progress) = state.progress.recv().await {
            return Some((json_event("progress", &progress), Some(state)));
        }

        let response = final_response(state.analysis.await);
        let _token = state.guard.disarm();
        Some((json_event("result", &response), None))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
