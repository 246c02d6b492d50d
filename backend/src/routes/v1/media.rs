use std::sync::Arc;

use axum::{Extension, Json};
use common_types::UploadStrategy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use validator::Validate;

use crate::{
    analysis::{uploader::ensure_video_mime, AnalysisPipeline, MAX_INLINE_UPLOAD_BYTES},
    media_storage::{issue_signed_upload, ObjectStore, SignedUpload},
    types::{AppError, ValidatedJson},
};

#[derive(Debug, Deserialize, Serialize, JsonSchema, Validate)]
#[schemars(deny_unknown_fields)]
pub struct PresignedUrlRequest {
    /// Original file name; unsafe characters are replaced in the object key
    #[validate(length(min = 1, max = 255))]
    #[schemars(length(min = 1, max = 255))]
    pub file_name: String,
    /// MIME type the upload will be sent with
    #[validate(length(min = 3, max = 127))]
    #[schemars(length(min = 3, max = 127))]
    pub content_type: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PresignedUrlResponse {
    /// Presigned URL to PUT the video to
    pub signed_url: String,
    /// Object key to pass to the storage analysis endpoint
    pub object_key: String,
    pub bucket_name: String,
    /// Canonical `s3://` URI of the object
    pub storage_uri: String,
    /// ISO-8601 UTC timestamp when the presigned URL expires
    pub expires_at: String,
}

impl From<SignedUpload> for PresignedUrlResponse {
    fn from(upload: SignedUpload) -> Self {
        Self {
            signed_url: upload.signed_url,
            object_key: upload.object_key,
            bucket_name: upload.bucket_name,
            storage_uri: upload.storage_uri,
            expires_at: upload.expires_at.to_rfc3339(),
        }
    }
}

/// Creates a presigned URL for uploading a video straight to storage
///
/// # Errors
///
/// - `configuration_error` if no bucket is configured
/// - `invalid_input` if the content type does not parse
/// - `upstream_error` if presigning fails
#[instrument(skip(store, payload))]
pub async fn create_presigned_upload_url(
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    ValidatedJson(payload): ValidatedJson<PresignedUrlRequest>,
) -> Result<Json<PresignedUrlResponse>, AppError> {
    let upload =
        issue_signed_upload(store.as_ref(), &payload.file_name, &payload.content_type).await?;

    Ok(Json(upload.into()))
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Validate)]
#[schemars(deny_unknown_fields)]
pub struct UploadPlanRequest {
    #[validate(length(min = 1, max = 255))]
    #[schemars(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(min = 3, max = 127))]
    #[schemars(length(min = 3, max = 127))]
    pub content_type: String,
    /// Size of the video in bytes
    #[validate(range(min = 1))]
    #[schemars(range(min = 1))]
    pub content_length: u64,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UploadPlanResponse {
    /// How the video should be sent
    pub strategy: UploadStrategy,
    /// Largest payload accepted by `POST /v1/analyses`
    pub max_inline_upload_bytes: u64,
    /// Signed upload to use when the strategy is not `inline`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<PresignedUrlResponse>,
}

/// Decides how a video of the given size should reach the service
///
/// Small videos are posted inline; larger ones get a signed upload in the
/// same response.
///
/// # Errors
///
/// - `unsupported_media_type` if the content type is not a video
/// - any error of [`create_presigned_upload_url`] on the large-file path
#[instrument(skip(pipeline, store, payload), fields(content_length = payload.content_length))]
pub async fn create_upload_plan(
    Extension(pipeline): Extension<Arc<AnalysisPipeline>>,
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    ValidatedJson(payload): ValidatedJson<UploadPlanRequest>,
) -> Result<Json<UploadPlanResponse>, AppError> {
    ensure_video_mime(&payload.content_type)?;

    let strategy = pipeline
        .settings()
        .routing
        .select_strategy(payload.content_length);
    tracing::debug!(%strategy, "Selected upload strategy");

    let upload = match strategy {
        UploadStrategy::Inline => None,
        UploadStrategy::SignedUrl | UploadStrategy::UriPassthrough => Some(
            issue_signed_upload(store.as_ref(), &payload.file_name, &payload.content_type)
                .await?
                .into(),
        ),
    };

    Ok(Json(UploadPlanResponse {
        strategy,
        max_inline_upload_bytes: MAX_INLINE_UPLOAD_BYTES,
        upload,
    }))
}
