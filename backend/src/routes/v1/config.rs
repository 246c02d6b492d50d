use std::sync::Arc;

use axum::{Extension, Json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{AnalysisPipeline, MAX_INLINE_UPLOAD_BYTES},
    types::Environment,
};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MediaConfigResponse {
    /// Hard cap for videos posted inline, in bytes
    pub max_inline_upload_bytes: u64,
    /// Videos above this size go through storage
    pub inline_threshold_bytes: u64,
    /// Whether the vendor reads stored videos without a copy
    pub vendor_reads_storage_uri: bool,
    pub poll_max_attempts: u32,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
    /// Lifetime of signed upload URLs
    pub presigned_url_expiry_secs: u64,
}

/// Upload limits and polling policy of this deployment
#[allow(clippy::unused_async)]
pub async fn get_media_config(
    Extension(pipeline): Extension<Arc<AnalysisPipeline>>,
    Extension(environment): Extension<Environment>,
) -> Json<MediaConfigResponse> {
    let settings = pipeline.settings();

    Json(MediaConfigResponse {
        max_inline_upload_bytes: MAX_INLINE_UPLOAD_BYTES,
        inline_threshold_bytes: settings.routing.inline_threshold(),
        vendor_reads_storage_uri: settings.routing.vendor_reads_storage_uri(),
        poll_max_attempts: settings.poll.max_attempts(),
        poll_interval_ms: u64::try_from(settings.poll.poll_interval().as_millis())
            .unwrap_or(u64::MAX),
        poll_timeout_secs: settings.poll.total_timeout().as_secs(),
        presigned_url_expiry_secs: environment.presigned_url_expiry_secs(),
    })
}
