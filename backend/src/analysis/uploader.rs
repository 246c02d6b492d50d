//! Size routing and the transfer of media to the vendor

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use common_types::UploadStrategy;
use uuid::Uuid;

use super::{AnalysisContext, AnalysisError, PipelineResult};
use crate::gemini_api::{GenerativeApi, RemoteFile};
use crate::media_storage::ObjectStore;

/// Hard cap for payloads sent through the API (100 MiB)
pub const MAX_INLINE_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Display name given to vendor files when the client sent none
pub const DEFAULT_DISPLAY_NAME: &str = "dise-video";

/// Decides how a file of a given size reaches the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPolicy {
    inline_threshold: u64,
    vendor_reads_storage_uri: bool,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            inline_threshold: MAX_INLINE_UPLOAD_BYTES,
            vendor_reads_storage_uri: false,
        }
    }
}

impl RoutingPolicy {
    /// # Errors
    ///
    /// Returns `AnalysisError::Configuration` when the threshold is zero or
    /// above [`MAX_INLINE_UPLOAD_BYTES`]
    pub fn new(inline_threshold: u64, vendor_reads_storage_uri: bool) -> PipelineResult<Self> {
        if inline_threshold == 0 || inline_threshold > MAX_INLINE_UPLOAD_BYTES {
            return Err(AnalysisError::Configuration(format!(
                "inline threshold must be between 1 and {MAX_INLINE_UPLOAD_BYTES} bytes, got {inline_threshold}"
            )));
        }

        Ok(Self {
            inline_threshold,
            vendor_reads_storage_uri,
        })
    }

    #[must_use]
    pub const fn inline_threshold(&self) -> u64 {
        self.inline_threshold
    }

    #[must_use]
    pub const fn vendor_reads_storage_uri(&self) -> bool {
        self.vendor_reads_storage_uri
    }

    /// Strategy for media that is already in the object store
    #[must_use]
    pub const fn stored_strategy(&self) -> UploadStrategy {
        if self.vendor_reads_storage_uri {
            UploadStrategy::UriPassthrough
        } else {
            UploadStrategy::SignedUrl
        }
    }

    /// The one place the size threshold is applied
    #[must_use]
    pub const fn select_strategy(&self, content_length: u64) -> UploadStrategy {
        if content_length <= self.inline_threshold {
            UploadStrategy::Inline
        } else {
            self.stored_strategy()
        }
    }

    /// Refuses inline payloads that belong on the large-file path
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::SizeLimit` with the configured threshold as limit
    pub fn ensure_inline(&self, size: u64) -> PipelineResult<()> {
        ensure_inline_size(size)?;
        if self.select_strategy(size) != UploadStrategy::Inline {
            return Err(AnalysisError::SizeLimit {
                size,
                limit: self.inline_threshold,
            });
        }
        Ok(())
    }
}

/// Video received in the request body
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub bytes: Bytes,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl MediaPayload {
    #[must_use]
    pub fn new(bytes: Bytes, mime_type: impl Into<String>, file_name: Option<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name,
        }
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or(DEFAULT_DISPLAY_NAME)
    }
}

/// # Errors
///
/// Returns `AnalysisError::SizeLimit` above the hard cap
pub fn ensure_inline_size(size: u64) -> PipelineResult<()> {
    if size > MAX_INLINE_UPLOAD_BYTES {
        return Err(AnalysisError::SizeLimit {
            size,
            limit: MAX_INLINE_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// # Errors
///
/// Returns `AnalysisError::UnsupportedMedia` unless `mime_type` is a `video/*` type
pub fn ensure_video_mime(mime_type: &str) -> PipelineResult<()> {
    match mime_type.parse::<mime::Mime>() {
        Ok(parsed) if parsed.type_() == mime::VIDEO => Ok(()),
        _ => Err(AnalysisError::UnsupportedMedia(mime_type.to_string())),
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/mpeg" => "mpeg",
        "video/x-msvideo" => "avi",
        _ => "bin",
    }
}

/// Unique scratch path for one request
#[must_use]
pub fn temp_file_path(scratch_dir: &Path, mime_type: &str) -> PathBuf {
    scratch_dir.join(format!("{}.{}", Uuid::new_v4(), extension_for(mime_type)))
}

/// # Errors
///
/// Returns `AnalysisError::Upload` if the file cannot be written
pub async fn write_temp_file(path: &Path, bytes: &[u8]) -> PipelineResult<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| AnalysisError::Upload(format!("failed to write {}: {e}", path.display())))
}

/// Sends a local file to the vendor, aborting the transfer on cancellation
///
/// # Errors
///
/// Returns `AnalysisError::Cancelled` when the request is cancelled first,
/// otherwise the mapped vendor error
pub async fn forward_to_vendor(
    api: &dyn GenerativeApi,
    path: &Path,
    mime_type: &str,
    display_name: &str,
    ctx: &AnalysisContext,
) -> PipelineResult<RemoteFile> {
    tokio::select! {
        biased;
        () = ctx.cancellation().cancelled() => Err(AnalysisError::Cancelled),
        result = api.upload_file(path, mime_type, display_name) => {
            result.map_err(AnalysisError::upload)
        }
    }
}

/// Copies a stored object into a local file, aborting on cancellation
///
/// # Errors
///
/// Returns `AnalysisError::Cancelled` when the request is cancelled first,
/// otherwise the mapped storage error
pub async fn fetch_from_storage(
    store: &dyn ObjectStore,
    object_key: &str,
    path: &Path,
    ctx: &AnalysisContext,
) -> PipelineResult<u64> {
    tokio::select! {
        biased;
        () = ctx.cancellation().cancelled() => Err(AnalysisError::Cancelled),
        result = store.download_to_file(object_key, path) => Ok(result?),
    }
}
