use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use common_types::{AnalysisResult, ProgressStage, ProgressState, UploadStrategy};
use tracing::instrument;

use super::cleanup::CleanupCoordinator;
use super::progress::{ProgressTicker, StageEstimates, StageWindow, ANALYZING, PROCESSING, UPLOADING};
use super::uploader::{
    ensure_video_mime, fetch_from_storage, forward_to_vendor, temp_file_path,
    write_temp_file, MediaPayload, DEFAULT_DISPLAY_NAME,
};
use super::{invoker, poller, AnalysisContext, AnalysisError, AnalysisSettings, PipelineResult};
use crate::gemini_api::{FileReference, GenerativeApi, RemoteFile};
use crate::media_storage::ObjectStore;

/// Where the video to analyze comes from
#[derive(Debug, Clone)]
pub enum AnalysisSource {
    /// Bytes posted with the request
    Inline(MediaPayload),
    /// Object previously uploaded through a signed URL
    Stored {
        object_key: String,
        mime_type: String,
    },
}

impl AnalysisSource {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Inline(_) => "inline",
            Self::Stored { .. } => "stored",
        }
    }
}

/// Drives upload, readiness polling and inference for one video
pub struct AnalysisPipeline {
    api: Arc<dyn GenerativeApi>,
    store: Arc<dyn ObjectStore>,
    settings: AnalysisSettings,
}

impl AnalysisPipeline {
    #[must_use]
    pub fn new(
        api: Arc<dyn GenerativeApi>,
        store: Arc<dyn ObjectStore>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            api,
            store,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Analyzes one video
    ///
    /// Every artifact created along the way is removed before this returns,
    /// whatever the outcome, and a terminal progress state is published.
    ///
    /// # Errors
    ///
    /// Returns the `AnalysisError` of the first stage that failed
    #[instrument(skip_all, fields(source = source.kind()))]
    pub async fn analyze(
        &self,
        source: AnalysisSource,
        ctx: &AnalysisContext,
    ) -> PipelineResult<AnalysisResult> {
        let mut cleanup = CleanupCoordinator::new(self.api.clone(), self.store.clone());
        let outcome = self.run_stages(source, ctx, &mut cleanup).await;
        cleanup.run().await;

        let terminal = match &outcome {
            Ok(result) => {
                let report = result.report();
                tracing::info!(
                    nadir = %report.nadir,
                    max_obstruction = report.max_obstruction,
                    confidence = result.nivel_confianca,
                    "Analysis complete"
                );
                ProgressState::new(ProgressStage::Complete, 100.0, "Analysis complete")
            }
            Err(AnalysisError::Cancelled) => {
                tracing::info!("Analysis cancelled");
                ProgressState::new(ProgressStage::Idle, 0.0, AnalysisError::Cancelled.user_message())
            }
            Err(e) => {
                tracing::warn!(code = e.code(), "Analysis failed: {e}");
                ProgressState::new(ProgressStage::Error, 0.0, e.user_message())
            }
        };
        ctx.progress().publish(terminal);

        outcome
    }

    async fn run_stages(
        &self,
        source: AnalysisSource,
        ctx: &AnalysisContext,
        cleanup: &mut CleanupCoordinator,
    ) -> PipelineResult<AnalysisResult> {
        if !self.api.is_configured() {
            return Err(AnalysisError::Configuration(
                "GOOGLE_API_KEY is not set".to_string(),
            ));
        }

        match source {
            AnalysisSource::Inline(payload) => self.analyze_inline(payload, ctx, cleanup).await,
            AnalysisSource::Stored {
                object_key,
                mime_type,
            } => {
                self.analyze_stored(object_key, mime_type, ctx, cleanup)
                    .await
            }
        }
    }

    async fn analyze_inline(
        &self,
        payload: MediaPayload,
        ctx: &AnalysisContext,
        cleanup: &mut CleanupCoordinator,
    ) -> PipelineResult<AnalysisResult> {
        self.settings.routing.ensure_inline(payload.len())?;
        ensure_video_mime(&payload.mime_type)?;

        let estimates = StageEstimates::for_size(payload.len());
        let path = temp_file_path(&self.settings.scratch_dir, &payload.mime_type);
        cleanup.track_temp_file(path.clone());

        let remote = with_progress(UPLOADING, &estimates, ctx, async {
            write_temp_file(&path, &payload.bytes).await?;
            forward_to_vendor(
                self.api.as_ref(),
                &path,
                &payload.mime_type,
                payload.display_name(),
                ctx,
            )
            .await
        })
        .await?;

        self.analyze_remote(remote, &estimates, ctx, cleanup).await
    }

    async fn analyze_stored(
        &self,
        object_key: String,
        mime_type: String,
        ctx: &AnalysisContext,
        cleanup: &mut CleanupCoordinator,
    ) -> PipelineResult<AnalysisResult> {
        if self.store.bucket_name().is_none() {
            return Err(AnalysisError::Configuration(
                "S3_BUCKET_NAME is not set".to_string(),
            ));
        }
        let size = self
            .store
            .object_size(&object_key)
            .await?
            .ok_or_else(|| AnalysisError::NotFound(object_key.clone()))?;
        cleanup.track_storage_object(object_key.clone());
        ensure_video_mime(&mime_type)?;

        let strategy = self.settings.routing.stored_strategy();
        tracing::debug!(%strategy, size, "Analyzing stored object");

        if strategy == UploadStrategy::UriPassthrough {
            let uri = self.store.storage_uri(&object_key).ok_or_else(|| {
                AnalysisError::Configuration("S3_BUCKET_NAME is not set".to_string())
            })?;
            let estimates = StageEstimates::for_size(size).without_processing();
            let reference = FileReference { uri, mime_type };
            return self.invoke(&reference, &estimates, ctx).await;
        }

        let estimates = StageEstimates::for_size(size);
        let path = temp_file_path(&self.settings.scratch_dir, &mime_type);
        cleanup.track_temp_file(path.clone());

        let display_name = Path::new(&object_key)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_DISPLAY_NAME);

        let remote = with_progress(UPLOADING, &estimates, ctx, async {
            fetch_from_storage(self.store.as_ref(), &object_key, &path, ctx).await?;
            forward_to_vendor(self.api.as_ref(), &path, &mime_type, display_name, ctx).await
        })
        .await?;

        self.analyze_remote(remote, &estimates, ctx, cleanup).await
    }

    /// Waits for a vendor copy to become usable, then analyzes it
    async fn analyze_remote(
        &self,
        remote: RemoteFile,
        estimates: &StageEstimates,
        ctx: &AnalysisContext,
        cleanup: &mut CleanupCoordinator,
    ) -> PipelineResult<AnalysisResult> {
        cleanup.track_vendor_file(remote.name.clone());
        ensure_not_cancelled(ctx)?;

        let active = with_progress(
            PROCESSING,
            estimates,
            ctx,
            poller::wait_until_active(self.api.as_ref(), &remote.name, &self.settings.poll),
        )
        .await?;

        self.invoke(&active.reference(), estimates, ctx).await
    }

    async fn invoke(
        &self,
        reference: &FileReference,
        estimates: &StageEstimates,
        ctx: &AnalysisContext,
    ) -> PipelineResult<AnalysisResult> {
        ensure_not_cancelled(ctx)?;

        with_progress(
            ANALYZING,
            estimates,
            ctx,
            invoker::invoke(self.api.as_ref(), reference),
        )
        .await
    }
}

/// Polls and inference are never interrupted, so cancellation is honored between stages
fn ensure_not_cancelled(ctx: &AnalysisContext) -> PipelineResult<()> {
    if ctx.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }
    Ok(())
}

/// Runs one stage with a progress ticker over its window
async fn with_progress<T>(
    window: StageWindow,
    estimates: &StageEstimates,
    ctx: &AnalysisContext,
    stage: impl Future<Output = PipelineResult<T>>,
) -> PipelineResult<T> {
    let ticker = ProgressTicker::start(window, estimates, ctx.progress());
    let result = stage.await;

    if result.is_ok() {
        ticker.finish().await;
    } else {
        ticker.abort().await;
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::body::Bytes;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::analysis::progress::ProgressSink;
    use crate::analysis::{PollPolicy, RoutingPolicy};
    use crate::gemini_api::mock::MockGenerativeApi;
    use crate::gemini_api::{GenerateContentResponse, RemoteFileState};
    use crate::media_storage::mock::MockObjectStore;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ProgressState>>);

    impl ProgressSink for RecordingSink {
        fn publish(&self, state: ProgressState) {
            self.0.lock().unwrap().push(state);
        }
    }

    struct Harness {
        api: Arc<MockGenerativeApi>,
        store: Arc<MockObjectStore>,
        scratch: tempfile::TempDir,
        routing: RoutingPolicy,
    }

    impl Harness {
        fn new(api: MockGenerativeApi) -> Self {
            Self {
                api: Arc::new(api),
                store: Arc::new(MockObjectStore::new(Some("dise-uploads"))),
                scratch: tempfile::tempdir().unwrap(),
                routing: RoutingPolicy::default(),
            }
        }

        fn pipeline(&self) -> AnalysisPipeline {
            let settings = AnalysisSettings {
                poll: PollPolicy::new(5, Duration::from_millis(1), Duration::from_secs(5)).unwrap(),
                routing: self.routing,
                scratch_dir: self.scratch.path().to_path_buf(),
            };
            AnalysisPipeline::new(self.api.clone(), self.store.clone(), settings)
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
        }
    }

    fn video(size: usize) -> AnalysisSource {
        AnalysisSource::Inline(MediaPayload::new(
            Bytes::from(vec![0_u8; size]),
            "video/mp4",
            Some("exam.mp4".to_string()),
        ))
    }

    #[tokio::test]
    async fn test_inline_success_cleans_up() {
        let harness = Harness::new(MockGenerativeApi::new());
        let sink = Arc::new(RecordingSink::default());
        let ctx = AnalysisContext::new(CancellationToken::new(), sink.clone());

        let result = harness
            .pipeline()
            .analyze(video(2 * 1024 * 1024), &ctx)
            .await
            .unwrap();

        assert_eq!(result.velo_palato.obstrucao_percentual, 10);
        assert_eq!(result.orofaringe.obstrucao_percentual, 20);
        assert_eq!(result.epiglote_base_lingua.obstrucao_percentual, 15);
        assert_eq!(result.nivel_confianca, 90);
        assert_eq!(harness.api.uploaded_sizes(), vec![2 * 1024 * 1024]);
        assert_eq!(harness.api.deleted(), vec!["files/mock-0".to_string()]);
        assert!(harness.scratch_is_empty());

        let states = sink.0.lock().unwrap();
        let last = states.last().unwrap();
        assert_eq!(last.stage, ProgressStage::Complete);
        assert!((last.progress - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failed_processing_skips_inference() {
        let harness =
            Harness::new(MockGenerativeApi::new().with_states(vec![RemoteFileState::Failed]));

        let err = harness
            .pipeline()
            .analyze(video(1024), &AnalysisContext::detached())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Processing(_)));
        assert_eq!(harness.api.get_file_calls(), 1);
        assert_eq!(harness.api.generate_calls(), 0);
        assert_eq!(harness.api.deleted().len(), 1);
        assert!(harness.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_safety_block_is_rejected_and_cleaned() {
        let harness = Harness::new(
            MockGenerativeApi::new()
                .with_response(GenerateContentResponse::from_text("", "SAFETY")),
        );
        let sink = Arc::new(RecordingSink::default());
        let ctx = AnalysisContext::new(CancellationToken::new(), sink.clone());

        let err = harness.pipeline().analyze(video(1024), &ctx).await.unwrap_err();

        assert!(matches!(err, AnalysisError::ContentRejected(_)));
        assert!(!err.user_message().contains("SAFETY"));
        assert!(harness.scratch_is_empty());
        let states = sink.0.lock().unwrap();
        assert_eq!(states.last().unwrap().stage, ProgressStage::Error);
    }

    #[tokio::test]
    async fn test_unconfigured_vendor_fails_before_upload() {
        let harness = Harness::new(MockGenerativeApi::new().unconfigured());

        let err = harness
            .pipeline()
            .analyze(video(1024), &AnalysisContext::detached())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Configuration(_)));
        assert_eq!(harness.api.uploads(), 0);
        assert!(harness.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_removes_temp_file() {
        let harness = Harness::new(MockGenerativeApi::new().failing_upload());

        let err = harness
            .pipeline()
            .analyze(video(4096), &AnalysisContext::detached())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Upload(_)));
        assert!(harness.api.deleted().is_empty());
        assert!(harness.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_non_video_is_rejected_before_writing() {
        let harness = Harness::new(MockGenerativeApi::new());
        let source = AnalysisSource::Inline(MediaPayload::new(
            Bytes::from_static(b"png"),
            "image/png",
            None,
        ));

        let err = harness
            .pipeline()
            .analyze(source, &AnalysisContext::detached())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::UnsupportedMedia(_)));
        assert_eq!(harness.api.uploads(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_during_upload() {
        let harness = Harness::new(
            MockGenerativeApi::new().with_upload_delay(Duration::from_secs(30)),
        );
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        let ctx = AnalysisContext::new(token.clone(), sink.clone());

        let pipeline = harness.pipeline();
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        };
        let (outcome, ()) = tokio::join!(pipeline.analyze(video(1024), &ctx), canceller);

        assert!(matches!(outcome, Err(AnalysisError::Cancelled)));
        assert_eq!(harness.api.uploads(), 0);
        assert_eq!(harness.api.generate_calls(), 0);
        assert!(harness.scratch_is_empty());
        assert_eq!(
            sink.0.lock().unwrap().last().unwrap().stage,
            ProgressStage::Idle
        );
    }

    #[tokio::test]
    async fn test_stored_object_is_forwarded_and_deleted() {
        let harness = Harness::new(MockGenerativeApi::new());
        harness.store.put("uploads/abc-exam.mp4", vec![7_u8; 3000]);

        let source = AnalysisSource::Stored {
            object_key: "uploads/abc-exam.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
        };
        harness
            .pipeline()
            .analyze(source, &AnalysisContext::detached())
            .await
            .unwrap();

        assert_eq!(harness.api.uploaded_sizes(), vec![3000]);
        assert_eq!(harness.store.deleted(), vec!["uploads/abc-exam.mp4".to_string()]);
        assert_eq!(harness.api.deleted().len(), 1);
        assert!(harness.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_missing_stored_object_is_not_found() {
        let harness = Harness::new(MockGenerativeApi::new());
        let source = AnalysisSource::Stored {
            object_key: "uploads/missing.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
        };

        let err = harness
            .pipeline()
            .analyze(source, &AnalysisContext::detached())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::NotFound(_)));
        assert!(harness.store.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_inline_above_threshold_is_refused() {
        let mut harness = Harness::new(MockGenerativeApi::new());
        harness.routing = RoutingPolicy::new(1024, false).unwrap();

        let err = harness
            .pipeline()
            .analyze(video(4096), &AnalysisContext::detached())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::SizeLimit {
                size: 4096,
                limit: 1024
            }
        ));
        assert_eq!(harness.api.uploads(), 0);
        assert!(harness.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_stored_non_video_is_still_deleted() {
        let harness = Harness::new(MockGenerativeApi::new());
        harness.store.put("uploads/abc-photo.png", vec![1_u8; 64]);

        let source = AnalysisSource::Stored {
            object_key: "uploads/abc-photo.png".to_string(),
            mime_type: "image/png".to_string(),
        };
        let err = harness
            .pipeline()
            .analyze(source, &AnalysisContext::detached())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::UnsupportedMedia(_)));
        assert!(!harness.store.contains("uploads/abc-photo.png"));
        assert_eq!(
            harness.store.deleted(),
            vec!["uploads/abc-photo.png".to_string()]
        );
        assert_eq!(harness.api.uploads(), 0);
    }

    #[tokio::test]
    async fn test_passthrough_uses_storage_uri_without_vendor_copy() {
        let mut harness = Harness::new(MockGenerativeApi::new());
        harness.routing = RoutingPolicy::new(1024, true).unwrap();
        harness.store.put("uploads/abc-exam.mp4", vec![7_u8; 3000]);

        let source = AnalysisSource::Stored {
            object_key: "uploads/abc-exam.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
        };
        harness
            .pipeline()
            .analyze(source, &AnalysisContext::detached())
            .await
            .unwrap();

        assert_eq!(harness.api.uploads(), 0);
        assert_eq!(harness.api.get_file_calls(), 0);
        let request = harness.api.last_request().unwrap();
        assert_eq!(
            request.contents[0].parts[0].file_data.as_ref().unwrap().file_uri,
            "s3://dise-uploads/uploads/abc-exam.mp4"
        );
        assert_eq!(harness.store.deleted().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_within_each_stage() {
        let harness = Harness::new(MockGenerativeApi::new());
        let sink = Arc::new(RecordingSink::default());
        let ctx = AnalysisContext::new(CancellationToken::new(), sink.clone());

        harness
            .pipeline()
            .analyze(video(1024), &ctx)
            .await
            .unwrap();

        let states = sink.0.lock().unwrap();
        for pair in states.windows(2) {
            if pair[0].stage == pair[1].stage {
                assert!(pair[1].progress >= pair[0].progress);
            }
        }
        let stages: Vec<ProgressStage> = states.iter().map(|s| s.stage).collect();
        assert_eq!(stages.first(), Some(&ProgressStage::Uploading));
        assert!(stages.contains(&ProgressStage::Processing));
        assert!(stages.contains(&ProgressStage::Analyzing));
    }
}
