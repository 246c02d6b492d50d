//! Synthetic progress for the UI
//!
//! The estimator has no visibility into bytes transferred or vendor-side
//! state. It advances on a timer toward 95% of the current stage window and
//! only reaches the window end when the real operation reports completion.

use std::sync::Arc;
use std::time::Duration;

use common_types::{ProgressStage, ProgressState};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Interval between synthetic updates
pub const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Fraction of a stage window the estimate may cover before real completion
pub const CEILING_FRACTION: f64 = 0.95;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

// Calibrated seconds per MiB and fixed floor, per stage
const UPLOAD_SECS_PER_MIB: f64 = 0.5;
const UPLOAD_FLOOR_SECS: f64 = 2.0;
const PROCESSING_SECS_PER_MIB: f64 = 0.3;
const PROCESSING_FLOOR_SECS: f64 = 4.0;
const ANALYSIS_SECS_PER_MIB: f64 = 0.2;
const ANALYSIS_FLOOR_SECS: f64 = 10.0;

/// Receives progress updates for one request
pub trait ProgressSink: Send + Sync {
    fn publish(&self, state: ProgressState);
}

/// Sink that only logs, used when nobody is watching
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn publish(&self, state: ProgressState) {
        tracing::trace!(
            stage = %state.stage,
            progress = state.progress,
            remaining = ?state.estimated_time_remaining,
            "Progress"
        );
    }
}

impl ProgressSink for UnboundedSender<ProgressState> {
    fn publish(&self, state: ProgressState) {
        // Receiver gone means the client stopped listening
        let _ = self.send(state);
    }
}

/// Progress range covered by a stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageWindow {
    pub stage: ProgressStage,
    pub start: f64,
    pub end: f64,
    pub message: &'static str,
}

pub const UPLOADING: StageWindow = StageWindow {
    stage: ProgressStage::Uploading,
    start: 0.0,
    end: 40.0,
    message: "Uploading video",
};

pub const PROCESSING: StageWindow = StageWindow {
    stage: ProgressStage::Processing,
    start: 40.0,
    end: 70.0,
    message: "Processing video",
};

pub const ANALYZING: StageWindow = StageWindow {
    stage: ProgressStage::Analyzing,
    start: 70.0,
    end: 100.0,
    message: "Analyzing obstruction",
};

/// Synthetic progress at `elapsed` into a stage expected to last `duration`
///
/// Never exceeds `start + 0.95 * (end - start)`.
#[must_use]
pub fn estimate(start: f64, end: f64, elapsed: Duration, duration: Duration) -> f64 {
    let fraction = if duration.is_zero() {
        CEILING_FRACTION
    } else {
        (elapsed.as_secs_f64() / duration.as_secs_f64()).min(CEILING_FRACTION)
    };
    fraction.mul_add(end - start, start)
}

/// Expected duration of each stage for a given file size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEstimates {
    upload: Duration,
    processing: Duration,
    analysis: Duration,
}

impl StageEstimates {
    #[must_use]
    pub fn for_size(bytes: u64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let mib = bytes as f64 / BYTES_PER_MIB;
        let stage = |rate: f64, floor: f64| Duration::from_secs_f64(rate.mul_add(mib, floor));

        Self {
            upload: stage(UPLOAD_SECS_PER_MIB, UPLOAD_FLOOR_SECS),
            processing: stage(PROCESSING_SECS_PER_MIB, PROCESSING_FLOOR_SECS),
            analysis: stage(ANALYSIS_SECS_PER_MIB, ANALYSIS_FLOOR_SECS),
        }
    }

    /// Drops the vendor processing stage, for storage URI passthrough
    #[must_use]
    pub const fn without_processing(mut self) -> Self {
        self.processing = Duration::ZERO;
        self
    }

    #[must_use]
    pub const fn duration(&self, stage: ProgressStage) -> Duration {
        match stage {
            ProgressStage::Uploading => self.upload,
            ProgressStage::Processing => self.processing,
            ProgressStage::Analyzing => self.analysis,
            _ => Duration::ZERO,
        }
    }

    /// Expected time of every stage after `stage`
    #[must_use]
    pub fn after(&self, stage: ProgressStage) -> Duration {
        match stage {
            ProgressStage::Uploading => self.processing + self.analysis,
            ProgressStage::Processing => self.analysis,
            _ => Duration::ZERO,
        }
    }
}

/// Publishes synthetic progress for one stage until told the stage is over
pub struct ProgressTicker {
    window: StageWindow,
    remaining_after: Duration,
    sink: Arc<dyn ProgressSink>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    /// Publishes the window start and begins ticking
    #[must_use]
    pub fn start(
        window: StageWindow,
        estimates: &StageEstimates,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let duration = estimates.duration(window.stage);
        let remaining_after = estimates.after(window.stage);
        let token = CancellationToken::new();

        sink.publish(
            ProgressState::new(window.stage, window.start, window.message)
                .with_remaining((duration + remaining_after).as_secs()),
        );

        let handle = tokio::spawn({
            let sink = sink.clone();
            let token = token.clone();
            async move {
                let started = Instant::now();
                let mut interval = tokio::time::interval(TICK_INTERVAL);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // First tick completes immediately
                interval.tick().await;

                loop {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        _ = interval.tick() => {
                            let elapsed = started.elapsed();
                            let progress = estimate(window.start, window.end, elapsed, duration);
                            let remaining = duration.saturating_sub(elapsed) + remaining_after;
                            sink.publish(
                                ProgressState::new(window.stage, progress, window.message)
                                    .with_remaining(remaining.as_secs()),
                            );
                        }
                    }
                }
            }
        });

        Self {
            window,
            remaining_after,
            sink,
            token,
            handle: Some(handle),
        }
    }

    /// Stops ticking and publishes the window end
    pub async fn finish(mut self) {
        self.stop().await;
        self.sink.publish(
            ProgressState::new(self.window.stage, self.window.end, self.window.message)
                .with_remaining(self.remaining_after.as_secs()),
        );
    }

    /// Stops ticking without publishing anything further
    pub async fn abort(mut self) {
        self.stop().await;
    }

    async fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            // The task only ends by cancellation; a join error means it panicked
            if let Err(e) = handle.await {
                tracing::warn!("Progress ticker ended abnormally: {e}");
            }
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
