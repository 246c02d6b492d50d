use std::time::Duration;

use tokio::time::Instant;
use tracing::instrument;

use super::{AnalysisError, PipelineResult};
use crate::gemini_api::{GenerativeApi, RemoteFile, RemoteFileState};

/// Fixed-interval polling limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    max_attempts: u32,
    poll_interval: Duration,
    total_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            poll_interval: Duration::from_secs(2),
            total_timeout: Duration::from_secs(240),
        }
    }
}

impl PollPolicy {
    /// # Errors
    ///
    /// Returns `AnalysisError::Configuration` unless `max_attempts >= 1`,
    /// `poll_interval > 0` and `total_timeout >= poll_interval`
    pub fn new(
        max_attempts: u32,
        poll_interval: Duration,
        total_timeout: Duration,
    ) -> PipelineResult<Self> {
        if max_attempts == 0 {
            return Err(AnalysisError::Configuration(
                "poll max attempts must be at least 1".to_string(),
            ));
        }
        if poll_interval.is_zero() {
            return Err(AnalysisError::Configuration(
                "poll interval must be positive".to_string(),
            ));
        }
        if total_timeout < poll_interval {
            return Err(AnalysisError::Configuration(format!(
                "poll timeout {total_timeout:?} is shorter than the interval {poll_interval:?}"
            )));
        }

        Ok(Self {
            max_attempts,
            poll_interval,
            total_timeout,
        })
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub const fn total_timeout(&self) -> Duration {
        self.total_timeout
    }
}

/// Polls the vendor until the file is usable
///
/// One query per attempt, one at a time, with a fixed sleep in between and
/// none after the final attempt. Stops early once the next sleep would run
/// past the total budget.
///
/// # Errors
///
/// - `AnalysisError::Processing` as soon as the vendor reports FAILED
/// - `AnalysisError::Timeout` when attempts or budget run out
/// - `AnalysisError::Upstream` if a state query fails
#[instrument(skip(api, policy), fields(max_attempts = policy.max_attempts()))]
pub async fn wait_until_active(
    api: &dyn GenerativeApi,
    name: &str,
    policy: &PollPolicy,
) -> PipelineResult<RemoteFile> {
    let deadline = Instant::now() + policy.total_timeout;

    for attempt in 1..=policy.max_attempts {
        let file = api.get_file(name).await.map_err(AnalysisError::upstream)?;

        match file.state {
            RemoteFileState::Active => {
                tracing::debug!(attempt, "Remote file is active");
                return Ok(file);
            }
            RemoteFileState::Failed => {
                tracing::warn!(attempt, "Remote file processing failed");
                return Err(AnalysisError::Processing(name.to_string()));
            }
            RemoteFileState::Pending => {}
        }

        if attempt == policy.max_attempts {
            break;
        }
        if Instant::now() + policy.poll_interval > deadline {
            tracing::warn!(attempt, "Polling budget exhausted");
            return Err(AnalysisError::Timeout { attempts: attempt });
        }

        tokio::time::sleep(policy.poll_interval).await;
    }

    tracing::warn!("Remote file still pending after all attempts");
    Err(AnalysisError::Timeout {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::gemini_api::mock::MockGenerativeApi;

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_pending_then_active_takes_k_plus_one_queries() {
        let k = 3;
        let mut states = vec![RemoteFileState::Pending; k];
        states.push(RemoteFileState::Active);
        let api = MockGenerativeApi::new().with_states(states);

        let file = assert_ok!(wait_until_active(&api, "files/abc", &fast_policy(10)).await);

        assert_eq!(file.state, RemoteFileState::Active);
        assert_eq!(api.get_file_calls(), k + 1);
    }

    #[tokio::test]
    async fn test_pending_forever_times_out_after_max_attempts() {
        let api = MockGenerativeApi::new().with_states(vec![]);

        let err = assert_err!(wait_until_active(&api, "files/abc", &fast_policy(5)).await);

        assert!(matches!(err, AnalysisError::Timeout { attempts: 5 }));
        assert_eq!(api.get_file_calls(), 5);
    }

    #[tokio::test]
    async fn test_failed_stops_after_one_query() {
        let api = MockGenerativeApi::new().with_states(vec![RemoteFileState::Failed]);

        let err = assert_err!(wait_until_active(&api, "files/abc", &fast_policy(10)).await);

        assert!(matches!(err, AnalysisError::Processing(name) if name == "files/abc"));
        assert_eq!(api.get_file_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_budget_caps_attempts() {
        let api = MockGenerativeApi::new().with_states(vec![]);
        let policy = PollPolicy::new(
            100,
            Duration::from_millis(10),
            Duration::from_millis(35),
        )
        .unwrap();

        let err = assert_err!(wait_until_active(&api, "files/abc", &policy).await);

        assert!(matches!(err, AnalysisError::Timeout { attempts: 4 }));
        assert_eq!(api.get_file_calls(), 4);
    }

    #[test]
    fn test_policy_validation() {
        let second = Duration::from_secs(1);

        assert!(PollPolicy::new(0, second, second).is_err());
        assert!(PollPolicy::new(1, Duration::ZERO, second).is_err());
        assert!(PollPolicy::new(1, second * 2, second).is_err());
        assert!(PollPolicy::new(1, second, second).is_ok());

        let defaults = PollPolicy::default();
        assert_eq!(defaults.max_attempts(), 120);
        assert_eq!(defaults.poll_interval(), Duration::from_secs(2));
        assert_eq!(defaults.total_timeout(), Duration::from_secs(240));
    }
}
