//! Environment configuration for different deployment stages

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion};
use tracing::Level;

use crate::analysis::{
    AnalysisError, AnalysisSettings, PipelineResult, PollPolicy, RoutingPolicy,
    MAX_INLINE_UPLOAD_BYTES,
};

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";

/// Time a request may spend outside the polling loop: 100 MiB upload plus inference
const TRANSFER_AND_INFERENCE_ALLOWANCE: Duration = Duration::from_secs(300);

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack`)
    Development {
        /// Optional override for presigned URL expiry in seconds
        presign_expiry_override: Option<u64>,
    },
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => {
                // Check for presigned URL expiry override
                let presign_expiry_override = env::var("PRESIGNED_URL_EXPIRY_SECS")
                    .ok()
                    .and_then(|val| val.parse::<u64>().ok());

                Self::Development {
                    presign_expiry_override,
                }
            }
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// Returns the S3 bucket name for uploaded videos
    ///
    /// `None` in production and staging when `S3_BUCKET_NAME` is unset; the
    /// storage layer then rejects calls with a configuration error.
    #[must_use]
    pub fn s3_bucket(&self) -> Option<String> {
        match self {
            Self::Production | Self::Staging => env::var("S3_BUCKET_NAME").ok(),
            Self::Development { .. } => Some(
                env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "dise-uploads".to_string()),
            ),
        }
    }

    /// Gemini API key, checked by the vendor client at call time
    #[must_use]
    pub fn gemini_api_key(&self) -> Option<String> {
        env::var("GOOGLE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Base URL of the Gemini REST API
    #[must_use]
    pub fn gemini_base_url(&self) -> String {
        env::var("GEMINI_API_BASE_URL").unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string())
    }

    /// Model used for the analysis
    #[must_use]
    pub fn gemini_model(&self) -> String {
        env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string())
    }

    /// Whether to show API docs
    #[must_use]
    pub const fn show_api_docs(&self) -> bool {
        matches!(self, Self::Development { .. } | Self::Staging)
    }

    /// Returns the endpoint URL to use for AWS services
    #[must_use]
    pub const fn override_aws_endpoint_url(&self) -> Option<&str> {
        match self {
            // Regular AWS endpoints for production and staging
            Self::Production | Self::Staging => None,
            // LocalStack endpoint for development
            Self::Development { .. } => Some("http://localhost:4566"),
        }
    }

    /// AWS configuration with retry and timeout settings
    pub async fn aws_config(&self) -> aws_config::SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        // Storage downloads of large videos take longer than the default
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(120))
            .build();

        let mut config_builder = aws_config::load_defaults(BehaviorVersion::latest())
            .await
            .to_builder()
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = self.override_aws_endpoint_url() {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        config_builder.build()
    }

    /// AWS S3 service configuration
    pub async fn s3_client_config(&self) -> aws_sdk_s3::Config {
        let aws_config = self.aws_config().await;
        let s3_config: aws_sdk_s3::Config = (&aws_config).into();
        let mut builder = s3_config.to_builder();

        // Override "force path style" to true for compatibility with LocalStack
        // https://github.com/awslabs/aws-sdk-rust/discussions/874
        if matches!(self, Self::Development { .. }) {
            builder.set_force_path_style(Some(true));
        }

        builder.build()
    }

    /// Presigned URL expiry time in seconds
    #[must_use]
    pub fn presigned_url_expiry_secs(&self) -> u64 {
        match self {
            // Default: 15 minutes
            Self::Production | Self::Staging => 15 * 60,
            Self::Development {
                presign_expiry_override,
            } => presign_expiry_override.unwrap_or(15 * 60),
        }
    }

    /// Upper bound for one HTTP request, covering upload, polling and inference
    ///
    /// Defaults to the polling budget plus a fixed allowance for the transfer
    /// and the inference call, so the layer never cuts off a live analysis.
    #[must_use]
    pub fn request_timeout(&self, poll: &PollPolicy) -> Duration {
        env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|val| val.parse().ok())
            .map_or_else(
                || poll.total_timeout() + TRANSFER_AND_INFERENCE_ALLOWANCE,
                Duration::from_secs,
            )
    }

    /// Pipeline settings: polling, size routing and scratch directory
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::Configuration` when a variable is set but does
    /// not parse, or when the resulting policies are inconsistent
    pub fn analysis_settings(&self) -> PipelineResult<AnalysisSettings> {
        let poll = PollPolicy::new(
            parse_var("POLL_MAX_ATTEMPTS", 120)?,
            Duration::from_millis(parse_var("POLL_INTERVAL_MS", 2_000)?),
            Duration::from_secs(parse_var("POLL_TIMEOUT_SECS", 240)?),
        )?;

        let routing = RoutingPolicy::new(
            parse_var("INLINE_UPLOAD_THRESHOLD_BYTES", MAX_INLINE_UPLOAD_BYTES)?,
            parse_var("VENDOR_READS_STORAGE_URI", false)?,
        )?;

        let scratch_dir = env::var("SCRATCH_DIR").map_or_else(|_| env::temp_dir(), PathBuf::from);

        Ok(AnalysisSettings {
            poll,
            routing,
            scratch_dir,
        })
    }

    #[must_use]
    pub fn tracing_level(&self) -> Level {
        env::var("TRACING_LEVEL")
            .ok()
            .and_then(|val| val.parse::<Level>().ok())
            .unwrap_or(match self {
                Self::Production | Self::Staging => Level::INFO,
                Self::Development { .. } => Level::DEBUG,
            })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> PipelineResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AnalysisError::Configuration(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
