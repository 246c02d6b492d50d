use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;

use dise_backend::{
    analysis::AnalysisPipeline,
    gemini_api::{GeminiClient, GenerativeApi},
    media_storage::{MediaStorage, ObjectStore},
    server,
    types::Environment,
};
use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let environment = Environment::from_env();

    // Configure logging format based on environment
    // Use JSON format for staging/production (Datadog), regular format for development
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(environment.tracing_level()).into())
        .from_env_lossy();
    match environment {
        Environment::Production | Environment::Staging => {
            fmt().json().with_env_filter(env_filter).init();
        }
        Environment::Development { .. } => {
            fmt().with_env_filter(env_filter).init();
        }
    }

    let settings = environment.analysis_settings()?;

    let s3_client = Arc::new(S3Client::from_conf(environment.s3_client_config().await));
    let object_store: Arc<dyn ObjectStore> = Arc::new(MediaStorage::new(
        s3_client,
        environment.s3_bucket(),
        environment.presigned_url_expiry_secs(),
    ));

    let gemini: Arc<dyn GenerativeApi> = Arc::new(GeminiClient::new(
        environment.gemini_base_url(),
        environment.gemini_api_key(),
        environment.gemini_model(),
    ));
    if !gemini.is_configured() {
        tracing::warn!("GOOGLE_API_KEY is not set, analysis requests will fail");
    }

    let pipeline = Arc::new(AnalysisPipeline::new(
        gemini,
        object_store.clone(),
        settings,
    ));

    server::start(environment, pipeline, object_store).await
}
