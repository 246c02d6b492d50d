use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, response::Response, Router};
use dise_backend::{
    analysis::{AnalysisPipeline, AnalysisSettings, PollPolicy, RoutingPolicy},
    gemini_api::mock::MockGenerativeApi,
    media_storage::mock::MockObjectStore,
    server,
    types::Environment,
};
use tempfile::TempDir;
use tower::ServiceExt;

use super::utils::multipart_body;

pub const TEST_BUCKET: &str = "dise-test-uploads";

/// Setup test environment variables with all the required configuration
pub fn setup_test_env() {
    // Load test environment variables
    dotenvy::from_path(".env.example").ok();

    // Initialize tracing for tests
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .ok();
}

/// Router wired to a scripted vendor and an in-memory store
pub struct TestContext {
    pub router: Router,
    pub environment: Environment,
    pub api: Arc<MockGenerativeApi>,
    pub store: Arc<MockObjectStore>,
    /// Scratch directory for temp files; must be empty after every request
    pub scratch: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self::build(
            MockGenerativeApi::new(),
            MockObjectStore::new(Some(TEST_BUCKET)),
            RoutingPolicy::default(),
        )
    }

    pub fn with_api(api: MockGenerativeApi) -> Self {
        Self::build(
            api,
            MockObjectStore::new(Some(TEST_BUCKET)),
            RoutingPolicy::default(),
        )
    }

    pub fn with_store(store: MockObjectStore) -> Self {
        Self::build(MockGenerativeApi::new(), store, RoutingPolicy::default())
    }

    pub fn build(api: MockGenerativeApi, store: MockObjectStore, routing: RoutingPolicy) -> Self {
        setup_test_env();

        let scratch = tempfile::tempdir().expect("Failed to create scratch dir");
        let settings = AnalysisSettings {
            poll: PollPolicy::new(5, Duration::from_millis(1), Duration::from_secs(5))
                .expect("Valid poll policy"),
            routing,
            scratch_dir: scratch.path().to_path_buf(),
        };

        let environment = Environment::Development {
            presign_expiry_override: None,
        };
        let api = Arc::new(api);
        let store = Arc::new(store);
        let pipeline = Arc::new(AnalysisPipeline::new(
            api.clone(),
            store.clone(),
            settings,
        ));

        let router = server::router(environment.clone(), pipeline, store.clone());

        Self {
            router,
            environment,
            api,
            store,
            scratch,
        }
    }

    pub fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path())
            .expect("Scratch dir exists")
            .next()
            .is_none()
    }

    pub async fn send_post_request(
        &self,
        route: &str,
        payload: serde_json::Value,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let request = Request::builder()
            .uri(route)
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(payload.to_string()))?;

        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    pub async fn send_get_request(
        &self,
        route: &str,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let request = Request::builder()
            .uri(route)
            .method("GET")
            .body(Body::empty())?;
        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    /// Posts `data` as a multipart form with a single file field
    pub async fn send_video(
        &self,
        route: &str,
        field: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let (boundary, body) = multipart_body(field, "exam.mp4", content_type, data);
        let request = Request::builder()
            .uri(route)
            .method("POST")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?;

        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }
}
