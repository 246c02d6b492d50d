use std::sync::Arc;

use aide::openapi::OpenApi;
use axum::{Extension, Router};
use datadog_tracing::axum::{shutdown_signal, OtelAxumLayer, OtelInResponseLayer};
use tokio::net::TcpListener;

use crate::routes;
use crate::{analysis::AnalysisPipeline, media_storage::ObjectStore, types::Environment};

/// Builds the application router with every dependency attached
pub fn router(
    environment: Environment,
    pipeline: Arc<AnalysisPipeline>,
    object_store: Arc<dyn ObjectStore>,
) -> Router {
    let mut openapi = OpenApi::default();
    let request_timeout = environment.request_timeout(&pipeline.settings().poll);

    routes::handler()
        .finish_api(&mut openapi)
        .layer(Extension(openapi))
        .layer(Extension(environment))
        .layer(Extension(pipeline))
        .layer(Extension(object_store))
        // Include trace context as header into the response
        .layer(OtelInResponseLayer)
        // Start OpenTelemetry trace on incoming request
        .layer(OtelAxumLayer::default())
        .layer(tower_http::timeout::TimeoutLayer::new(request_timeout))
}

/// Starts the server with the given environment and dependencies
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the port
pub async fn start(
    environment: Environment,
    pipeline: Arc<AnalysisPipeline>,
    object_store: Arc<dyn ObjectStore>,
) -> anyhow::Result<()> {
    let router = router(environment, pipeline, object_store);

    let addr = std::net::SocketAddr::from((
        [0, 0, 0, 0],
        std::env::var("PORT").map_or(Ok(8001), |p| p.parse())?,
    ));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🔄 DISE Analysis Backend started on http://{addr}");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(anyhow::Error::from)
}
