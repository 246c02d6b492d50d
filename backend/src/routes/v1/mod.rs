pub mod analyses;
pub mod config;
pub mod media;

use aide::axum::{
    routing::{get, post},
    ApiRouter,
};
use axum::extract::DefaultBodyLimit;

/// Creates the v1 API router with all v1 handler routes
pub fn handler() -> ApiRouter {
    let media_routes = ApiRouter::new()
        .api_route(
            "/media/presigned-urls",
            post(media::create_presigned_upload_url),
        )
        .api_route("/media/upload-plans", post(media::create_upload_plan))
        .api_route("/media/config", get(config::get_media_config));

    // Multipart and SSE handlers are not documented in the OpenAPI schema
    let analysis_routes = ApiRouter::new()
        .route(
            "/analyses",
            axum::routing::post(analyses::analyze_upload),
        )
        .route(
            "/analyses/stream",
            axum::routing::post(analyses::analyze_upload_stream),
        )
        .api_route("/analyses/storage", post(analyses::analyze_stored))
        .layer(DefaultBodyLimit::max(analyses::MULTIPART_BODY_LIMIT));

    media_routes.merge(analysis_routes)
}
