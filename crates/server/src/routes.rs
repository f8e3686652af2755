//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::trace::trace_id_middleware;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and small text fields on top of the file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_body_limit = usize::try_from(state.config.server.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        // Relay
        .route(
            "/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/upload-url", post(handlers::create_upload_url))
        // Reporter
        .route("/progress/{upload_id}", get(handlers::get_progress))
        .route("/health", get(handlers::health_check));

    // When enabled, restrict /metrics at the network level.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
