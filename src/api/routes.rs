//! HTTP API route definitions.

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{echo, random_result, AppState};
use super::middleware::{log_response, request_span, trace_requests};
use crate::health;

/// Create the API router.
///
/// Order matters: health first, feature routes next, the catch-all echo
/// last so it never shadows a more specific path.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new().route("/health", get(health::health));

    if state.random_result_enabled {
        router = router.route("/randomResult", get(random_result));
    }

    router
        .route("/", get(echo))
        .route("/*path", get(echo))
        .layer(from_fn_with_state(state.tracer.clone(), trace_requests))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(log_response)
                .on_failure(()),
        )
        .with_state(state)
}
