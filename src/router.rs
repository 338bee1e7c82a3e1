use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState, validation::upload::MAX_IMAGE_BYTES};

/// Multipart overhead allowed on top of the largest image.
const MULTIPART_OVERHEAD: usize = 2 * 1024 * 1024;

/// Builds the application router.
///
/// CORS and the global governor are applied by the binary, since they need
/// configuration and peer addresses that in-process callers lack.
pub fn build(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/plans", get(handlers::plans::list_plans))
        .route("/api/plans/{name}", get(handlers::plans::get_plan))
        .route("/api/captions", post(handlers::captions::generate_caption))
        .with_state(state.clone());

    let upload_routes = Router::new()
        .route("/api/upload", post(handlers::uploads::upload_image))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_upload,
        ))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + MULTIPART_OVERHEAD))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/api/plans/invalidate",
            post(handlers::plans::invalidate_plans),
        )
        .route(
            "/api/functions/{name}",
            post(handlers::functions::invoke_function),
        )
        .route_layer(from_fn(middleware_layer::auth::require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(upload_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
}
