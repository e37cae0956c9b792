//! API routes.

use axum::extract::Request;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers::admin::{get_stats, run_cleanup};
use crate::handlers::health;
use crate::handlers::jobs::{acknowledge_delivery, cancel_job, get_job, get_user_usage, submit_job};
use crate::metrics::metrics_middleware;
use crate::middleware::{rate_limit, require_admin_token};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/:job_id", get(get_job).delete(cancel_job))
        .route("/jobs/:job_id/delivered", post(acknowledge_delivery))
        .route("/users/:user_id/usage", get(get_user_usage))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit,
        ));

    let admin_routes = Router::new()
        .route("/admin/stats", get(get_stats))
        .route("/admin/cleanup", post(run_cleanup))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    let health_routes = Router::new().route("/health", get(health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http",
                method = %request.method(),
                uri = %request.uri(),
                request_id
            )
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Outermost last: the id is set before tracing and copied onto the response.
    Router::new()
        .nest("/api", job_routes)
        .merge(admin_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(trace)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
