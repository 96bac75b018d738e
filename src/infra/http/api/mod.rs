pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::{dispatcher::JobDispatcher, registry::ExecutionRegistry};
use crate::infra::http::middleware::{log_responses, set_request_context};
use crate::infra::storage::ArtifactStore;

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<JobDispatcher>,
    pub registry: Arc<ExecutionRegistry>,
    pub artifacts: Arc<ArtifactStore>,
}

pub fn build_api_router(state: ApiState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/jobs", post(handlers::submit_job))
        .route("/api/jobs/status", get(handlers::job_status))
        .route("/healthz", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
