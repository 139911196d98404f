use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;
use crate::config::CALLBACK_PATH;

pub mod assets;
pub mod callback;
pub mod error;
pub mod health;
pub mod jobs;
pub mod metrics;

/// Application routes, without the metrics endpoint or middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/v1/jobs", post(jobs::create_job))
        .route("/v1/jobs/{job_id}", get(jobs::get_job))
        .route("/v1/jobs/{job_id}/retry", post(jobs::retry_job))
        .route("/v1/jobs/{job_id}/output", get(jobs::download_output))
        .route("/v1/assets/{token}", get(assets::get_asset))
        .route(CALLBACK_PATH, post(callback::compute_callback))
        .with_state(state)
}
