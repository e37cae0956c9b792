//! Health check handler.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use mcomp_worker::SchedulerLoad;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub ffmpeg_available: bool,
    pub transcoder: String,
    pub accepting_jobs: bool,
    pub load: SchedulerLoad,
}

/// Liveness probe with transcoder availability.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let scheduler = &state.scheduler;
    let accepting_jobs = scheduler.is_accepting();
    Json(HealthResponse {
        status: if accepting_jobs { "healthy" } else { "draining" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        ffmpeg_available: state.ffmpeg_available,
        transcoder: scheduler.transcoder_name().to_string(),
        accepting_jobs,
        load: scheduler.load(),
    })
}
