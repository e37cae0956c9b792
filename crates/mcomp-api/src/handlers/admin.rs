//! Operator endpoints: aggregate statistics and on-demand cleanup.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use mcomp_models::format_file_size;
use mcomp_worker::{SchedulerLoad, StatsSnapshot};

use crate::state::AppState;

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    /// Human-readable `bytes_saved`
    pub space_saved: String,
    pub load: SchedulerLoad,
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.scheduler.stats();
    Json(StatsResponse {
        space_saved: format_file_size(stats.bytes_saved),
        stats,
        load: state.scheduler.load(),
    })
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
}

/// Run the artifact sweep now instead of waiting for the next interval.
pub async fn run_cleanup(State(state): State<AppState>) -> Json<CleanupResponse> {
    let removed = state.scheduler.trigger_cleanup();
    info!(removed, "Manual cleanup finished");
    Json(CleanupResponse { removed })
}
