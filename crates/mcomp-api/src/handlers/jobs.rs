//! Job submission, status, cancellation and delivery hand-off.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use mcomp_models::{InputDescriptor, JobId, JobStatus, MediaKind, QualityPreset, UserId};
use mcomp_worker::{JobInfo, QuotaUsage, UserStats};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Submission from the transport: an upload already stored on local disk.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub user_id: String,
    pub path: PathBuf,
    pub kind: MediaKind,
    /// Size the transport reported for the upload
    pub size: u64,
    #[serde(default)]
    pub preset: QualityPreset,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }

    let input = InputDescriptor::new(request.path, request.kind, request.size);
    let handle = state
        .scheduler
        .submit(request.user_id, input, request.preset)?;

    let job_id = handle.id().clone();
    let queue_position = state
        .scheduler
        .job(&job_id)
        .and_then(|info| info.queue_position);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id,
            status: handle.status(),
            queue_position,
        }),
    ))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobInfo>> {
    let job_id = JobId::from_string(job_id);
    state
        .scheduler
        .job(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("job {}", job_id)))
}

/// Cancel a queued job. Running and finished jobs answer 409.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobInfo>> {
    let job_id = JobId::from_string(job_id);
    state.scheduler.cancel(&job_id)?;
    info!(job_id = %job_id, "Job cancelled via API");

    state
        .scheduler
        .job(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::internal(format!("job {} vanished after cancel", job_id)))
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub removed: usize,
}

/// The transport has sent the output to the user.
pub async fn acknowledge_delivery(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DeliveryResponse>> {
    let job_id = JobId::from_string(job_id);
    let removed = state.scheduler.acknowledge_delivery(&job_id)?;
    Ok(Json(DeliveryResponse { removed }))
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub user_id: UserId,
    pub usage: QuotaUsage,
    pub limit_per_hour: usize,
    pub limit_per_day: usize,
    pub stats: UserStats,
}

/// Quota consumption and lifetime totals for one user.
pub async fn get_user_usage(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<UsageResponse> {
    let user_id = UserId::from(user_id);
    let config = state.scheduler.config();
    Json(UsageResponse {
        usage: state.scheduler.quota_usage(&user_id),
        limit_per_hour: config.max_files_per_hour,
        limit_per_day: config.max_files_per_day,
        stats: state.scheduler.user_stats(&user_id),
        user_id,
    })
}
