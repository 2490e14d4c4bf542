//! Handlers for job progress.
//!
//! `POST /jobs/{job}/progress` is the callback the worker is handed at
//! dispatch time; it carries no user identity.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use folio_core::progress::{
    clamp_progress, NewProgressRecord, ProgressRecord, ProgressState, ProgressStatus,
};
use folio_core::types::JobId;
use folio_pipeline::store::ProgressStore;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::ActingUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub latest: Option<ProgressRecord>,
    pub state: ProgressState,
}

/// Progress update posted by the worker.
#[derive(Debug, Deserialize)]
pub struct ProgressCallback {
    pub status: ProgressStatus,
    #[serde(default)]
    pub message: String,
    /// Out-of-range values are clamped to 0..=100.
    pub progress: i32,
}

/// GET /api/v1/jobs/{job}/progress
pub async fn get_progress(
    _user: ActingUser,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<JobProgress>>> {
    let job_id = JobId::from(job_id);
    let latest = state
        .orchestrator
        .stores()
        .progress
        .latest(&job_id)
        .await?;

    let mut display = ProgressState::default();
    if let Some(record) = &latest {
        display.apply(record);
    }

    Ok(Json(DataResponse {
        data: JobProgress {
            job_id,
            latest,
            state: display,
        },
    }))
}

/// POST /api/v1/jobs/{job}/progress
///
/// Appends the record; monitors following the job pick it up through
/// their feed or their next poll.
pub async fn post_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(input): Json<ProgressCallback>,
) -> AppResult<impl IntoResponse> {
    if job_id.trim().is_empty() {
        return Err(AppError::BadRequest("Job id must not be empty".into()));
    }
    let stored = state
        .orchestrator
        .ingest_progress(NewProgressRecord {
            job_id: JobId::from(job_id),
            status: input.status,
            message: input.message,
            progress: clamp_progress(input.progress),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: stored })))
}
