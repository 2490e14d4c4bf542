//! Handlers for the navigation guard of a project.

use axum::extract::{Path, State};
use axum::Json;
use folio_core::types::DbId;
use folio_pipeline::guard::Interception;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::ActingUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NavigationAttempt {
    /// Route the user is trying to open.
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct PromptAnswer {
    pub ticket: u64,
}

#[derive(Debug, Serialize)]
pub struct Confirmed {
    /// Route to open now, or `None` if the ticket was not outstanding.
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Cancelled {
    pub cancelled: bool,
}

/// POST /api/v1/projects/{id}/navigation
pub async fn intercept(
    user: ActingUser,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Json(input): Json<NavigationAttempt>,
) -> AppResult<Json<DataResponse<Interception>>> {
    if input.target.trim().is_empty() {
        return Err(AppError::BadRequest("Navigation target must not be empty".into()));
    }
    let guard = state.orchestrator.guard(user.user_id, project_id).await;
    let decision = guard.intercept(input.target.trim()).await?;
    Ok(Json(DataResponse { data: decision }))
}

/// POST /api/v1/projects/{id}/navigation/confirm
pub async fn confirm(
    user: ActingUser,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Json(input): Json<PromptAnswer>,
) -> AppResult<Json<DataResponse<Confirmed>>> {
    let guard = state.orchestrator.guard(user.user_id, project_id).await;
    let target = guard.confirm(input.ticket).await?;
    if target.is_some() {
        state
            .orchestrator
            .release_project(user.user_id, project_id)
            .await;
    }
    Ok(Json(DataResponse {
        data: Confirmed { target },
    }))
}

/// POST /api/v1/projects/{id}/navigation/cancel
pub async fn cancel(
    user: ActingUser,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Json(input): Json<PromptAnswer>,
) -> AppResult<Json<DataResponse<Cancelled>>> {
    let guard = state.orchestrator.guard(user.user_id, project_id).await;
    let cancelled = guard.cancel(input.ticket).await;
    Ok(Json(DataResponse {
        data: Cancelled { cancelled },
    }))
}
