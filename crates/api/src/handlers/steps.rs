//! Handlers for the step coordinators of steps 2 to 6.
//!
//! The step path segment is the 1-based step number.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use folio_core::types::DbId;
use folio_core::workflow::WorkflowStep;
use folio_pipeline::coordinator::{
    CoordinatorView, MountOutcome, NextOutcome, StartOutcome, StepCoordinator,
};
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::ActingUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Result of a step action together with the coordinator's view after it.
#[derive(Debug, Serialize)]
pub struct StepActionResponse<T: Serialize> {
    pub outcome: T,
    pub view: CoordinatorView,
}

async fn coordinator(
    state: &AppState,
    user: ActingUser,
    project_id: DbId,
    step: u8,
) -> AppResult<Arc<StepCoordinator>> {
    let step = WorkflowStep::from_number(step)?;
    Ok(state
        .orchestrator
        .coordinator(user.user_id, project_id, step)
        .await?)
}

fn respond<T: Serialize>(
    outcome: T,
    coordinator: &StepCoordinator,
) -> Json<DataResponse<StepActionResponse<T>>> {
    Json(DataResponse {
        data: StepActionResponse {
            outcome,
            view: coordinator.view(),
        },
    })
}

/// GET /api/v1/projects/{id}/steps/{step}
pub async fn get_step(
    user: ActingUser,
    State(state): State<AppState>,
    Path((project_id, step)): Path<(DbId, u8)>,
) -> AppResult<Json<DataResponse<CoordinatorView>>> {
    let coordinator = coordinator(&state, user, project_id, step).await?;
    Ok(Json(DataResponse {
        data: coordinator.view(),
    }))
}

/// POST /api/v1/projects/{id}/steps/{step}/start
///
/// Mounts the coordinator and, on job steps, starts or re-attaches the
/// job. Repeated calls while a job runs are no-ops.
pub async fn start_step(
    user: ActingUser,
    State(state): State<AppState>,
    Path((project_id, step)): Path<(DbId, u8)>,
) -> AppResult<Json<DataResponse<StepActionResponse<MountOutcome>>>> {
    let coordinator = coordinator(&state, user, project_id, step).await?;
    let outcome = coordinator.mount().await?;
    Ok(respond(outcome, &coordinator))
}

/// POST /api/v1/projects/{id}/steps/{step}/retry
pub async fn retry_step(
    user: ActingUser,
    State(state): State<AppState>,
    Path((project_id, step)): Path<(DbId, u8)>,
) -> AppResult<Json<DataResponse<StepActionResponse<StartOutcome>>>> {
    let coordinator = coordinator(&state, user, project_id, step).await?;
    let outcome = coordinator.retry().await?;
    Ok(respond(outcome, &coordinator))
}

/// POST /api/v1/projects/{id}/steps/{step}/next
pub async fn next_step(
    user: ActingUser,
    State(state): State<AppState>,
    Path((project_id, step)): Path<(DbId, u8)>,
) -> AppResult<Json<DataResponse<StepActionResponse<NextOutcome>>>> {
    let coordinator = coordinator(&state, user, project_id, step).await?;
    let outcome = coordinator.next().await?;
    if outcome == NextOutcome::Exited {
        state
            .orchestrator
            .release_project(user.user_id, project_id)
            .await;
    }
    Ok(respond(outcome, &coordinator))
}

/// POST /api/v1/projects/{id}/steps/{step}/back
pub async fn back_step(
    user: ActingUser,
    State(state): State<AppState>,
    Path((project_id, step)): Path<(DbId, u8)>,
) -> AppResult<Json<DataResponse<StepActionResponse<WorkflowStep>>>> {
    let coordinator = coordinator(&state, user, project_id, step).await?;
    let previous = coordinator.back().await?;
    Ok(respond(previous, &coordinator))
}
