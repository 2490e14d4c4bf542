//! Handlers for a project's workflow position.
//!
//! All endpoints act for the user named by [`ActingUser`].

use axum::extract::{Path, State};
use axum::Json;
use folio_core::types::DbId;
use folio_core::workflow::{WorkflowPosition, WorkflowStep};
use folio_db::models::workflow_state::WorkflowState;
use folio_pipeline::controller::ResumePoint;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::ActingUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Step a project's workflow screen should render.
#[derive(Debug, Serialize)]
pub struct WorkflowView {
    pub project_id: DbId,
    pub position: WorkflowPosition,
    pub step: WorkflowStep,
    pub step_number: u8,
    pub label: &'static str,
    pub route: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceWorkflow {
    /// 1-based step number.
    pub step: u8,
}

/// GET /api/v1/workflow/resume
pub async fn resume(
    user: ActingUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Option<ResumePoint>>>> {
    let resume = state.orchestrator.controller(user.user_id).resume().await?;
    Ok(Json(DataResponse { data: resume }))
}

/// GET /api/v1/projects/{id}/workflow
///
/// A project without a workflow row, or one that left the workflow,
/// renders step 1.
pub async fn get_workflow(
    user: ActingUser,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
) -> AppResult<Json<DataResponse<WorkflowView>>> {
    let position = state
        .orchestrator
        .controller(user.user_id)
        .position(project_id)
        .await?;
    let step = position.effective_step();

    Ok(Json(DataResponse {
        data: WorkflowView {
            project_id,
            position,
            step,
            step_number: step.to_number(),
            label: step.label(),
            route: step.route(),
        },
    }))
}

/// PUT /api/v1/projects/{id}/workflow
pub async fn advance_workflow(
    user: ActingUser,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Json(input): Json<AdvanceWorkflow>,
) -> AppResult<Json<DataResponse<WorkflowState>>> {
    let step = WorkflowStep::from_number(input.step)?;
    let row = state
        .orchestrator
        .controller(user.user_id)
        .advance(project_id, step)
        .await?;
    Ok(Json(DataResponse { data: row }))
}

/// POST /api/v1/projects/{id}/workflow/exit
pub async fn exit_workflow(
    user: ActingUser,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
) -> AppResult<Json<DataResponse<WorkflowState>>> {
    let row = state
        .orchestrator
        .controller(user.user_id)
        .exit(project_id)
        .await?;
    state
        .orchestrator
        .release_project(user.user_id, project_id)
        .await;

    tracing::info!(project_id, user_id = user.user_id, "Workflow exited");
    Ok(Json(DataResponse { data: row }))
}
