//! Workflow state entity model.

use folio_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `workflow_states` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowState {
    pub id: DbId,
    pub project_id: DbId,
    pub user_id: DbId,
    /// `0` when the user has left the workflow, otherwise `1..=6`.
    pub step: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for moving a project's workflow to a step.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertWorkflowState {
    pub project_id: DbId,
    pub user_id: DbId,
    pub step: i32,
}
