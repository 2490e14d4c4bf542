//! Repository for the `workflow_states` table.

use folio_core::types::DbId;
use sqlx::PgPool;

use crate::models::workflow_state::{UpsertWorkflowState, WorkflowState};

/// Column list for `workflow_states` queries.
const COLUMNS: &str = "id, project_id, user_id, step, created_at, updated_at";

/// Reads and writes the one workflow row each project owns.
pub struct WorkflowStateRepo;

impl WorkflowStateRepo {
    /// Find the workflow row for a project.
    pub async fn find_by_project(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Option<WorkflowState>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_states WHERE project_id = $1");
        sqlx::query_as::<_, WorkflowState>(&query)
            .bind(project_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or overwrite the step for a project.
    ///
    /// Last write wins; concurrent writers are not detected.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertWorkflowState,
    ) -> Result<WorkflowState, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_states (project_id, user_id, step) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (project_id) DO UPDATE \
             SET user_id = EXCLUDED.user_id, step = EXCLUDED.step \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowState>(&query)
            .bind(input.project_id)
            .bind(input.user_id)
            .bind(input.step)
            .fetch_one(pool)
            .await
    }

    /// The most recently edited in-workflow row for a user.
    ///
    /// Rows parked on the sentinel step (0) are skipped.
    pub async fn latest_active_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<WorkflowState>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_states \
             WHERE user_id = $1 AND step > 0 \
             ORDER BY updated_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, WorkflowState>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }
}
