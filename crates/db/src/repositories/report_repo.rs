//! Repository for the `reports` table.

use folio_core::types::DbId;
use sqlx::PgPool;

use crate::models::report::Report;

/// Column list for `reports` queries.
const COLUMNS: &str =
    "id, project_id, title, status, active_job, generated_at, created_at, updated_at";

pub struct ReportRepo;

impl ReportRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Report>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM reports WHERE id = $1");
        sqlx::query_as::<_, Report>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The newest report of a project.
    pub async fn find_latest_for_project(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Option<Report>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM reports \
             WHERE project_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Report>(&query)
            .bind(project_id)
            .fetch_optional(pool)
            .await
    }

    /// Set the status and the in-flight job of a report.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: &str,
        active_job: Option<&str>,
    ) -> Result<Option<Report>, sqlx::Error> {
        let query = format!(
            "UPDATE reports SET status = $2, active_job = $3 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Report>(&query)
            .bind(id)
            .bind(status)
            .bind(active_job)
            .fetch_optional(pool)
            .await
    }
}
