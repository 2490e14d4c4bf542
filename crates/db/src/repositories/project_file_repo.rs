//! Repository for the `project_files` table.

use folio_core::types::DbId;
use sqlx::PgPool;

use crate::models::project_file::{FileCounts, ProjectFile};

/// Column list for `project_files` queries.
const COLUMNS: &str =
    "id, project_id, file_name, mime_type, processed_at, created_at, updated_at";

pub struct ProjectFileRepo;

impl ProjectFileRepo {
    /// Files of a project the analysis worker has not processed yet.
    pub async fn list_unprocessed(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Vec<ProjectFile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM project_files \
             WHERE project_id = $1 AND processed_at IS NULL \
             ORDER BY id"
        );
        sqlx::query_as::<_, ProjectFile>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Total, processed and image counters for a project.
    pub async fn counts(pool: &PgPool, project_id: DbId) -> Result<FileCounts, sqlx::Error> {
        sqlx::query_as::<_, FileCounts>(
            "SELECT COUNT(*) AS total, \
                    COUNT(processed_at) AS processed, \
                    COUNT(*) FILTER (WHERE mime_type LIKE 'image/%') AS images \
             FROM project_files WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_one(pool)
        .await
    }

    /// Rename a file of a project. `None` if the project has no such file.
    pub async fn rename(
        pool: &PgPool,
        project_id: DbId,
        id: DbId,
        file_name: &str,
    ) -> Result<Option<ProjectFile>, sqlx::Error> {
        let query = format!(
            "UPDATE project_files SET file_name = $3 \
             WHERE id = $1 AND project_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProjectFile>(&query)
            .bind(id)
            .bind(project_id)
            .bind(file_name)
            .fetch_optional(pool)
            .await
    }

    /// Delete a file of a project. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, project_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM project_files WHERE id = $1 AND project_id = $2")
            .bind(id)
            .bind(project_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
