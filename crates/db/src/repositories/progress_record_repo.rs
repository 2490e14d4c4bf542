//! Repository for the append-only `progress_records` table.

use sqlx::PgPool;

use crate::models::progress_record::ProgressRecordRow;

/// Column list for `progress_records` queries.
const COLUMNS: &str = "id, job_id, status, message, progress, created_at";

pub struct ProgressRecordRepo;

impl ProgressRecordRepo {
    /// Append a record. Never updates existing rows.
    pub async fn insert(
        pool: &PgPool,
        job_id: &str,
        status: &str,
        message: &str,
        progress: i16,
    ) -> Result<ProgressRecordRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO progress_records (job_id, status, message, progress) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProgressRecordRow>(&query)
            .bind(job_id)
            .bind(status)
            .bind(message)
            .bind(progress)
            .fetch_one(pool)
            .await
    }

    /// Most recent record for a job.
    pub async fn latest_for_job(
        pool: &PgPool,
        job_id: &str,
    ) -> Result<Option<ProgressRecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM progress_records \
             WHERE job_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, ProgressRecordRow>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: i64,
    ) -> Result<Option<ProgressRecordRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM progress_records WHERE id = $1");
        sqlx::query_as::<_, ProgressRecordRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
