//! Progress record entity model.

use folio_core::error::CoreError;
use folio_core::progress::{ProgressRecord, ProgressStatus};
use folio_core::types::{DbId, JobId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `progress_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProgressRecordRow {
    pub id: DbId,
    pub job_id: String,
    pub status: String,
    pub message: String,
    pub progress: i16,
    pub created_at: Timestamp,
}

impl TryFrom<ProgressRecordRow> for ProgressRecord {
    type Error = CoreError;

    fn try_from(row: ProgressRecordRow) -> Result<Self, Self::Error> {
        Ok(ProgressRecord {
            id: row.id,
            job_id: JobId::from(row.job_id),
            status: ProgressStatus::from_str_db(&row.status)?,
            message: row.message,
            progress: row.progress,
            created_at: row.created_at,
        })
    }
}
