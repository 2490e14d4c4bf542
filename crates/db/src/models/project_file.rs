//! Uploaded project file model.

use folio_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `project_files` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectFile {
    pub id: DbId,
    pub project_id: DbId,
    pub file_name: String,
    pub mime_type: String,
    /// Set once the analysis worker has processed the file.
    pub processed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Aggregate counters shown on the upload and analysis screens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct FileCounts {
    pub total: i64,
    pub processed: i64,
    pub images: i64,
}
