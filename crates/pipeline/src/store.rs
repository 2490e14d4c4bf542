//! Persistence seams of the orchestrator.
//!
//! Every component talks to storage through these traits. [`crate::postgres`]
//! implements them over the `folio-db` repositories; [`crate::memory`]
//! implements them in process for tests and single-node demos.

use async_trait::async_trait;
use folio_core::error::CoreError;
use folio_core::progress::{NewProgressRecord, ProgressRecord};
use folio_core::report::ReportStatus;
use folio_core::types::{DbId, JobId, Timestamp};
use folio_db::models::project_file::{FileCounts, ProjectFile};
use folio_db::models::report::Report;
use folio_db::models::workflow_state::WorkflowState;
use futures::stream::BoxStream;
use serde::Serialize;

/// Errors from any store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be interpreted.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The push channel for progress records broke.
    #[error("Progress subscription failed: {0}")]
    Subscription(String),
}

/// Live feed of progress records for one job, in insertion order.
///
/// An `Err` item or the end of the stream means the feed is gone and
/// must be re-established.
pub type ProgressFeed = BoxStream<'static, Result<ProgressRecord, StoreError>>;

/// Append-only progress records, readable and subscribable per job.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Most recent record of a job.
    async fn latest(&self, job_id: &JobId) -> Result<Option<ProgressRecord>, StoreError>;

    /// Append a record and return it with its id and timestamp.
    async fn append(&self, record: NewProgressRecord) -> Result<ProgressRecord, StoreError>;

    /// Records appended for `job_id` from now on.
    async fn subscribe(&self, job_id: &JobId) -> Result<ProgressFeed, StoreError>;
}

/// One persisted workflow row per project.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn find(&self, project_id: DbId) -> Result<Option<WorkflowState>, StoreError>;

    /// Insert or overwrite the row. Last write wins.
    async fn upsert(
        &self,
        project_id: DbId,
        user_id: DbId,
        step: u8,
    ) -> Result<WorkflowState, StoreError>;

    /// Most recently touched row of the user with a step above the sentinel.
    async fn latest_active_for_user(
        &self,
        user_id: DbId,
    ) -> Result<Option<WorkflowState>, StoreError>;
}

/// Report bookkeeping as the orchestrator sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportInfo {
    pub id: DbId,
    pub project_id: DbId,
    pub title: String,
    pub status: ReportStatus,
    pub active_job: Option<JobId>,
    pub generated_at: Option<Timestamp>,
}

impl TryFrom<Report> for ReportInfo {
    type Error = CoreError;

    fn try_from(row: Report) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            title: row.title,
            status: ReportStatus::from_str_db(&row.status)?,
            active_job: row.active_job.map(JobId::from),
            generated_at: row.generated_at,
        })
    }
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn find(&self, report_id: DbId) -> Result<Option<ReportInfo>, StoreError>;

    /// The newest report of a project.
    async fn find_for_project(&self, project_id: DbId) -> Result<Option<ReportInfo>, StoreError>;

    /// Set status and in-flight job together.
    async fn set_status(
        &self,
        report_id: DbId,
        status: ReportStatus,
        active_job: Option<&JobId>,
    ) -> Result<(), StoreError>;
}

/// Uploaded files of a project.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Files the analysis worker has not processed yet.
    async fn unprocessed(&self, project_id: DbId) -> Result<Vec<ProjectFile>, StoreError>;

    async fn counts(&self, project_id: DbId) -> Result<FileCounts, StoreError>;

    /// `None` if the project has no file `file_id`.
    async fn rename(
        &self,
        project_id: DbId,
        file_id: DbId,
        file_name: &str,
    ) -> Result<Option<ProjectFile>, StoreError>;

    /// Returns `true` if the project had the file.
    async fn delete(&self, project_id: DbId, file_id: DbId) -> Result<bool, StoreError>;
}
