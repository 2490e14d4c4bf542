//! Store implementations over the `folio-db` repositories.

use async_trait::async_trait;
use folio_core::progress::{NewProgressRecord, ProgressRecord};
use folio_core::report::ReportStatus;
use folio_core::types::{DbId, JobId};
use folio_db::listener::ProgressListener;
use folio_db::models::project_file::{FileCounts, ProjectFile};
use folio_db::models::workflow_state::{UpsertWorkflowState, WorkflowState};
use folio_db::repositories::{ProgressRecordRepo, ProjectFileRepo, ReportRepo, WorkflowStateRepo};
use folio_db::DbPool;
use futures::StreamExt;

use crate::store::{
    FileStore, ProgressFeed, ProgressStore, ReportInfo, ReportStore, StoreError, WorkflowStore,
};

/// Progress records in `progress_records`, pushed via `LISTEN/NOTIFY`.
#[derive(Clone)]
pub struct PgProgressStore {
    pool: DbPool,
}

impl PgProgressStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn latest(&self, job_id: &JobId) -> Result<Option<ProgressRecord>, StoreError> {
        let row = ProgressRecordRepo::latest_for_job(&self.pool, job_id.as_str()).await?;
        Ok(row.map(ProgressRecord::try_from).transpose()?)
    }

    async fn append(&self, record: NewProgressRecord) -> Result<ProgressRecord, StoreError> {
        let row = ProgressRecordRepo::insert(
            &self.pool,
            record.job_id.as_str(),
            record.status.as_str(),
            &record.message,
            record.progress,
        )
        .await?;
        Ok(ProgressRecord::try_from(row)?)
    }

    async fn subscribe(&self, job_id: &JobId) -> Result<ProgressFeed, StoreError> {
        let listener = ProgressListener::connect(&self.pool, job_id.as_str()).await?;
        let feed = futures::stream::unfold(Some(listener), |state| async move {
            let mut listener = state?;
            match listener.recv().await {
                Ok(row) => {
                    let record = ProgressRecord::try_from(row).map_err(StoreError::from);
                    Some((record, Some(listener)))
                }
                Err(e) => Some((Err(StoreError::Database(e)), None)),
            }
        });
        Ok(feed.boxed())
    }
}

#[derive(Clone)]
pub struct PgWorkflowStore {
    pool: DbPool,
}

impl PgWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn find(&self, project_id: DbId) -> Result<Option<WorkflowState>, StoreError> {
        Ok(WorkflowStateRepo::find_by_project(&self.pool, project_id).await?)
    }

    async fn upsert(
        &self,
        project_id: DbId,
        user_id: DbId,
        step: u8,
    ) -> Result<WorkflowState, StoreError> {
        let input = UpsertWorkflowState {
            project_id,
            user_id,
            step: i32::from(step),
        };
        Ok(WorkflowStateRepo::upsert(&self.pool, &input).await?)
    }

    async fn latest_active_for_user(
        &self,
        user_id: DbId,
    ) -> Result<Option<WorkflowState>, StoreError> {
        Ok(WorkflowStateRepo::latest_active_for_user(&self.pool, user_id).await?)
    }
}

#[derive(Clone)]
pub struct PgReportStore {
    pool: DbPool,
}

impl PgReportStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn find(&self, report_id: DbId) -> Result<Option<ReportInfo>, StoreError> {
        let row = ReportRepo::find_by_id(&self.pool, report_id).await?;
        Ok(row.map(ReportInfo::try_from).transpose()?)
    }

    async fn find_for_project(&self, project_id: DbId) -> Result<Option<ReportInfo>, StoreError> {
        let row = ReportRepo::find_latest_for_project(&self.pool, project_id).await?;
        Ok(row.map(ReportInfo::try_from).transpose()?)
    }

    async fn set_status(
        &self,
        report_id: DbId,
        status: ReportStatus,
        active_job: Option<&JobId>,
    ) -> Result<(), StoreError> {
        let updated = ReportRepo::update_status(
            &self.pool,
            report_id,
            status.as_str(),
            active_job.map(JobId::as_str),
        )
        .await?;
        if updated.is_none() {
            tracing::warn!(report_id, status = status.as_str(), "Report to update not found");
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgFileStore {
    pool: DbPool,
}

impl PgFileStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileStore for PgFileStore {
    async fn unprocessed(&self, project_id: DbId) -> Result<Vec<ProjectFile>, StoreError> {
        Ok(ProjectFileRepo::list_unprocessed(&self.pool, project_id).await?)
    }

    async fn counts(&self, project_id: DbId) -> Result<FileCounts, StoreError> {
        Ok(ProjectFileRepo::counts(&self.pool, project_id).await?)
    }

    async fn rename(
        &self,
        project_id: DbId,
        file_id: DbId,
        file_name: &str,
    ) -> Result<Option<ProjectFile>, StoreError> {
        Ok(ProjectFileRepo::rename(&self.pool, project_id, file_id, file_name).await?)
    }

    async fn delete(&self, project_id: DbId, file_id: DbId) -> Result<bool, StoreError> {
        Ok(ProjectFileRepo::delete(&self.pool, project_id, file_id).await?)
    }
}
