//! What the job-running steps hand to the worker.

use std::sync::Arc;

use async_trait::async_trait;
use folio_core::job::{JobKind, JobTarget};
use folio_core::report::ReportStatus;
use folio_core::types::DbId;

use crate::coordinator::CoordinatorError;
use crate::store::{FileStore, ReportStore};

/// Prerequisite check of a step that launches a job.
#[async_trait]
pub trait StepWork: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Target of the next job, or `None` when there is nothing to process.
    async fn pending(&self, project_id: DbId) -> Result<Option<JobTarget>, CoordinatorError>;
}

/// Step 3: analyse every file the worker has not processed yet.
pub struct FileAnalysisWork {
    files: Arc<dyn FileStore>,
    reports: Arc<dyn ReportStore>,
}

impl FileAnalysisWork {
    pub fn new(files: Arc<dyn FileStore>, reports: Arc<dyn ReportStore>) -> Self {
        Self { files, reports }
    }
}

#[async_trait]
impl StepWork for FileAnalysisWork {
    fn kind(&self) -> JobKind {
        JobKind::FileAnalysis
    }

    async fn pending(&self, project_id: DbId) -> Result<Option<JobTarget>, CoordinatorError> {
        let unprocessed = self.files.unprocessed(project_id).await?;
        if unprocessed.is_empty() {
            return Ok(None);
        }

        let report = self.reports.find_for_project(project_id).await?;
        Ok(Some(JobTarget {
            project_id,
            report_id: report.as_ref().map(|r| r.id),
            file_ids: unprocessed.iter().map(|f| f.id).collect(),
            name: report.map(|r| r.title).unwrap_or_default(),
        }))
    }
}

/// Step 5: generate the project's report unless a usable one exists.
pub struct ReportGenerationWork {
    reports: Arc<dyn ReportStore>,
}

impl ReportGenerationWork {
    pub fn new(reports: Arc<dyn ReportStore>) -> Self {
        Self { reports }
    }
}

#[async_trait]
impl StepWork for ReportGenerationWork {
    fn kind(&self) -> JobKind {
        JobKind::ReportGeneration
    }

    async fn pending(&self, project_id: DbId) -> Result<Option<JobTarget>, CoordinatorError> {
        let report = self
            .reports
            .find_for_project(project_id)
            .await?
            .ok_or_else(|| {
                CoordinatorError::Precondition("The project has no report to generate".into())
            })?;

        let generated = report.generated_at.is_some() && report.status != ReportStatus::Archived;
        if generated {
            return Ok(None);
        }

        Ok(Some(JobTarget {
            project_id,
            report_id: Some(report.id),
            file_ids: Vec::new(),
            name: report.title,
        }))
    }
}
