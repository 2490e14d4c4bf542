//! File actions offered on the upload and analysis screens.
//!
//! One [`FileActions`] value is built per screen and handed to whatever
//! presents the file dialogs.

use std::sync::Arc;

use async_trait::async_trait;
use folio_core::error::CoreError;
use folio_core::types::DbId;
use folio_db::models::project_file::{FileCounts, ProjectFile};

use crate::coordinator::{CoordinatorError, MountOutcome, StartOutcome, StepCoordinator};
use crate::store::FileStore;

#[async_trait]
pub trait FileActions: Send + Sync {
    async fn on_edit(&self, file_id: DbId, file_name: &str) -> Result<ProjectFile, CoordinatorError>;

    async fn on_delete(&self, file_id: DbId) -> Result<FileCounts, CoordinatorError>;

    /// Run analysis over the unprocessed files.
    async fn on_analyze(&self) -> Result<StartOutcome, CoordinatorError>;

    /// Refresh counters after an upload finished.
    async fn on_file_added(&self) -> Result<FileCounts, CoordinatorError>;
}

/// File actions of one project, wired to its analysis coordinator.
pub struct ProjectFileActions {
    project_id: DbId,
    files: Arc<dyn FileStore>,
    analysis: Arc<StepCoordinator>,
}

impl ProjectFileActions {
    pub fn new(project_id: DbId, files: Arc<dyn FileStore>, analysis: Arc<StepCoordinator>) -> Self {
        Self {
            project_id,
            files,
            analysis,
        }
    }
}

#[async_trait]
impl FileActions for ProjectFileActions {
    async fn on_edit(&self, file_id: DbId, file_name: &str) -> Result<ProjectFile, CoordinatorError> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(CoordinatorError::Precondition("File name must not be empty".into()));
        }
        let file = self
            .files
            .rename(self.project_id, file_id, file_name)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "ProjectFile",
                id: file_id,
            })?;
        tracing::info!(project_id = self.project_id, file_id, "File renamed");
        Ok(file)
    }

    async fn on_delete(&self, file_id: DbId) -> Result<FileCounts, CoordinatorError> {
        if !self.files.delete(self.project_id, file_id).await? {
            return Err(CoreError::NotFound {
                entity: "ProjectFile",
                id: file_id,
            }
            .into());
        }
        tracing::info!(project_id = self.project_id, file_id, "File deleted");
        Ok(self.files.counts(self.project_id).await?)
    }

    async fn on_analyze(&self) -> Result<StartOutcome, CoordinatorError> {
        if self.analysis.is_mounted().await {
            return self.analysis.start().await;
        }
        match self.analysis.mount().await? {
            MountOutcome::Ready {
                start: Some(start), ..
            } => Ok(start),
            MountOutcome::Ready { start: None, .. } => Ok(StartOutcome::NotApplicable),
            MountOutcome::RedirectToSetup => Err(CoordinatorError::NotMounted),
        }
    }

    async fn on_file_added(&self) -> Result<FileCounts, CoordinatorError> {
        Ok(self.files.counts(self.project_id).await?)
    }
}
