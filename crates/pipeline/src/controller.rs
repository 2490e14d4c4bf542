//! Workflow controller.
//!
//! Sole writer of a project's workflow row. Business preconditions are
//! checked by step coordinators before they call [`WorkflowController::advance`];
//! the controller only checks that the step exists.

use std::sync::Arc;

use folio_core::error::CoreError;
use folio_core::types::DbId;
use folio_core::workflow::{WorkflowPosition, WorkflowStep, STEP_SENTINEL};
use folio_db::models::workflow_state::WorkflowState;
use folio_events::{EventBus, PlatformEvent};
use serde::Serialize;

use crate::store::{StoreError, WorkflowStore};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Where a returning user picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResumePoint {
    pub project_id: DbId,
    pub step: WorkflowStep,
}

/// Step state machine of the projects owned by one user.
pub struct WorkflowController {
    store: Arc<dyn WorkflowStore>,
    events: Arc<EventBus>,
    user_id: DbId,
}

impl WorkflowController {
    pub fn new(store: Arc<dyn WorkflowStore>, events: Arc<EventBus>, user_id: DbId) -> Self {
        Self {
            store,
            events,
            user_id,
        }
    }

    pub fn user_id(&self) -> DbId {
        self.user_id
    }

    /// Stored position of a project, distinguishing "never started" from "exited".
    pub async fn position(&self, project_id: DbId) -> Result<WorkflowPosition, ControllerError> {
        let row = self.store.find(project_id).await?;
        Ok(WorkflowPosition::from_stored(row.map(|r| r.step))?)
    }

    /// Step to render for a project. No row and the exit sentinel both read as step 1.
    pub async fn get_current_step(&self, project_id: DbId) -> Result<WorkflowStep, ControllerError> {
        Ok(self.position(project_id).await?.effective_step())
    }

    /// Persist `step` as the project's current step.
    pub async fn advance(
        &self,
        project_id: DbId,
        step: WorkflowStep,
    ) -> Result<WorkflowState, ControllerError> {
        self.write(project_id, step.to_number()).await
    }

    /// Most recently edited in-workflow project of the user.
    pub async fn resume(&self) -> Result<Option<ResumePoint>, ControllerError> {
        let Some(row) = self.store.latest_active_for_user(self.user_id).await? else {
            return Ok(None);
        };
        match WorkflowPosition::from_stored(Some(row.step))? {
            WorkflowPosition::Active(step) => Ok(Some(ResumePoint {
                project_id: row.project_id,
                step,
            })),
            WorkflowPosition::NotStarted | WorkflowPosition::Exited => Ok(None),
        }
    }

    /// Leave the workflow: park the row on the sentinel step.
    pub async fn exit(&self, project_id: DbId) -> Result<WorkflowState, ControllerError> {
        self.write(project_id, STEP_SENTINEL).await
    }

    async fn write(&self, project_id: DbId, step: u8) -> Result<WorkflowState, ControllerError> {
        let previous = self
            .store
            .find(project_id)
            .await?
            .and_then(|row| u8::try_from(row.step).ok());

        let row = self.store.upsert(project_id, self.user_id, step).await?;

        tracing::info!(
            project_id,
            user_id = self.user_id,
            from_step = ?previous,
            to_step = step,
            "Workflow step changed",
        );
        self.events.publish(
            PlatformEvent::step_changed(project_id, previous, step).with_actor(self.user_id),
        );
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::job_events::EVENT_STEP_CHANGED;

    use crate::memory::MemoryWorkflowStore;

    fn controller(user_id: DbId) -> (WorkflowController, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let store = Arc::new(MemoryWorkflowStore::new());
        (WorkflowController::new(store, bus.clone(), user_id), bus)
    }

    #[tokio::test]
    async fn missing_row_reads_as_step_one() {
        let (ctl, _) = controller(1);
        assert_eq!(ctl.position(9).await.unwrap(), WorkflowPosition::NotStarted);
        assert_eq!(ctl.get_current_step(9).await.unwrap(), WorkflowStep::Setup);
        assert!(ctl.resume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn advance_then_resume_returns_step() {
        let (ctl, _) = controller(1);
        ctl.advance(5, WorkflowStep::Notes).await.unwrap();

        let resume = ctl.resume().await.unwrap().unwrap();
        assert_eq!(
            resume,
            ResumePoint {
                project_id: 5,
                step: WorkflowStep::Notes
            }
        );
        assert_eq!(ctl.get_current_step(5).await.unwrap(), WorkflowStep::Notes);
    }

    #[tokio::test]
    async fn exit_parks_on_sentinel() {
        let (ctl, _) = controller(1);
        ctl.advance(5, WorkflowStep::Review).await.unwrap();
        let row = ctl.exit(5).await.unwrap();

        assert_eq!(row.step, 0);
        assert_eq!(ctl.position(5).await.unwrap(), WorkflowPosition::Exited);
        assert_eq!(ctl.get_current_step(5).await.unwrap(), WorkflowStep::Setup);
        assert!(ctl.resume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_is_scoped_to_user() {
        let bus = Arc::new(EventBus::default());
        let store = Arc::new(MemoryWorkflowStore::new());
        let alice = WorkflowController::new(store.clone(), bus.clone(), 1);
        let bob = WorkflowController::new(store, bus, 2);

        alice.advance(10, WorkflowStep::Upload).await.unwrap();
        assert!(bob.resume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn step_change_is_published() {
        let (ctl, bus) = controller(3);
        let mut rx = bus.subscribe();

        ctl.advance(5, WorkflowStep::Upload).await.unwrap();
        ctl.advance(5, WorkflowStep::Analysis).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type, EVENT_STEP_CHANGED);
        assert!(first.payload["from_step"].is_null());
        assert_eq!(first.payload["to_step"], 2);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.payload["from_step"], 2);
        assert_eq!(second.payload["to_step"], 3);
        assert_eq!(second.actor_user_id, Some(3));
    }
}
