//! Navigation guard.
//!
//! Stops a user from leaving an in-progress workflow (step 2 or later)
//! without confirming. Only one confirmation can be outstanding; further
//! navigation attempts are ignored until it is confirmed or cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use folio_core::types::DbId;
use folio_core::workflow::{WorkflowPosition, WorkflowStep};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::controller::WorkflowController;
use crate::coordinator::{leave_workflow, CoordinatorError};
use crate::store::ReportStore;

/// Decision for one navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Interception {
    Allow,
    /// Navigation is held until [`NavigationGuard::confirm`] or
    /// [`NavigationGuard::cancel`] is called with `ticket`.
    Prompt { ticket: u64, target: String },
    /// Another prompt is outstanding.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GuardState {
    Idle,
    /// Reading the workflow position for an attempt.
    Checking,
    Prompting { ticket: u64, target: String },
}

pub struct NavigationGuard {
    controller: Arc<WorkflowController>,
    reports: Arc<dyn ReportStore>,
    project_id: DbId,
    workflow_prefix: String,
    publish_report_on_leave: bool,
    state: Mutex<GuardState>,
    tickets: AtomicU64,
}

impl NavigationGuard {
    pub fn new(
        controller: Arc<WorkflowController>,
        reports: Arc<dyn ReportStore>,
        project_id: DbId,
        workflow_prefix: impl Into<String>,
        publish_report_on_leave: bool,
    ) -> Self {
        Self {
            controller,
            reports,
            project_id,
            workflow_prefix: workflow_prefix.into(),
            publish_report_on_leave,
            state: Mutex::new(GuardState::Idle),
            tickets: AtomicU64::new(0),
        }
    }

    /// Decide whether navigation to `target` may proceed.
    pub async fn intercept(&self, target: &str) -> Result<Interception, CoordinatorError> {
        if target.starts_with(&self.workflow_prefix) {
            return Ok(Interception::Allow);
        }

        {
            let mut state = self.state.lock().await;
            if *state != GuardState::Idle {
                tracing::debug!(
                    project_id = self.project_id,
                    route = target,
                    "Prompt pending, ignoring",
                );
                return Ok(Interception::Ignored);
            }
            *state = GuardState::Checking;
        }

        let position = match self.controller.position(self.project_id).await {
            Ok(position) => position,
            Err(e) => {
                *self.state.lock().await = GuardState::Idle;
                return Err(e.into());
            }
        };

        let mut state = self.state.lock().await;
        match position {
            WorkflowPosition::Active(step) if step != WorkflowStep::Setup => {
                let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
                *state = GuardState::Prompting {
                    ticket,
                    target: target.to_string(),
                };
                tracing::info!(
                    project_id = self.project_id,
                    ?step,
                    route = target,
                    "Confirm leaving workflow",
                );
                Ok(Interception::Prompt {
                    ticket,
                    target: target.to_string(),
                })
            }
            _ => {
                *state = GuardState::Idle;
                Ok(Interception::Allow)
            }
        }
    }

    /// Leave the workflow and release the held navigation.
    ///
    /// Returns the target to navigate to, or `None` when `ticket` is not
    /// the outstanding prompt.
    pub async fn confirm(&self, ticket: u64) -> Result<Option<String>, CoordinatorError> {
        let mut state = self.state.lock().await;
        let target = match &*state {
            GuardState::Prompting { ticket: pending, target } if *pending == ticket => {
                target.clone()
            }
            _ => return Ok(None),
        };

        leave_workflow(
            &self.controller,
            self.reports.as_ref(),
            self.project_id,
            self.publish_report_on_leave,
        )
        .await?;

        *state = GuardState::Idle;
        tracing::info!(project_id = self.project_id, route = %target, "Left workflow");
        Ok(Some(target))
    }

    /// Drop the outstanding prompt; navigation does not happen.
    pub async fn cancel(&self, ticket: u64) -> bool {
        let mut state = self.state.lock().await;
        match &*state {
            GuardState::Prompting { ticket: pending, .. } if *pending == ticket => {
                *state = GuardState::Idle;
                true
            }
            _ => false,
        }
    }

    pub async fn is_prompting(&self) -> bool {
        matches!(*self.state.lock().await, GuardState::Prompting { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use folio_core::report::ReportStatus;
    use folio_events::EventBus;

    use crate::memory::{MemoryReportStore, MemoryWorkflowStore};

    struct Fixture {
        controller: Arc<WorkflowController>,
        reports: Arc<MemoryReportStore>,
        guard: NavigationGuard,
    }

    fn fixture() -> Fixture {
        let controller = Arc::new(WorkflowController::new(
            Arc::new(MemoryWorkflowStore::new()),
            Arc::new(EventBus::default()),
            1,
        ));
        let reports = Arc::new(MemoryReportStore::new());
        let guard = NavigationGuard::new(controller.clone(), reports.clone(), 7, "/workflow", true);
        Fixture {
            controller,
            reports,
            guard,
        }
    }

    #[tokio::test]
    async fn inactive_below_step_two() {
        let f = fixture();
        assert_eq!(f.guard.intercept("/dashboard").await.unwrap(), Interception::Allow);

        f.controller.advance(7, WorkflowStep::Setup).await.unwrap();
        assert_eq!(f.guard.intercept("/dashboard").await.unwrap(), Interception::Allow);
    }

    #[tokio::test]
    async fn workflow_routes_pass_through() {
        let f = fixture();
        f.controller.advance(7, WorkflowStep::Notes).await.unwrap();
        assert_eq!(
            f.guard.intercept("/workflow/7/generation").await.unwrap(),
            Interception::Allow
        );
    }

    #[tokio::test]
    async fn second_attempt_is_ignored_while_prompting() {
        let f = fixture();
        f.controller.advance(7, WorkflowStep::Upload).await.unwrap();

        let first = f.guard.intercept("/dashboard").await.unwrap();
        assert_matches!(first, Interception::Prompt { .. });
        assert_eq!(f.guard.intercept("/settings").await.unwrap(), Interception::Ignored);
    }

    #[tokio::test]
    async fn cancel_returns_to_idle() {
        let f = fixture();
        f.controller.advance(7, WorkflowStep::Upload).await.unwrap();

        let Interception::Prompt { ticket, .. } = f.guard.intercept("/dashboard").await.unwrap()
        else {
            panic!("expected a prompt");
        };
        assert!(f.guard.cancel(ticket).await);
        assert!(!f.guard.is_prompting().await);
        assert_eq!(
            f.controller.get_current_step(7).await.unwrap(),
            WorkflowStep::Upload
        );
        assert_matches!(
            f.guard.intercept("/dashboard").await.unwrap(),
            Interception::Prompt { .. }
        );
    }

    #[tokio::test]
    async fn confirm_leaves_workflow_and_publishes_report() {
        let f = fixture();
        let report = f.reports.create(7, "Survey").await;
        f.controller.advance(7, WorkflowStep::Review).await.unwrap();

        let Interception::Prompt { ticket, .. } = f.guard.intercept("/dashboard").await.unwrap()
        else {
            panic!("expected a prompt");
        };
        assert_eq!(f.guard.confirm(ticket + 1).await.unwrap(), None);
        assert_eq!(
            f.guard.confirm(ticket).await.unwrap().as_deref(),
            Some("/dashboard")
        );

        assert_eq!(f.controller.position(7).await.unwrap(), WorkflowPosition::Exited);
        let stored = f.reports.find(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Published);
        assert_eq!(f.guard.intercept("/dashboard").await.unwrap(), Interception::Allow);
    }
}
