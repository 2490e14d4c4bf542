//! Step coordinators for workflow steps 2 through 6.
//!
//! A coordinator checks its step's preconditions, drives the step's job
//! (steps 3 and 5) through the dispatcher and the progress monitor, and
//! moves the workflow on when the step is satisfied. Its state is
//! published as a [`CoordinatorView`] on a watch channel.
//!
//! At most one dispatch/observe cycle is active per coordinator. Going
//! back cancels the cycle, which unsubscribes the monitor session and
//! drops any pending auto-advance.

use std::sync::Arc;
use std::time::Duration;

use folio_core::error::CoreError;
use folio_core::progress::{JobOutcome, ProgressState, STALE_JOB_MESSAGE};
use folio_core::report::ReportStatus;
use folio_core::types::{DbId, JobId};
use folio_core::workflow::{validate_step_transition, WorkflowPosition, WorkflowStep};
use folio_db::models::project_file::FileCounts;
use folio_events::{EventBus, PlatformEvent};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::controller::{ControllerError, WorkflowController};
use crate::dispatcher::{DispatchContext, JobDispatcher};
use crate::monitor::{MonitorEvent, MonitorSession, ObservedJob, ProgressMonitor};
use crate::store::{FileStore, ReportInfo, ReportStore, StoreError};
use crate::work::{FileAnalysisWork, ReportGenerationWork, StepWork};

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Step {0:?} has no coordinator")]
    Uncoordinated(WorkflowStep),

    #[error("Coordinator is not mounted on a project")]
    NotMounted,

    /// The step's work is not satisfied yet.
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Read state shown next to a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary {
    pub files: FileCounts,
    pub report: Option<ReportInfo>,
}

/// Why a step's job did not succeed. Every failure can be retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepFailure {
    /// The worker did not accept the job.
    Dispatch { message: String },
    /// The worker reported an error.
    Worker { message: String },
    /// No progress within the staleness window.
    Stale { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StepPhase {
    Idle,
    Running,
    /// Job succeeded; the automatic step change is pending.
    Succeeded,
    /// Nothing left to do on this step.
    Complete,
    Advanced { step: WorkflowStep },
    Failed { failure: StepFailure },
    /// No active workflow; the user belongs on step 1.
    Redirected,
    Exited,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorView {
    pub step: WorkflowStep,
    pub project_id: Option<DbId>,
    pub phase: StepPhase,
    pub job_id: Option<JobId>,
    pub progress: ProgressState,
    pub summary: Option<StepSummary>,
    pub taking_longer: bool,
    /// `false` once push updates were given up; polling may still finish the job.
    pub live_updates: bool,
}

impl CoordinatorView {
    fn new(step: WorkflowStep) -> Self {
        Self {
            step,
            project_id: None,
            phase: StepPhase::Idle,
            job_id: None,
            progress: ProgressState::default(),
            summary: None,
            taking_longer: false,
            live_updates: true,
        }
    }

    /// Forget everything about the previous job.
    fn reset_job(&mut self) {
        self.phase = StepPhase::Idle;
        self.job_id = None;
        self.progress = ProgressState::default();
        self.taking_longer = false;
        self.live_updates = true;
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MountOutcome {
    Ready {
        project_id: DbId,
        /// How the step's job was started, on job steps.
        start: Option<StartOutcome>,
    },
    RedirectToSetup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { job_id: JobId },
    /// Observing a job dispatched on an earlier visit.
    Reattached { job_id: JobId },
    /// Nothing to process; no job was dispatched.
    FastPath,
    /// A cycle is already active.
    AlreadyRunning,
    DispatchFailed { message: String },
    /// The step does not run a job.
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "step", rename_all = "snake_case")]
pub enum NextOutcome {
    Advanced(WorkflowStep),
    Exited,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Collaborators shared by all coordinators of one user.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub controller: Arc<WorkflowController>,
    pub dispatcher: Arc<JobDispatcher>,
    pub monitor: Arc<ProgressMonitor>,
    pub files: Arc<dyn FileStore>,
    pub reports: Arc<dyn ReportStore>,
    pub events: Arc<EventBus>,
    pub advance_delay: Duration,
}

enum StepRole {
    Upload,
    Job(Arc<dyn StepWork>),
    Notes,
    Review,
}

struct Cycle {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    project_id: Option<DbId>,
    cycle: Option<Cycle>,
    cycles_started: u64,
}

pub struct StepCoordinator {
    step: WorkflowStep,
    role: StepRole,
    deps: CoordinatorDeps,
    project_hint: Option<DbId>,
    inner: Mutex<Inner>,
    view: watch::Sender<CoordinatorView>,
}

impl StepCoordinator {
    /// Coordinator for `step`. With a `project_hint` the coordinator
    /// mounts on that project; otherwise on the user's resumable one.
    pub fn new(
        step: WorkflowStep,
        deps: CoordinatorDeps,
        project_hint: Option<DbId>,
    ) -> Result<Arc<Self>, CoordinatorError> {
        let role = match step {
            WorkflowStep::Setup => return Err(CoordinatorError::Uncoordinated(step)),
            WorkflowStep::Upload => StepRole::Upload,
            WorkflowStep::Analysis => StepRole::Job(Arc::new(FileAnalysisWork::new(
                Arc::clone(&deps.files),
                Arc::clone(&deps.reports),
            ))),
            WorkflowStep::Notes => StepRole::Notes,
            WorkflowStep::Generation => {
                StepRole::Job(Arc::new(ReportGenerationWork::new(Arc::clone(&deps.reports))))
            }
            WorkflowStep::Review => StepRole::Review,
        };
        let (view, _) = watch::channel(CoordinatorView::new(step));

        Ok(Arc::new(Self {
            step,
            role,
            deps,
            project_hint,
            inner: Mutex::new(Inner::default()),
            view,
        }))
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn view(&self) -> CoordinatorView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<CoordinatorView> {
        self.view.subscribe()
    }

    pub async fn is_mounted(&self) -> bool {
        self.inner.lock().await.project_id.is_some()
    }

    /// Whether a dispatch/observe cycle is active.
    pub async fn is_busy(&self) -> bool {
        self.inner.lock().await.cycle.is_some()
    }

    /// Resolve the project and, on job steps, start or re-attach the job.
    pub async fn mount(self: &Arc<Self>) -> Result<MountOutcome, CoordinatorError> {
        let Some(project_id) = self.resolve_project().await? else {
            tracing::info!(step = ?self.step, "No active workflow, redirecting to setup");
            self.view.send_modify(|v| v.phase = StepPhase::Redirected);
            return Ok(MountOutcome::RedirectToSetup);
        };

        self.inner.lock().await.project_id = Some(project_id);
        self.view.send_modify(|v| {
            v.project_id = Some(project_id);
            if v.phase == StepPhase::Redirected {
                v.phase = StepPhase::Idle;
            }
        });
        self.refresh_summary(project_id).await;

        let start = match self.role {
            StepRole::Job(_) => Some(self.start().await?),
            StepRole::Notes | StepRole::Review => {
                self.view.send_modify(|v| v.phase = StepPhase::Complete);
                None
            }
            StepRole::Upload => None,
        };
        Ok(MountOutcome::Ready { project_id, start })
    }

    /// Start the step's job unless a cycle is already active.
    pub async fn start(self: &Arc<Self>) -> Result<StartOutcome, CoordinatorError> {
        self.begin(false).await
    }

    /// Start again from a clean state after a failure. A report archived
    /// by a stale run goes back to draft first.
    pub async fn retry(self: &Arc<Self>) -> Result<StartOutcome, CoordinatorError> {
        if self.is_busy().await {
            return Ok(StartOutcome::AlreadyRunning);
        }
        let after_stale = matches!(
            self.view.borrow().phase,
            StepPhase::Failed {
                failure: StepFailure::Stale { .. }
            }
        );
        tracing::info!(step = ?self.step, after_stale, "Retrying step");
        self.view.send_modify(CoordinatorView::reset_job);
        self.begin(after_stale).await
    }

    async fn begin(self: &Arc<Self>, after_stale: bool) -> Result<StartOutcome, CoordinatorError> {
        let StepRole::Job(work) = &self.role else {
            return Ok(StartOutcome::NotApplicable);
        };
        let project_id = self.project_id().await?;

        let (cycle_id, cancel) = {
            let mut inner = self.inner.lock().await;
            if inner.cycle.is_some() {
                tracing::debug!(project_id, step = ?self.step, "Cycle already active, ignoring start");
                return Ok(StartOutcome::AlreadyRunning);
            }
            inner.cycles_started += 1;
            let cycle = Cycle {
                id: inner.cycles_started,
                cancel: CancellationToken::new(),
            };
            let reserved = (cycle.id, cycle.cancel.clone());
            inner.cycle = Some(cycle);
            reserved
        };

        let result = self
            .launch(Arc::clone(work), project_id, after_stale, cycle_id, cancel)
            .await;
        if !matches!(
            result,
            Ok(StartOutcome::Started { .. } | StartOutcome::Reattached { .. })
        ) {
            self.end_cycle(cycle_id).await;
        }
        result
    }

    /// Move to the next step once this one is satisfied. On the review
    /// step this finishes the workflow.
    pub async fn next(&self) -> Result<NextOutcome, CoordinatorError> {
        let project_id = self.project_id().await?;

        match &self.role {
            StepRole::Upload => {
                let counts = self.deps.files.counts(project_id).await?;
                if counts.total < 1 {
                    return Err(CoordinatorError::Precondition(
                        "Upload at least one file before continuing".into(),
                    ));
                }
            }
            StepRole::Job(_) => {
                let ready = matches!(
                    self.view.borrow().phase,
                    StepPhase::Succeeded | StepPhase::Complete | StepPhase::Advanced { .. }
                );
                if !ready {
                    return Err(CoordinatorError::Precondition(
                        "The step's job has not finished".into(),
                    ));
                }
            }
            StepRole::Notes => {}
            StepRole::Review => {
                self.cancel_cycle().await;
                leave_workflow(&self.deps.controller, self.deps.reports.as_ref(), project_id, true)
                    .await?;
                self.view.send_modify(|v| v.phase = StepPhase::Exited);
                return Ok(NextOutcome::Exited);
            }
        }

        let next = self
            .step
            .next()
            .ok_or_else(|| CoordinatorError::Precondition("No step after this one".into()))?;
        self.move_to(project_id, next).await?;
        Ok(NextOutcome::Advanced(next))
    }

    /// Tear down any active cycle and go one step back.
    pub async fn back(&self) -> Result<WorkflowStep, CoordinatorError> {
        let project_id = self.project_id().await?;
        let previous = self
            .step
            .previous()
            .ok_or_else(|| CoordinatorError::Precondition("No step before this one".into()))?;

        self.move_to(project_id, previous).await?;
        self.view.send_modify(|v| {
            v.reset_job();
            v.phase = StepPhase::Advanced { step: previous };
        });
        Ok(previous)
    }

    /// Stop any active cycle after the project left the workflow. A job
    /// still running on the worker is no longer observed.
    pub async fn shutdown(&self) {
        self.cancel_cycle().await;
        self.inner.lock().await.project_id = None;
        self.view.send_modify(|v| {
            v.reset_job();
            v.phase = StepPhase::Exited;
        });
    }

    // ---- private helpers ----

    async fn resolve_project(&self) -> Result<Option<DbId>, CoordinatorError> {
        let controller = &self.deps.controller;
        match self.project_hint {
            Some(project_id) => match controller.position(project_id).await? {
                WorkflowPosition::Active(_) => Ok(Some(project_id)),
                WorkflowPosition::NotStarted | WorkflowPosition::Exited => Ok(None),
            },
            None => Ok(controller.resume().await?.map(|r| r.project_id)),
        }
    }

    async fn project_id(&self) -> Result<DbId, CoordinatorError> {
        self.inner
            .lock()
            .await
            .project_id
            .ok_or(CoordinatorError::NotMounted)
    }

    async fn launch(
        self: &Arc<Self>,
        work: Arc<dyn StepWork>,
        project_id: DbId,
        after_stale: bool,
        cycle_id: u64,
        cancel: CancellationToken,
    ) -> Result<StartOutcome, CoordinatorError> {
        let report = self.deps.reports.find_for_project(project_id).await?;
        if let Some(ReportInfo {
            id,
            status: ReportStatus::Processing,
            active_job: Some(job_id),
            ..
        }) = &report
        {
            tracing::info!(project_id, job_id = %job_id, "Re-attaching to running job");
            self.observe(project_id, job_id.clone(), Some(*id), cycle_id, cancel);
            return Ok(StartOutcome::Reattached {
                job_id: job_id.clone(),
            });
        }

        let pending = work.pending(project_id).await?;
        if let Some(report) = report.filter(|r| after_stale && r.status == ReportStatus::Archived) {
            tracing::info!(project_id, report_id = report.id, "Restoring report of stale job to draft");
            self.deps
                .reports
                .set_status(report.id, ReportStatus::Draft, None)
                .await?;
        }

        let Some(target) = pending else {
            tracing::info!(project_id, step = ?self.step, "Nothing to process, step complete");
            self.refresh_summary(project_id).await;
            self.view.send_modify(|v| {
                v.reset_job();
                v.phase = StepPhase::Complete;
            });
            return Ok(StartOutcome::FastPath);
        };

        self.view.send_modify(|v| {
            v.reset_job();
            v.phase = StepPhase::Running;
        });

        let context = DispatchContext {
            requested_by: self.deps.controller.user_id(),
        };
        let job_id = match self
            .deps
            .dispatcher
            .dispatch(work.kind(), &target, context)
            .await
        {
            Ok(job_id) => job_id,
            Err(e) => {
                let message = e.to_string();
                self.view.send_modify(|v| {
                    v.phase = StepPhase::Failed {
                        failure: StepFailure::Dispatch {
                            message: message.clone(),
                        },
                    }
                });
                return Ok(StartOutcome::DispatchFailed { message });
            }
        };

        if let Some(report_id) = target.report_id {
            if let Err(e) = self
                .deps
                .reports
                .set_status(report_id, ReportStatus::Processing, Some(&job_id))
                .await
            {
                tracing::warn!(report_id, error = %e, "Failed to mark report processing");
            }
        }

        self.observe(project_id, job_id.clone(), target.report_id, cycle_id, cancel);
        Ok(StartOutcome::Started { job_id })
    }

    fn observe(
        self: &Arc<Self>,
        project_id: DbId,
        job_id: JobId,
        report_id: Option<DbId>,
        cycle_id: u64,
        cancel: CancellationToken,
    ) {
        let session = self.deps.monitor.observe(ObservedJob {
            job_id: job_id.clone(),
            report_id,
        });
        self.view.send_modify(|v| {
            v.phase = StepPhase::Running;
            v.job_id = Some(job_id);
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive(session, project_id, report_id, cycle_id, cancel)
                .await;
        });
    }

    /// Feed monitor events into the view until the job ends or the cycle is cancelled.
    async fn drive(
        &self,
        mut session: MonitorSession,
        project_id: DbId,
        report_id: Option<DbId>,
        cycle_id: u64,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    session.unsubscribe();
                    return;
                }
                event = session.next_event() => event,
            };

            match event {
                Some(MonitorEvent::Update(state)) => {
                    self.view.send_modify(|v| v.progress = state);
                }
                Some(MonitorEvent::TakingLonger) => {
                    self.view.send_modify(|v| v.taking_longer = true);
                }
                Some(MonitorEvent::SubscriptionLost) => {
                    self.view.send_modify(|v| v.live_updates = false);
                }
                Some(MonitorEvent::Finished(outcome)) => {
                    let job_id = session.job_id().clone();
                    drop(session);
                    self.on_finished(outcome, job_id, project_id, report_id, cycle_id, &cancel)
                        .await;
                    return;
                }
                None => {
                    self.end_cycle(cycle_id).await;
                    return;
                }
            }
        }
    }

    async fn on_finished(
        &self,
        outcome: JobOutcome,
        job_id: JobId,
        project_id: DbId,
        report_id: Option<DbId>,
        cycle_id: u64,
        cancel: &CancellationToken,
    ) {
        self.deps.events.publish(
            PlatformEvent::job_finished(project_id, &job_id, &outcome)
                .with_actor(self.deps.controller.user_id()),
        );

        match outcome {
            JobOutcome::Succeeded => {
                self.release_report(report_id).await;
                self.refresh_summary(project_id).await;
                self.view.send_modify(|v| v.phase = StepPhase::Succeeded);

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.deps.advance_delay) => {}
                }
                self.auto_advance(project_id, cycle_id).await;
            }
            JobOutcome::Failed { message } => {
                self.release_report(report_id).await;
                self.view.send_modify(|v| {
                    v.phase = StepPhase::Failed {
                        failure: StepFailure::Worker { message },
                    }
                });
                self.end_cycle(cycle_id).await;
            }
            JobOutcome::Stale => {
                self.view.send_modify(|v| {
                    v.phase = StepPhase::Failed {
                        failure: StepFailure::Stale {
                            message: STALE_JOB_MESSAGE.to_string(),
                        },
                    }
                });
                self.end_cycle(cycle_id).await;
            }
        }
    }

    /// The report no longer has a job in flight.
    async fn release_report(&self, report_id: Option<DbId>) {
        let Some(report_id) = report_id else {
            return;
        };
        if let Err(e) = self
            .deps
            .reports
            .set_status(report_id, ReportStatus::Draft, None)
            .await
        {
            tracing::warn!(report_id, error = %e, "Failed to release report");
        }
    }

    async fn auto_advance(&self, project_id: DbId, cycle_id: u64) {
        let mut inner = self.inner.lock().await;
        if inner.cycle.as_ref().map(|c| c.id) != Some(cycle_id) {
            return;
        }
        inner.cycle = None;

        let Some(next) = self.step.next() else {
            return;
        };
        match self.deps.controller.position(project_id).await {
            Ok(WorkflowPosition::Active(step)) if step == self.step => {}
            Ok(position) => {
                tracing::info!(
                    project_id,
                    step = ?self.step,
                    position = ?position,
                    "Workflow moved on, skipping automatic step change",
                );
                return;
            }
            Err(e) => {
                tracing::error!(project_id, error = %e, "Failed to read workflow position");
                return;
            }
        }
        match self.deps.controller.advance(project_id, next).await {
            Ok(_) => {
                self.view
                    .send_modify(|v| v.phase = StepPhase::Advanced { step: next });
            }
            Err(e) => {
                tracing::error!(project_id, error = %e, "Automatic step change failed");
            }
        }
    }

    /// Cancel the active cycle and persist `step`, holding the cycle lock
    /// so a pending auto-advance cannot interleave.
    async fn move_to(&self, project_id: DbId, step: WorkflowStep) -> Result<(), CoordinatorError> {
        validate_step_transition(self.step.to_number(), step.to_number())?;

        let mut inner = self.inner.lock().await;
        if let Some(cycle) = inner.cycle.take() {
            tracing::info!(project_id, step = ?self.step, "Cancelling active cycle");
            cycle.cancel.cancel();
        }
        self.deps.controller.advance(project_id, step).await?;
        drop(inner);

        self.view
            .send_modify(|v| v.phase = StepPhase::Advanced { step });
        Ok(())
    }

    async fn cancel_cycle(&self) {
        if let Some(cycle) = self.inner.lock().await.cycle.take() {
            cycle.cancel.cancel();
        }
    }

    async fn end_cycle(&self, cycle_id: u64) {
        let mut inner = self.inner.lock().await;
        if inner.cycle.as_ref().map(|c| c.id) == Some(cycle_id) {
            inner.cycle = None;
        }
    }

    async fn refresh_summary(&self, project_id: DbId) {
        let files = self.deps.files.counts(project_id).await;
        let report = self.deps.reports.find_for_project(project_id).await;
        match (files, report) {
            (Ok(files), Ok(report)) => {
                self.view
                    .send_modify(|v| v.summary = Some(StepSummary { files, report }));
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(project_id, error = %e, "Failed to refresh step summary");
            }
        }
    }
}

/// Leave the workflow: park it on the sentinel step and, if asked,
/// publish the project's report unless a job is still writing it.
pub async fn leave_workflow(
    controller: &WorkflowController,
    reports: &dyn ReportStore,
    project_id: DbId,
    publish_report: bool,
) -> Result<(), CoordinatorError> {
    controller.exit(project_id).await?;

    if publish_report {
        if let Some(report) = reports.find_for_project(project_id).await? {
            if report.status != ReportStatus::Processing {
                reports
                    .set_status(report.id, ReportStatus::Published, None)
                    .await?;
            }
        }
    }
    Ok(())
}
