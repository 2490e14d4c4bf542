//! Wiring of stores, dispatcher, monitor and the per-project coordinators.

use std::collections::HashMap;
use std::sync::Arc;

use folio_core::progress::{clamp_progress, NewProgressRecord, ProgressRecord};
use folio_core::types::DbId;
use folio_core::workflow::WorkflowStep;
use folio_db::DbPool;
use folio_events::EventBus;
use tokio::sync::RwLock;

use crate::actions::ProjectFileActions;
use crate::config::OrchestratorConfig;
use crate::controller::WorkflowController;
use crate::coordinator::{CoordinatorDeps, CoordinatorError, StepCoordinator};
use crate::dispatcher::{JobDispatcher, WorkerClient};
use crate::guard::NavigationGuard;
use crate::memory::{MemoryFileStore, MemoryProgressStore, MemoryReportStore, MemoryWorkflowStore};
use crate::monitor::ProgressMonitor;
use crate::postgres::{PgFileStore, PgProgressStore, PgReportStore, PgWorkflowStore};
use crate::store::{FileStore, ProgressStore, ReportStore, StoreError, WorkflowStore};

/// The four stores the orchestrator works against.
#[derive(Clone)]
pub struct Stores {
    pub progress: Arc<dyn ProgressStore>,
    pub workflow: Arc<dyn WorkflowStore>,
    pub reports: Arc<dyn ReportStore>,
    pub files: Arc<dyn FileStore>,
}

impl Stores {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            progress: Arc::new(PgProgressStore::new(pool.clone())),
            workflow: Arc::new(PgWorkflowStore::new(pool.clone())),
            reports: Arc::new(PgReportStore::new(pool.clone())),
            files: Arc::new(PgFileStore::new(pool)),
        }
    }

    pub fn memory() -> Self {
        Self {
            progress: Arc::new(MemoryProgressStore::new()),
            workflow: Arc::new(MemoryWorkflowStore::new()),
            reports: Arc::new(MemoryReportStore::new()),
            files: Arc::new(MemoryFileStore::new()),
        }
    }
}

type CoordinatorKey = (DbId, DbId, WorkflowStep);

/// Long-lived orchestrator state shared by every request.
pub struct Orchestrator {
    stores: Stores,
    dispatcher: Arc<JobDispatcher>,
    monitor: Arc<ProgressMonitor>,
    events: Arc<EventBus>,
    config: OrchestratorConfig,
    coordinators: RwLock<HashMap<CoordinatorKey, Arc<StepCoordinator>>>,
    guards: RwLock<HashMap<(DbId, DbId), Arc<NavigationGuard>>>,
}

impl Orchestrator {
    pub fn new(
        stores: Stores,
        worker: Arc<dyn WorkerClient>,
        events: Arc<EventBus>,
        config: OrchestratorConfig,
    ) -> Self {
        let dispatcher = Arc::new(JobDispatcher::new(
            Arc::clone(&stores.progress),
            worker,
            config.callback_base_url.clone(),
        ));
        let monitor = Arc::new(ProgressMonitor::new(
            Arc::clone(&stores.progress),
            Arc::clone(&stores.reports),
            config.monitor.clone(),
        ));
        Self {
            stores,
            dispatcher,
            monitor,
            events,
            config,
            coordinators: RwLock::new(HashMap::new()),
            guards: RwLock::new(HashMap::new()),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn monitor(&self) -> &Arc<ProgressMonitor> {
        &self.monitor
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn controller(&self, user_id: DbId) -> Arc<WorkflowController> {
        Arc::new(WorkflowController::new(
            Arc::clone(&self.stores.workflow),
            Arc::clone(&self.events),
            user_id,
        ))
    }

    /// The coordinator of `step` for a user's project, created on first use.
    pub async fn coordinator(
        &self,
        user_id: DbId,
        project_id: DbId,
        step: WorkflowStep,
    ) -> Result<Arc<StepCoordinator>, CoordinatorError> {
        let key = (user_id, project_id, step);
        if let Some(existing) = self.coordinators.read().await.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let mut coordinators = self.coordinators.write().await;
        if let Some(existing) = coordinators.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let deps = CoordinatorDeps {
            controller: self.controller(user_id),
            dispatcher: Arc::clone(&self.dispatcher),
            monitor: Arc::clone(&self.monitor),
            files: Arc::clone(&self.stores.files),
            reports: Arc::clone(&self.stores.reports),
            events: Arc::clone(&self.events),
            advance_delay: self.config.advance_delay,
        };
        let coordinator = StepCoordinator::new(step, deps, Some(project_id))?;
        coordinators.insert(key, Arc::clone(&coordinator));
        Ok(coordinator)
    }

    /// The navigation guard of a user's project, created on first use.
    pub async fn guard(&self, user_id: DbId, project_id: DbId) -> Arc<NavigationGuard> {
        let mut guards = self.guards.write().await;
        let guard = guards.entry((user_id, project_id)).or_insert_with(|| {
            Arc::new(NavigationGuard::new(
                self.controller(user_id),
                Arc::clone(&self.stores.reports),
                project_id,
                self.config.workflow_route_prefix.clone(),
                self.config.publish_report_on_leave,
            ))
        });
        Arc::clone(guard)
    }

    /// File actions of a project, bound to its analysis coordinator.
    pub async fn file_actions(
        &self,
        user_id: DbId,
        project_id: DbId,
    ) -> Result<ProjectFileActions, CoordinatorError> {
        let analysis = self
            .coordinator(user_id, project_id, WorkflowStep::Analysis)
            .await?;
        Ok(ProjectFileActions::new(
            project_id,
            Arc::clone(&self.stores.files),
            analysis,
        ))
    }

    /// Drop the coordinators and guard of a project after it left the workflow.
    /// Active cycles are cancelled first so a late job success cannot move
    /// the project back into the workflow.
    pub async fn release_project(&self, user_id: DbId, project_id: DbId) {
        let released: Vec<Arc<StepCoordinator>> = {
            let mut coordinators = self.coordinators.write().await;
            let keys: Vec<CoordinatorKey> = coordinators
                .keys()
                .filter(|(user, project, _)| *user == user_id && *project == project_id)
                .copied()
                .collect();
            keys.iter()
                .filter_map(|key| coordinators.remove(key))
                .collect()
        };
        for coordinator in released {
            coordinator.shutdown().await;
        }
        self.guards.write().await.remove(&(user_id, project_id));
    }

    /// Store a progress record posted by the worker.
    pub async fn ingest_progress(
        &self,
        mut record: NewProgressRecord,
    ) -> Result<ProgressRecord, StoreError> {
        record.progress = clamp_progress(i32::from(record.progress));
        let stored = self.stores.progress.append(record).await?;
        tracing::debug!(
            job_id = %stored.job_id,
            status = stored.status.as_str(),
            progress = stored.progress,
            "Progress record ingested",
        );
        Ok(stored)
    }
}
