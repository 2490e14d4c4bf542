#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use folio_core::progress::{NewProgressRecord, ProgressRecord, ProgressStatus};
use folio_core::types::JobId;
use folio_events::EventBus;
use folio_pipeline::config::OrchestratorConfig;
use folio_pipeline::coordinator::CoordinatorView;
use folio_pipeline::dispatcher::WorkerClient;
use folio_pipeline::memory::{
    MemoryFileStore, MemoryProgressStore, MemoryReportStore, MemoryWorkflowStore,
};
use folio_pipeline::monitor::{MonitorEvent, MonitorSession};
use folio_pipeline::store::ProgressStore;
use folio_pipeline::{Orchestrator, Stores};
use folio_worker::api::WorkerApiError;
use folio_worker::request::DispatchRequest;
use tokio::sync::{watch, Mutex};

/// Worker double that records every dispatch.
#[derive(Default)]
pub struct FakeWorker {
    pub requests: Mutex<Vec<DispatchRequest>>,
    reject: AtomicBool,
}

impl FakeWorker {
    pub fn reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub async fn dispatched(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn last_job(&self) -> JobId {
        self.requests
            .lock()
            .await
            .last()
            .map(|r| r.job.clone())
            .expect("no job dispatched")
    }
}

#[async_trait]
impl WorkerClient for FakeWorker {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), WorkerApiError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(WorkerApiError::Rejected {
                status: 503,
                body: "worker busy".into(),
            });
        }
        self.requests.lock().await.push(request.clone());
        Ok(())
    }
}

/// Orchestrator over in-memory stores, with typed handles to each store.
pub struct Harness {
    pub progress: Arc<MemoryProgressStore>,
    pub workflow: Arc<MemoryWorkflowStore>,
    pub reports: Arc<MemoryReportStore>,
    pub files: Arc<MemoryFileStore>,
    pub worker: Arc<FakeWorker>,
    pub events: Arc<EventBus>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let progress = Arc::new(MemoryProgressStore::new());
        let workflow = Arc::new(MemoryWorkflowStore::new());
        let reports = Arc::new(MemoryReportStore::new());
        let files = Arc::new(MemoryFileStore::new());
        let worker = Arc::new(FakeWorker::default());
        let events = Arc::new(EventBus::default());

        let stores = Stores {
            progress: progress.clone(),
            workflow: workflow.clone(),
            reports: reports.clone(),
            files: files.clone(),
        };
        let orchestrator = Orchestrator::new(stores, worker.clone(), events.clone(), config);

        Self {
            progress,
            workflow,
            reports,
            files,
            worker,
            events,
            orchestrator,
        }
    }
}

pub fn record(job: &JobId, status: ProgressStatus, progress: i16) -> NewProgressRecord {
    NewProgressRecord {
        job_id: job.clone(),
        status,
        message: format!("{} {progress}", status.as_str()),
        progress,
    }
}

/// Append a record the way the worker would.
pub async fn report(
    store: &MemoryProgressStore,
    job: &JobId,
    status: ProgressStatus,
    progress: i16,
) -> ProgressRecord {
    store
        .append(record(job, status, progress))
        .await
        .expect("append progress")
}

/// All remaining events of a session, until it ends.
pub async fn drain(session: &mut MonitorSession) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Some(event) = session.next_event().await {
        events.push(event);
    }
    events
}

/// Wait for the next event matching `pred`, skipping others.
pub async fn next_matching(
    session: &mut MonitorSession,
    pred: impl Fn(&MonitorEvent) -> bool,
) -> MonitorEvent {
    loop {
        let event = session.next_event().await.expect("session ended early");
        if pred(&event) {
            return event;
        }
    }
}

pub async fn wait_for_view(
    rx: &mut watch::Receiver<CoordinatorView>,
    pred: impl FnMut(&CoordinatorView) -> bool,
) -> CoordinatorView {
    rx.wait_for(pred).await.expect("coordinator dropped").clone()
}
