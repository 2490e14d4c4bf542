//! Job dispatcher.
//!
//! Mints a job id, seeds its first progress record and hands the job to
//! the external worker. The dispatcher never waits for the job; callers
//! observe it through [`crate::monitor::ProgressMonitor`].

use std::sync::Arc;

use async_trait::async_trait;
use folio_core::job::{JobKind, JobTarget};
use folio_core::progress::NewProgressRecord;
use folio_core::types::{DbId, JobId};
use folio_worker::api::{WorkerApi, WorkerApiError};
use folio_worker::request::DispatchRequest;

use crate::store::ProgressStore;

/// Outbound side of the worker protocol.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Hand a job over; resolves on the worker's acknowledgement.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), WorkerApiError>;
}

#[async_trait]
impl WorkerClient for WorkerApi {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), WorkerApiError> {
        WorkerApi::dispatch(self, request).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Worker dispatch failed: {0}")]
    Worker(#[from] WorkerApiError),
}

/// Who asked for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchContext {
    pub requested_by: DbId,
}

pub struct JobDispatcher {
    progress: Arc<dyn ProgressStore>,
    worker: Arc<dyn WorkerClient>,
    callback_base_url: String,
}

impl JobDispatcher {
    pub fn new(
        progress: Arc<dyn ProgressStore>,
        worker: Arc<dyn WorkerClient>,
        callback_base_url: String,
    ) -> Self {
        Self {
            progress,
            worker,
            callback_base_url: callback_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// URL the worker posts progress for `job` to.
    pub fn callback_url(&self, job: &JobId) -> String {
        format!("{}/jobs/{job}/progress", self.callback_base_url)
    }

    /// Start one job and return its id once the worker acknowledged it.
    ///
    /// A seed record (`generating`, 5%) is written before the worker is
    /// contacted. Failing to write it is logged and does not abort the
    /// dispatch; the monitor recreates it on first read.
    pub async fn dispatch(
        &self,
        kind: JobKind,
        target: &JobTarget,
        context: DispatchContext,
    ) -> Result<JobId, DispatchError> {
        let job = JobId::generate();

        if let Err(e) = self.progress.append(NewProgressRecord::seed(job.clone())).await {
            tracing::warn!(
                job_id = %job,
                error = %e,
                "Failed to write seed progress record",
            );
        }

        let request = DispatchRequest::new(kind, target, job.clone(), self.callback_url(&job));
        if let Err(e) = self.worker.dispatch(&request).await {
            tracing::error!(
                job_id = %job,
                kind = kind.as_str(),
                project_id = target.project_id,
                error = %e,
                "Worker dispatch failed",
            );
            return Err(e.into());
        }

        tracing::info!(
            job_id = %job,
            kind = kind.as_str(),
            project_id = target.project_id,
            requested_by = context.requested_by,
            mode = ?request.mode,
            "Job dispatched",
        );
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use folio_core::progress::{ProgressStatus, SEED_PROGRESS};
    use tokio::sync::Mutex;

    use crate::memory::MemoryProgressStore;

    #[derive(Default)]
    struct RecordingWorker {
        requests: Mutex<Vec<DispatchRequest>>,
        reject: bool,
    }

    #[async_trait]
    impl WorkerClient for RecordingWorker {
        async fn dispatch(&self, request: &DispatchRequest) -> Result<(), WorkerApiError> {
            self.requests.lock().await.push(request.clone());
            if self.reject {
                return Err(WorkerApiError::Rejected {
                    status: 500,
                    body: "down".into(),
                });
            }
            Ok(())
        }
    }

    fn target(name: &str) -> JobTarget {
        JobTarget {
            project_id: 4,
            report_id: Some(8),
            file_ids: vec![],
            name: name.into(),
        }
    }

    const CONTEXT: DispatchContext = DispatchContext { requested_by: 1 };

    #[tokio::test]
    async fn seeds_record_and_sends_request() {
        let store = Arc::new(MemoryProgressStore::new());
        let worker = Arc::new(RecordingWorker::default());
        let dispatcher = JobDispatcher::new(store.clone(), worker.clone(), "http://api/".into());

        let job = dispatcher
            .dispatch(JobKind::ReportGeneration, &target("Test run"), CONTEXT)
            .await
            .unwrap();

        let records = store.records(&job).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ProgressStatus::Generating);
        assert_eq!(records[0].progress, SEED_PROGRESS);

        let requests = worker.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].job, job);
        assert_eq!(requests[0].callback_url, format!("http://api/jobs/{job}/progress"));
        assert_eq!(requests[0].mode, folio_core::job::DispatchMode::Test);
    }

    #[tokio::test]
    async fn distinct_ids_per_dispatch() {
        let store = Arc::new(MemoryProgressStore::new());
        let worker = Arc::new(RecordingWorker::default());
        let dispatcher = JobDispatcher::new(store, worker, "http://api".into());

        let a = dispatcher
            .dispatch(JobKind::FileAnalysis, &target("A"), CONTEXT)
            .await
            .unwrap();
        let b = dispatcher
            .dispatch(JobKind::FileAnalysis, &target("A"), CONTEXT)
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn rejection_is_reported() {
        let store = Arc::new(MemoryProgressStore::new());
        let worker = Arc::new(RecordingWorker {
            reject: true,
            ..Default::default()
        });
        let dispatcher = JobDispatcher::new(store, worker, "http://api".into());

        let result = dispatcher
            .dispatch(JobKind::FileAnalysis, &target("A"), CONTEXT)
            .await;
        assert_matches!(
            result,
            Err(DispatchError::Worker(WorkerApiError::Rejected { status: 500, .. }))
        );
    }
}
