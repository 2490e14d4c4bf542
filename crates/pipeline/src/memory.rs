//! In-process store implementations.
//!
//! Used by the test suites and by the API when no database is
//! configured. [`MemoryProgressStore`] can also simulate an unreliable
//! push channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use folio_core::progress::{NewProgressRecord, ProgressRecord};
use folio_core::report::ReportStatus;
use folio_core::types::{DbId, JobId, Timestamp};
use folio_db::models::project_file::{FileCounts, ProjectFile};
use folio_db::models::workflow_state::WorkflowState;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};

use crate::store::{
    FileStore, ProgressFeed, ProgressStore, ReportInfo, ReportStore, StoreError, WorkflowStore,
};

const FEED_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum FeedSignal {
    Record(ProgressRecord),
    Disconnect,
}

/// Progress records held in memory with a broadcast-backed feed.
pub struct MemoryProgressStore {
    records: RwLock<Vec<ProgressRecord>>,
    next_id: AtomicI64,
    feed: broadcast::Sender<FeedSignal>,
    push_enabled: AtomicBool,
    failing_subscribes: AtomicU32,
    subscribe_calls: AtomicU32,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            feed,
            push_enabled: AtomicBool::new(true),
            failing_subscribes: AtomicU32::new(0),
            subscribe_calls: AtomicU32::new(0),
        }
    }

    /// Append a record with an explicit creation time.
    pub async fn append_at(&self, record: NewProgressRecord, created_at: Timestamp) -> ProgressRecord {
        let stored = ProgressRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            job_id: record.job_id,
            status: record.status,
            message: record.message,
            progress: record.progress,
            created_at,
        };
        self.records.write().await.push(stored.clone());
        if self.push_enabled.load(Ordering::SeqCst) {
            let _ = self.feed.send(FeedSignal::Record(stored.clone()));
        }
        stored
    }

    /// All records of a job in insertion order.
    pub async fn records(&self, job_id: &JobId) -> Vec<ProgressRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| &r.job_id == job_id)
            .cloned()
            .collect()
    }

    /// When disabled, appended records reach readers only through `latest`.
    pub fn set_push_enabled(&self, enabled: bool) {
        self.push_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Make the next `count` calls to `subscribe` fail.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.failing_subscribes.store(count, Ordering::SeqCst);
    }

    /// Break every open feed.
    pub fn disconnect_feeds(&self) {
        let _ = self.feed.send(FeedSignal::Disconnect);
    }

    /// Number of `subscribe` calls so far, failed ones included.
    pub fn subscribe_calls(&self) -> u32 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn latest(&self, job_id: &JobId) -> Result<Option<ProgressRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| &r.job_id == job_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn append(&self, record: NewProgressRecord) -> Result<ProgressRecord, StoreError> {
        Ok(self.append_at(record, Utc::now()).await)
    }

    async fn subscribe(&self, job_id: &JobId) -> Result<ProgressFeed, StoreError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Subscription("feed unavailable".to_string()));
        }

        let rx = self.feed.subscribe();
        let job_id = job_id.clone();
        let feed = futures::stream::unfold(Some(rx), move |state| {
            let job_id = job_id.clone();
            async move {
                let mut rx = state?;
                loop {
                    match rx.recv().await {
                        Ok(FeedSignal::Record(record)) if record.job_id == job_id => {
                            return Some((Ok(record), Some(rx)));
                        }
                        Ok(FeedSignal::Record(_)) | Err(RecvError::Lagged(_)) => continue,
                        Ok(FeedSignal::Disconnect) => {
                            let err = StoreError::Subscription("connection lost".to_string());
                            return Some((Err(err), None));
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(feed.boxed())
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Workflow rows keyed by project.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    rows: RwLock<HashMap<DbId, (WorkflowState, u64)>>,
    next_id: AtomicI64,
    touches: AtomicU64,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn find(&self, project_id: DbId) -> Result<Option<WorkflowState>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&project_id)
            .map(|(row, _)| row.clone()))
    }

    async fn upsert(
        &self,
        project_id: DbId,
        user_id: DbId,
        step: u8,
    ) -> Result<WorkflowState, StoreError> {
        let now = Utc::now();
        let touch = self.touches.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.write().await;
        let row = match rows.get(&project_id) {
            Some((existing, _)) => WorkflowState {
                user_id,
                step: i32::from(step),
                updated_at: now,
                ..existing.clone()
            },
            None => WorkflowState {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                project_id,
                user_id,
                step: i32::from(step),
                created_at: now,
                updated_at: now,
            },
        };
        rows.insert(project_id, (row.clone(), touch));
        Ok(row)
    }

    async fn latest_active_for_user(
        &self,
        user_id: DbId,
    ) -> Result<Option<WorkflowState>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|(row, _)| row.user_id == user_id && row.step > 0)
            .max_by_key(|(row, touch)| (row.updated_at, *touch))
            .map(|(row, _)| row.clone()))
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryReportStore {
    reports: RwLock<Vec<ReportInfo>>,
    next_id: AtomicI64,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a draft report for a project.
    pub async fn create(&self, project_id: DbId, title: &str) -> ReportInfo {
        let report = ReportInfo {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            project_id,
            title: title.to_string(),
            status: ReportStatus::Draft,
            active_job: None,
            generated_at: None,
        };
        self.reports.write().await.push(report.clone());
        report
    }

    /// Record that the worker produced the report body.
    pub async fn mark_generated(&self, report_id: DbId) {
        if let Some(report) = self.reports.write().await.iter_mut().find(|r| r.id == report_id) {
            report.generated_at = Some(Utc::now());
        }
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn find(&self, report_id: DbId) -> Result<Option<ReportInfo>, StoreError> {
        Ok(self
            .reports
            .read()
            .await
            .iter()
            .find(|r| r.id == report_id)
            .cloned())
    }

    async fn find_for_project(&self, project_id: DbId) -> Result<Option<ReportInfo>, StoreError> {
        Ok(self
            .reports
            .read()
            .await
            .iter()
            .filter(|r| r.project_id == project_id)
            .max_by_key(|r| r.id)
            .cloned())
    }

    async fn set_status(
        &self,
        report_id: DbId,
        status: ReportStatus,
        active_job: Option<&JobId>,
    ) -> Result<(), StoreError> {
        if let Some(report) = self.reports.write().await.iter_mut().find(|r| r.id == report_id) {
            report.status = status;
            report.active_job = active_job.cloned();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryFileStore {
    files: RwLock<Vec<ProjectFile>>,
    next_id: AtomicI64,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, project_id: DbId, file_name: &str, mime_type: &str) -> ProjectFile {
        let now = Utc::now();
        let file = ProjectFile {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            project_id,
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.files.write().await.push(file.clone());
        file
    }

    /// Flag every file of a project as analysed.
    pub async fn mark_all_processed(&self, project_id: DbId) {
        let now = Utc::now();
        for file in self.files.write().await.iter_mut() {
            if file.project_id == project_id {
                file.processed_at.get_or_insert(now);
            }
        }
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn unprocessed(&self, project_id: DbId) -> Result<Vec<ProjectFile>, StoreError> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .filter(|f| f.project_id == project_id && f.processed_at.is_none())
            .cloned()
            .collect())
    }

    async fn counts(&self, project_id: DbId) -> Result<FileCounts, StoreError> {
        let files = self.files.read().await;
        let mut counts = FileCounts::default();
        for file in files.iter().filter(|f| f.project_id == project_id) {
            counts.total += 1;
            if file.processed_at.is_some() {
                counts.processed += 1;
            }
            if file.mime_type.starts_with("image/") {
                counts.images += 1;
            }
        }
        Ok(counts)
    }

    async fn rename(
        &self,
        project_id: DbId,
        file_id: DbId,
        file_name: &str,
    ) -> Result<Option<ProjectFile>, StoreError> {
        let mut files = self.files.write().await;
        let file = files
            .iter_mut()
            .find(|f| f.id == file_id && f.project_id == project_id);
        Ok(file.map(|file| {
            file.file_name = file_name.to_string();
            file.updated_at = Utc::now();
            file.clone()
        }))
    }

    async fn delete(&self, project_id: DbId, file_id: DbId) -> Result<bool, StoreError> {
        let mut files = self.files.write().await;
        let before = files.len();
        files.retain(|f| !(f.id == file_id && f.project_id == project_id));
        Ok(files.len() < before)
    }
}
