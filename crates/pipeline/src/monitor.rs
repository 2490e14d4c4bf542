//! Progress monitor.
//!
//! Observes one job at a time per [`MonitorSession`]. Each session runs a
//! task that merges three sources of truth:
//!
//! - the push feed from [`ProgressStore::subscribe`], re-established with
//!   bounded exponential backoff when it drops,
//! - a polling fallback that re-reads the latest record every
//!   `poll_interval`, for at most `max_poll_attempts` polls,
//! - a staleness deadline that abandons the job when no record newer than
//!   `stale_after` exists.
//!
//! Whichever source first shows a terminal record ends the session. The
//! finished notification fires exactly once per session.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use folio_core::progress::{
    completion, JobOutcome, NewProgressRecord, ProgressRecord, ProgressState,
};
use folio_core::report::ReportStatus;
use folio_core::types::{DbId, JobId, Timestamp};
use folio_worker::backoff::Backoff;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::store::{ProgressFeed, ProgressStore, ReportStore, StoreError};

/// A job to observe and the report it runs against, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedJob {
    pub job_id: JobId,
    /// Archived when the job goes stale.
    pub report_id: Option<DbId>,
}

/// Notifications delivered to the observer of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// The display state changed.
    Update(ProgressState),
    /// The job ended. Delivered at most once and always last.
    Finished(JobOutcome),
    /// Polling budget exhausted while the job is still running.
    TakingLonger,
    /// Push updates could not be restored; polling and staleness still apply.
    SubscriptionLost,
}

/// One-shot flag guarding the finished notification.
#[derive(Debug, Default)]
pub struct CompletionLatch(AtomicBool);

impl CompletionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the first caller only.
    pub fn fire(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_fired(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Starts observation sessions.
pub struct ProgressMonitor {
    progress: Arc<dyn ProgressStore>,
    reports: Arc<dyn ReportStore>,
    config: MonitorConfig,
}

impl ProgressMonitor {
    pub fn new(
        progress: Arc<dyn ProgressStore>,
        reports: Arc<dyn ReportStore>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            progress,
            reports,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Begin observing `job`. Must be called inside a Tokio runtime.
    pub fn observe(&self, job: ObservedJob) -> MonitorSession {
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let job_id = job.job_id.clone();

        let task = SessionTask {
            stale_deadline: Instant::now() + self.config.stale_after,
            anchored: false,
            job,
            progress: Arc::clone(&self.progress),
            reports: Arc::clone(&self.reports),
            backoff: Backoff::new(self.config.resubscribe.clone()),
            config: self.config.clone(),
            cancel: cancel.clone(),
            events: events_tx,
            latch: CompletionLatch::new(),
            state: ProgressState::default(),
            seen: HashSet::new(),
            feed: None,
            resubscribe_at: None,
            polls: 0,
            polling: true,
        };
        tokio::spawn(task.run());

        MonitorSession {
            job_id,
            cancel,
            events: events_rx,
        }
    }
}

/// Handle to one observation. Dropping it unsubscribes.
pub struct MonitorSession {
    job_id: JobId,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<MonitorEvent>,
}

impl MonitorSession {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Next notification, or `None` once the session is finished or
    /// unsubscribed. Nothing is delivered after [`Self::unsubscribe`].
    pub async fn next_event(&mut self) -> Option<MonitorEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Stop observing. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(job_id = %self.job_id, "Progress session unsubscribed");
            self.cancel.cancel();
        }
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

struct SessionTask {
    job: ObservedJob,
    progress: Arc<dyn ProgressStore>,
    reports: Arc<dyn ReportStore>,
    config: MonitorConfig,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<MonitorEvent>,
    latch: CompletionLatch,
    state: ProgressState,
    /// Record ids already applied; push and poll deliver overlapping sets.
    seen: HashSet<DbId>,
    feed: Option<ProgressFeed>,
    backoff: Backoff,
    resubscribe_at: Option<Instant>,
    polls: u32,
    polling: bool,
    stale_deadline: Instant,
    /// Whether `stale_deadline` is derived from an actual record.
    anchored: bool,
}

impl SessionTask {
    async fn run(mut self) {
        tracing::debug!(job_id = %self.job.job_id, "Progress session started");

        // Subscribe before reading so nothing inserted in between is missed.
        self.connect().await;
        self.read_latest(true).await;

        let mut poll = time::interval_at(
            Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.latch.is_fired() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                item = next_record(&mut self.feed), if self.feed.is_some() => match item {
                    Some(Ok(record)) => self.handle_record(record).await,
                    Some(Err(e)) => self.feed_lost(Some(e)),
                    None => self.feed_lost(None),
                },
                _ = time::sleep_until(self.resubscribe_at.unwrap_or_else(Instant::now)),
                    if self.resubscribe_at.is_some() =>
                {
                    self.resubscribe_at = None;
                    self.connect().await;
                    if self.feed.is_some() {
                        self.read_latest(false).await;
                    }
                }
                _ = poll.tick(), if self.polling => self.poll().await,
                _ = time::sleep_until(self.stale_deadline) => self.finish(JobOutcome::Stale).await,
            }
        }

        tracing::debug!(job_id = %self.job.job_id, "Progress session ended");
    }

    async fn connect(&mut self) {
        match self.progress.subscribe(&self.job.job_id).await {
            Ok(feed) => {
                if self.backoff.attempts() > 0 {
                    tracing::info!(job_id = %self.job.job_id, "Progress feed restored");
                }
                self.feed = Some(feed);
                self.backoff.reset();
            }
            Err(e) => self.feed_lost(Some(e)),
        }
    }

    fn feed_lost(&mut self, error: Option<StoreError>) {
        self.feed = None;
        let error = error.map_or_else(|| "feed closed".to_string(), |e| e.to_string());

        match self.backoff.next() {
            Some(delay) => {
                tracing::warn!(
                    job_id = %self.job.job_id,
                    attempt = self.backoff.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Progress feed lost, resubscribing",
                );
                self.resubscribe_at = Some(Instant::now() + delay);
            }
            None => {
                tracing::warn!(
                    job_id = %self.job.job_id,
                    error = %error,
                    "Progress feed could not be restored",
                );
                self.emit(MonitorEvent::SubscriptionLost);
            }
        }
    }

    /// Apply the latest stored record. With `seed_if_missing`, a job with
    /// no records gets its seed record written now.
    async fn read_latest(&mut self, seed_if_missing: bool) {
        match self.progress.latest(&self.job.job_id).await {
            Ok(Some(record)) => self.handle_record(record).await,
            Ok(None) if seed_if_missing => {
                tracing::info!(job_id = %self.job.job_id, "No progress yet, writing seed record");
                let seed = NewProgressRecord::seed(self.job.job_id.clone());
                match self.progress.append(seed).await {
                    Ok(record) => self.handle_record(record).await,
                    Err(e) => tracing::warn!(
                        job_id = %self.job.job_id,
                        error = %e,
                        "Failed to write seed progress record",
                    ),
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(
                job_id = %self.job.job_id,
                error = %e,
                "Failed to read latest progress",
            ),
        }
    }

    async fn poll(&mut self) {
        self.polls += 1;
        self.read_latest(false).await;

        if !self.latch.is_fired() && self.polls >= self.config.max_poll_attempts {
            self.polling = false;
            tracing::info!(
                job_id = %self.job.job_id,
                polls = self.polls,
                "Job still running after polling budget",
            );
            self.emit(MonitorEvent::TakingLonger);
        }
    }

    async fn handle_record(&mut self, record: ProgressRecord) {
        if self.latch.is_fired() || !self.seen.insert(record.id) {
            return;
        }

        let deadline = self.deadline_after(record.created_at);
        if !self.anchored || deadline > self.stale_deadline {
            self.stale_deadline = deadline;
            self.anchored = true;
        }

        if self.state.apply(&record) {
            self.emit(MonitorEvent::Update(self.state.clone()));
        }

        if let Some(outcome) = completion(&record) {
            self.finish(outcome).await;
        }
    }

    /// Instant at which a job whose newest record is `created_at` goes stale.
    fn deadline_after(&self, created_at: Timestamp) -> Instant {
        let age = (Utc::now() - created_at).to_std().unwrap_or_default();
        Instant::now() + self.config.stale_after.saturating_sub(age)
    }

    async fn finish(&mut self, outcome: JobOutcome) {
        if !self.latch.fire() {
            return;
        }
        self.feed = None;
        self.polling = false;
        self.resubscribe_at = None;

        if outcome == JobOutcome::Stale {
            archive_report(self.reports.as_ref(), &self.job).await;
        }

        tracing::info!(job_id = %self.job.job_id, outcome = ?outcome, "Job finished");
        self.emit(MonitorEvent::Finished(outcome));
    }

    fn emit(&self, event: MonitorEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.events.send(event);
    }
}

/// Reset the report of a stale job so a fresh run can start.
async fn archive_report(reports: &dyn ReportStore, job: &ObservedJob) {
    let Some(report_id) = job.report_id else {
        return;
    };

    let report = match reports.find(report_id).await {
        Ok(Some(report)) => report,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(report_id, error = %e, "Failed to load report of stale job");
            return;
        }
    };
    if report
        .active_job
        .as_ref()
        .is_some_and(|active| active != &job.job_id)
    {
        tracing::debug!(report_id, "Report already runs another job, not archiving");
        return;
    }

    if let Err(e) = reports
        .set_status(report_id, ReportStatus::Archived, None)
        .await
    {
        tracing::error!(report_id, error = %e, "Failed to archive report of stale job");
    }
}

async fn next_record(feed: &mut Option<ProgressFeed>) -> Option<Result<ProgressRecord, StoreError>> {
    match feed {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::{MemoryProgressStore, MemoryReportStore};

    use super::*;

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn latch_fires_once() {
        let latch = CompletionLatch::new();
        assert!(!latch.is_fired());
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.is_fired());
    }

    #[tokio::test]
    async fn session_task_can_be_spawned() {
        let (events, _rx) = mpsc::unbounded_channel();
        let config = MonitorConfig::default();
        let task = SessionTask {
            job: ObservedJob {
                job_id: JobId::generate(),
                report_id: Some(1),
            },
            progress: Arc::new(MemoryProgressStore::new()),
            reports: Arc::new(MemoryReportStore::new()),
            backoff: Backoff::new(config.resubscribe.clone()),
            config,
            cancel: CancellationToken::new(),
            events,
            latch: CompletionLatch::new(),
            state: ProgressState::default(),
            seen: HashSet::new(),
            feed: None,
            resubscribe_at: None,
            polls: 0,
            polling: true,
            stale_deadline: Instant::now(),
            anchored: false,
        };

        let run = task.run();
        assert_send(&run);
    }
}
