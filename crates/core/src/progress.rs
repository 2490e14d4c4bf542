//! Job progress records and the rules for reading them.
//!
//! Progress rows are append-only and may arrive duplicated or out of
//! order. [`ProgressState`] folds them into what a screen displays, and
//! [`completion`] decides whether a single record ends the job.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, JobId, Timestamp};

/// Progress written by the dispatcher before the worker is contacted.
pub const SEED_PROGRESS: i16 = 5;

/// Message on the seed record.
pub const SEED_MESSAGE: &str = "Starting…";

/// Upper bound for display progress.
pub const PROGRESS_MAX: i16 = 100;

/// Message surfaced when a job is abandoned by its worker.
pub const STALE_JOB_MESSAGE: &str = "Previous attempt timed out";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status column of a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Idle,
    Generating,
    Completed,
    Error,
}

impl ProgressStatus {
    /// Parse a status string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "idle" => Ok(Self::Idle),
            "generating" => Ok(Self::Generating),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(CoreError::Validation(format!(
                "Invalid progress status '{s}'. Must be one of: idle, generating, completed, error"
            ))),
        }
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One stored progress row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: DbId,
    pub job_id: JobId,
    pub status: ProgressStatus,
    pub message: String,
    pub progress: i16,
    pub created_at: Timestamp,
}

/// A progress row about to be appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProgressRecord {
    pub job_id: JobId,
    pub status: ProgressStatus,
    pub message: String,
    pub progress: i16,
}

impl NewProgressRecord {
    /// The `generating / 5% / "Starting…"` record every job begins with.
    pub fn seed(job_id: JobId) -> Self {
        Self {
            job_id,
            status: ProgressStatus::Generating,
            message: SEED_MESSAGE.to_string(),
            progress: SEED_PROGRESS,
        }
    }
}

/// Clamp a reported percentage into `0..=100`.
pub fn clamp_progress(progress: i32) -> i16 {
    progress.clamp(0, PROGRESS_MAX as i32) as i16
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How an observed job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed { message: String },
    /// No terminal signal arrived within the staleness window.
    Stale,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Whether a single record ends the job, and how.
///
/// A producer that reaches 100% without ever flipping the status to
/// `completed` still counts as finished.
pub fn completion(record: &ProgressRecord) -> Option<JobOutcome> {
    match record.status {
        ProgressStatus::Completed => Some(JobOutcome::Succeeded),
        ProgressStatus::Error => Some(JobOutcome::Failed {
            message: record.message.clone(),
        }),
        ProgressStatus::Generating if record.progress >= PROGRESS_MAX => {
            Some(JobOutcome::Succeeded)
        }
        ProgressStatus::Generating | ProgressStatus::Idle => None,
    }
}

// ---------------------------------------------------------------------------
// Display state
// ---------------------------------------------------------------------------

/// Normalized progress of one job as a screen shows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub status: ProgressStatus,
    pub message: String,
    pub progress: i16,
    pub updated_at: Option<Timestamp>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            status: ProgressStatus::Idle,
            message: String::new(),
            progress: 0,
            updated_at: None,
        }
    }
}

impl ProgressState {
    /// Fold a record into the state. Returns `true` if anything changed.
    ///
    /// Terminal states absorb everything after them, and the displayed
    /// percentage never moves backwards.
    pub fn apply(&mut self, record: &ProgressRecord) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        let before = self.clone();

        let reported = clamp_progress(record.progress as i32);
        self.progress = match record.status {
            ProgressStatus::Completed => PROGRESS_MAX,
            _ => self.progress.max(reported),
        };

        // A late `idle` row cannot pull a running job back to idle.
        if !(record.status == ProgressStatus::Idle && self.status == ProgressStatus::Generating) {
            self.status = record.status;
        }
        if self.status == ProgressStatus::Generating && self.progress >= PROGRESS_MAX {
            self.status = ProgressStatus::Completed;
        }

        if !record.message.is_empty() {
            self.message = record.message.clone();
        }

        // Only what is displayed counts as a change.
        let changed = self.status != before.status
            || self.message != before.message
            || self.progress != before.progress;
        if changed {
            self.updated_at = Some(
                self.updated_at
                    .map_or(record.created_at, |t| t.max(record.created_at)),
            );
        }
        changed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
