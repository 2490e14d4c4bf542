//! Dispatch request payload.

use folio_core::job::{DispatchMode, JobKind, JobTarget};
use folio_core::types::{DbId, JobId};
use serde::Serialize;

/// Body of the request that hands a job to the worker.
///
/// The worker echoes `job` on every progress record it appends and may
/// post them to `callback_url`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRequest {
    pub kind: JobKind,
    pub project_id: DbId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<DbId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<DbId>,
    pub job: JobId,
    pub callback_url: String,
    pub mode: DispatchMode,
}

impl DispatchRequest {
    /// Build a request for `target`, deriving the mode from its name.
    pub fn new(kind: JobKind, target: &JobTarget, job: JobId, callback_url: String) -> Self {
        Self {
            kind,
            project_id: target.project_id,
            report_id: target.report_id,
            file_ids: target.file_ids.clone(),
            job,
            callback_url,
            mode: target.mode(),
        }
    }
}
