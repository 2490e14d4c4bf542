//! `LISTEN/NOTIFY` feed of newly inserted progress records.
//!
//! An insert trigger on `progress_records` publishes
//! `{"id": .., "job_id": ..}` on [`PROGRESS_CHANNEL`]. A
//! [`ProgressListener`] keeps one dedicated connection listening on that
//! channel and yields the full rows belonging to a single job.

use folio_core::types::DbId;
use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::PgPool;

use crate::models::progress_record::ProgressRecordRow;
use crate::repositories::ProgressRecordRepo;

/// Notification channel written by the `progress_records` insert trigger.
pub const PROGRESS_CHANNEL: &str = "progress_records";

/// Payload of a progress notification.
#[derive(Debug, Deserialize)]
struct ProgressNotification {
    id: DbId,
    job_id: String,
}

/// Insert notifications for one job.
pub struct ProgressListener {
    listener: PgListener,
    pool: PgPool,
    job_id: String,
}

impl ProgressListener {
    /// Open a listening connection for `job_id`.
    pub async fn connect(pool: &PgPool, job_id: &str) -> Result<Self, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(PROGRESS_CHANNEL).await?;

        tracing::debug!(job_id, "Listening for progress records");

        Ok(Self {
            listener,
            pool: pool.clone(),
            job_id: job_id.to_string(),
        })
    }

    /// Wait for the next record inserted for this job.
    ///
    /// Notifications for other jobs and unparseable payloads are skipped.
    /// Errors mean the listening connection is gone.
    pub async fn recv(&mut self) -> Result<ProgressRecordRow, sqlx::Error> {
        loop {
            let notification = self.listener.recv().await?;

            let payload: ProgressNotification = match serde_json::from_str(notification.payload())
            {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        raw_payload = %notification.payload(),
                        "Failed to parse progress notification",
                    );
                    continue;
                }
            };

            if payload.job_id != self.job_id {
                continue;
            }

            match ProgressRecordRepo::find_by_id(&self.pool, payload.id).await? {
                Some(row) => return Ok(row),
                None => {
                    tracing::warn!(
                        job_id = %self.job_id,
                        record_id = payload.id,
                        "Notified progress record no longer exists",
                    );
                }
            }
        }
    }
}
