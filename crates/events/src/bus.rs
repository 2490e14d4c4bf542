//! Event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`; every subscriber receives
//! every [`PlatformEvent`] published after it subscribed.

use chrono::{DateTime, Utc};
use folio_core::job_events::{
    EVENT_JOB_COMPLETED, EVENT_JOB_FAILED, EVENT_JOB_STALE, EVENT_STEP_CHANGED,
};
use folio_core::progress::JobOutcome;
use folio_core::types::{DbId, JobId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// Something that happened in a project's workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"job.completed"`.
    pub event_type: String,

    /// Project the event belongs to.
    pub project_id: Option<DbId>,

    /// User whose action (or whose job) produced the event.
    pub actor_user_id: Option<DbId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    /// Create a new event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            project_id: None,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Event announcing how an observed job ended.
    pub fn job_finished(project_id: DbId, job_id: &JobId, outcome: &JobOutcome) -> Self {
        let event_type = match outcome {
            JobOutcome::Succeeded => EVENT_JOB_COMPLETED,
            JobOutcome::Failed { .. } => EVENT_JOB_FAILED,
            JobOutcome::Stale => EVENT_JOB_STALE,
        };
        let mut payload = serde_json::json!({ "job_id": job_id });
        if let JobOutcome::Failed { message } = outcome {
            payload["message"] = serde_json::Value::String(message.clone());
        }
        Self::new(event_type)
            .for_project(project_id)
            .with_payload(payload)
    }

    /// Event announcing a workflow step change; `to_step` 0 means exited.
    pub fn step_changed(project_id: DbId, from_step: Option<u8>, to_step: u8) -> Self {
        Self::new(EVENT_STEP_CHANGED)
            .for_project(project_id)
            .with_payload(serde_json::json!({
                "from_step": from_step,
                "to_step": to_step,
            }))
    }

    pub fn for_project(mut self, project_id: DbId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Attach the acting user to the event.
    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers that fall behind by more than `capacity` events
    /// observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: PlatformEvent) {
        tracing::debug!(
            event_type = %event.event_type,
            project_id = ?event.project_id,
            "Publishing event",
        );
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
