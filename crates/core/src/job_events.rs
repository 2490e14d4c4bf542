//! Event type names published on the event bus for workflow activity.

/// A job finished successfully.
pub const EVENT_JOB_COMPLETED: &str = "job.completed";

/// A job reported an error.
pub const EVENT_JOB_FAILED: &str = "job.failed";

/// A job was abandoned by its worker and reset.
pub const EVENT_JOB_STALE: &str = "job.stale";

/// A project's workflow moved to another step (or left the workflow).
pub const EVENT_STEP_CHANGED: &str = "workflow.step_changed";
