//! Orchestrator tuning knobs.

use std::time::Duration;

use folio_worker::backoff::BackoffConfig;

/// Default staleness window: 15 minutes without a new progress record.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(15 * 60);

/// Default spacing of fallback polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of fallback polls before reporting a slow job.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Default pause between a successful job and the automatic step change.
pub const DEFAULT_ADVANCE_DELAY: Duration = Duration::from_secs(2);

/// Settings for one progress observation session.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// A job whose latest record is older than this is abandoned.
    pub stale_after: Duration,
    /// Interval of the polling fallback.
    pub poll_interval: Duration,
    /// Polls performed before the session reports a slow job and stops polling.
    pub max_poll_attempts: u32,
    /// Retry schedule for dropped push subscriptions.
    pub resubscribe: BackoffConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            resubscribe: BackoffConfig::default(),
        }
    }
}

/// Settings shared by the dispatcher, monitor and step coordinators.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub monitor: MonitorConfig,
    /// Pause that lets the user see a finished job before navigation.
    pub advance_delay: Duration,
    /// Base URL the worker posts progress to; the dispatcher appends
    /// `/jobs/{job}/progress`.
    pub callback_base_url: String,
    /// Route prefix of the workflow screens; navigation inside it is never guarded.
    pub workflow_route_prefix: String,
    /// Publish the project's report when the user confirms leaving.
    pub publish_report_on_leave: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            advance_delay: DEFAULT_ADVANCE_DELAY,
            callback_base_url: "http://localhost:3000/api/v1".to_string(),
            workflow_route_prefix: "/workflow".to_string(),
            publish_report_on_leave: true,
        }
    }
}
