//! In-process notification bus for workflow activity.
//!
//! - [`EventBus`]: publish/subscribe hub backed by `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the event envelope (type, project, actor, payload).
//! - [`EventLog`]: background subscriber writing every event to the log.
//!
//! Step coordinators publish job outcomes and step changes here; whatever
//! delivers notifications to users subscribes.

pub mod bus;
pub mod log;

pub use bus::{EventBus, PlatformEvent};
pub use log::EventLog;
