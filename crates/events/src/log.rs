//! Event log service.
//!
//! [`EventLog`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! writes every [`PlatformEvent`] to the tracing output, which is where
//! notification delivery picks them up. It runs as a background task and
//! stops when the bus sender is dropped.

use tokio::sync::broadcast;

use crate::bus::PlatformEvent;

pub struct EventLog;

impl EventLog {
    /// Run the log loop until the channel closes. Returns the number of
    /// events written.
    pub async fn run(mut receiver: broadcast::Receiver<PlatformEvent>) -> u64 {
        let mut written = 0;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    tracing::info!(
                        event_type = %event.event_type,
                        project_id = ?event.project_id,
                        actor_user_id = ?event.actor_user_id,
                        payload = %event.payload,
                        "Platform event",
                    );
                    written += 1;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event log lagged, some events were not written");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event log shutting down");
                    break;
                }
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;

    #[tokio::test]
    async fn stops_when_bus_is_dropped() {
        let bus = EventBus::default();
        let handle = tokio::spawn(EventLog::run(bus.subscribe()));

        bus.publish(PlatformEvent::new("workflow.step_changed").for_project(3));
        bus.publish(PlatformEvent::new("job.completed"));
        drop(bus);

        assert_eq!(handle.await.unwrap(), 2);
    }
}
