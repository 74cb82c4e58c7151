use crate::error::BroadcastError;
use crate::health::HealthState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Events fanned out to connected overlay viewers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OverlayEvent {
    /// The classified health state changed
    StateChanged { health_state: HealthState },
    /// A viewer command passed the dispatch gate
    CommandIssued { command: String },
}

impl OverlayEvent {
    /// Wire topic of the event, matching the overlay protocol
    pub fn topic(&self) -> &'static str {
        match self {
            OverlayEvent::StateChanged { .. } => "state-changed",
            OverlayEvent::CommandIssued { .. } => "command",
        }
    }

    /// JSON payload delivered to viewers
    pub fn payload(&self) -> serde_json::Value {
        match self {
            OverlayEvent::StateChanged { health_state } => {
                serde_json::json!({ "healthState": health_state })
            }
            OverlayEvent::CommandIssued { command } => {
                serde_json::json!({ "command": command })
            }
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            OverlayEvent::StateChanged { health_state } => {
                format!("Health state changed to {}", health_state)
            }
            OverlayEvent::CommandIssued { command } => {
                format!("Command issued: {}", command)
            }
        }
    }
}

/// Publish-only capability consumed by the screenshot pipeline and the
/// command dispatcher.
///
/// Delivery is best-effort and at-most-once; implementations must not block
/// indefinitely. Callers log failures and carry on.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, event: OverlayEvent) -> Result<(), BroadcastError>;
}

/// Async event bus fanning overlay events out to viewer streams
pub struct EventBus {
    sender: broadcast::Sender<OverlayEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<OverlayEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[async_trait]
impl Broadcaster for EventBus {
    async fn publish(&self, event: OverlayEvent) -> Result<(), BroadcastError> {
        match self.sender.send(event.clone()) {
            Ok(subscribers) => {
                info!(topic = event.topic(), subscribers, "{}", event.description());
                Ok(())
            }
            Err(_) => {
                // A send only fails when nobody is listening; the overlay
                // protocol is at-most-once, so a dropped event is not an error.
                debug!(topic = event.topic(), "event dropped: no subscribers");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = OverlayEvent::StateChanged {
            health_state: HealthState::Half,
        };

        event_bus.publish(event).await.unwrap();

        let received = receiver.recv().await.unwrap();
        match received {
            OverlayEvent::StateChanged { health_state } => {
                assert_eq!(health_state, HealthState::Half);
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        let event = OverlayEvent::CommandIssued {
            command: "heal".to_string(),
        };

        event_bus.publish(event).await.unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_best_effort() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());

        let event = OverlayEvent::CommandIssued {
            command: "run".to_string(),
        };

        // No viewers connected yet; the event is dropped, not an error
        assert!(event_bus.publish(event).await.is_ok());
    }

    #[test]
    fn test_event_topics_and_payloads() {
        let state_event = OverlayEvent::StateChanged {
            health_state: HealthState::Critical,
        };
        assert_eq!(state_event.topic(), "state-changed");
        assert_eq!(
            state_event.payload(),
            serde_json::json!({ "healthState": "CRITICAL" })
        );

        let command_event = OverlayEvent::CommandIssued {
            command: "crouch".to_string(),
        };
        assert_eq!(command_event.topic(), "command");
        assert_eq!(
            command_event.payload(),
            serde_json::json!({ "command": "crouch" })
        );
    }
}
