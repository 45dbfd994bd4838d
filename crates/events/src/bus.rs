//! [`PlatformEvent`] and the broadcast channel that fans it out inside one
//! process.

use chrono::{DateTime, Utc};
use pumpflix_core::channels::{channels_for_event, Channel};
use pumpflix_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::event_types::{ENTITY_EXECUTION, ENTITY_WORKFLOW};

/// Something that happened in an organization: a workflow changed, an
/// execution moved, a bill was paid. Travels over the bus, over Postgres
/// `NOTIFY` from the worker, and out to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"execution.succeeded"`.
    pub event_type: String,

    /// Organization the event belongs to. Events without one are never
    /// delivered to WebSocket clients.
    pub organization_id: Option<DbId>,

    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,
    pub actor_user_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data. A numeric
    /// `workflow_id` key routes the event to that workflow's channel too.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            organization_id: None,
            source_entity_type: None,
            source_entity_id: None,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_organization(mut self, organization_id: DbId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// WebSocket channels this event is delivered on.
    pub fn channels(&self) -> Vec<Channel> {
        let Some(org) = self.organization_id else {
            return Vec::new();
        };
        let source = |kind: &str| {
            (self.source_entity_type.as_deref() == Some(kind))
                .then_some(self.source_entity_id)
                .flatten()
        };
        let workflow_id = source(ENTITY_WORKFLOW)
            .or_else(|| self.payload.get("workflow_id").and_then(|v| v.as_i64()));
        channels_for_event(Some(org), workflow_id, source(ENTITY_EXECUTION))
    }
}

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast hub shared as `Arc<EventBus>`. A receiver that falls more
/// than `capacity` events behind loses the oldest ones and sees
/// `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self { sender: broadcast::Sender::new(capacity) }
    }

    /// Returns how many receivers got the event; zero is not an error.
    pub fn publish(&self, event: PlatformEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(event_type = %event.event_type, "No bus subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_types::{EXECUTION_SUCCEEDED, WORKFLOW_CREATED};

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            PlatformEvent::new(WORKFLOW_CREATED)
                .with_organization(3)
                .with_source(ENTITY_WORKFLOW, 42)
                .with_actor(7)
                .with_payload(serde_json::json!({"name": "Daily report"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, WORKFLOW_CREATED);
        assert_eq!(received.organization_id, Some(3));
        assert_eq!(received.source_entity_id, Some(42));
        assert_eq!(received.actor_user_id, Some(7));
        assert_eq!(received.payload["name"], "Daily report");
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let bus = EventBus::default();
        let mut persistence = bus.subscribe();
        let mut relay = bus.subscribe();

        assert_eq!(bus.publish(PlatformEvent::new(WORKFLOW_CREATED)), 2);
        assert_eq!(persistence.recv().await.unwrap().event_type, WORKFLOW_CREATED);
        assert_eq!(relay.recv().await.unwrap().event_type, WORKFLOW_CREATED);
    }

    #[test]
    fn publish_without_subscribers_reaches_nobody() {
        assert_eq!(EventBus::default().publish(PlatformEvent::new(WORKFLOW_CREATED)), 0);
    }

    #[test]
    fn execution_event_routes_to_org_workflow_and_execution() {
        let event = PlatformEvent::new(EXECUTION_SUCCEEDED)
            .with_organization(1)
            .with_source(ENTITY_EXECUTION, 99)
            .with_payload(serde_json::json!({ "workflow_id": 5 }));
        let names: Vec<String> = event.channels().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["org:1", "workflow:5", "execution:99"]);
    }

    #[test]
    fn events_without_organization_have_no_channels() {
        let event = PlatformEvent::new(WORKFLOW_CREATED).with_source(ENTITY_WORKFLOW, 1);
        assert!(event.channels().is_empty());
    }

    #[test]
    fn survives_json_round_trip() {
        let event = PlatformEvent::new(WORKFLOW_CREATED).with_organization(2);
        let text = serde_json::to_string(&event).unwrap();
        let back: PlatformEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
