//! Publish/subscribe of progress events scoped to a session id. Delivery
//! is best-effort and in-process only: a subscriber that isn't listening
//! when an event fires simply misses it, there is no durability.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub session_id: Uuid,
    pub name: &'static str,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

/// The nine event names the core emits, per the run lifecycle.
pub mod names {
    pub const AGENT_START: &str = "agent:start";
    pub const AGENT_PLANNING: &str = "agent:planning";
    pub const AGENT_PLAN_READY: &str = "agent:plan_ready";
    pub const AGENT_EXECUTING: &str = "agent:executing";
    pub const AGENT_REVIEWING: &str = "agent:reviewing";
    pub const AGENT_REVIEW_DONE: &str = "agent:review_done";
    pub const TOOL_EXECUTED: &str = "tool:executed";
    pub const AGENT_DONE: &str = "agent:done";
    pub const AGENT_ERROR: &str = "agent:error";
}

/// One broadcast channel per session id, created lazily on first publish
/// or subscribe.
#[derive(Default)]
pub struct EventBus {
    topics: RwLock<HashMap<Uuid, broadcast::Sender<AgentEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus { topics: RwLock::new(HashMap::new()) }
    }

    async fn sender(&self, session_id: Uuid) -> broadcast::Sender<AgentEvent> {
        if let Some(tx) = self.topics.read().await.get(&session_id) {
            return tx.clone();
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish never blocks: a channel with no subscribers simply drops
    /// the event.
    pub async fn publish(&self, session_id: Uuid, name: &'static str, payload: serde_json::Value) {
        let tx = self.sender(session_id).await;
        let _ = tx.send(AgentEvent { session_id, name, payload, emitted_at: Utc::now() });
    }

    pub async fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<AgentEvent> {
        self.sender(session_id).await.subscribe()
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn shared_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let session_id = Uuid::new_v4();
        let mut rx = bus.subscribe(session_id).await;

        bus.publish(session_id, names::AGENT_START, json!({"user_prompt": "hi"})).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, names::AGENT_START);
        assert_eq!(event.session_id, session_id);
    }

    #[tokio::test]
    async fn events_on_one_session_do_not_leak_into_another() {
        let bus = EventBus::new();
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();
        let mut rx_b = bus.subscribe(session_b).await;

        bus.publish(session_a, names::AGENT_DONE, json!({})).await;

        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::new();
        bus.publish(Uuid::new_v4(), names::AGENT_ERROR, json!({"message": "boom"})).await;
    }

    #[tokio::test]
    async fn events_are_delivered_in_publish_order() {
        let bus = EventBus::new();
        let session_id = Uuid::new_v4();
        let mut rx = bus.subscribe(session_id).await;

        bus.publish(session_id, names::AGENT_PLANNING, json!({})).await;
        bus.publish(session_id, names::AGENT_PLAN_READY, json!({})).await;

        assert_eq!(rx.recv().await.unwrap().name, names::AGENT_PLANNING);
        assert_eq!(rx.recv().await.unwrap().name, names::AGENT_PLAN_READY);
    }
}
