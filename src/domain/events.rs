use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transient envelope carried by the message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub sender: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Higher is more important. 0 for routine analysis events.
    pub priority: i32,
}

impl AgentMessage {
    pub fn new(sender: &str, topic: &str, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            topic: topic.to_string(),
            payload,
            timestamp: Utc::now(),
            priority: 0,
        }
    }
}
