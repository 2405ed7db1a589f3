//! In-process pub/sub for inter-agent events. Also the sink the WebSocket
//! fan-out drains via the wildcard subscription.

use crate::domain::events::AgentMessage;
use anyhow::Result;
use futures_util::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::error;

pub type HandlerFuture = BoxFuture<'static, Result<()>>;
pub type Handler = Arc<dyn Fn(AgentMessage) -> HandlerFuture + Send + Sync>;

const MAX_LOG_SIZE: usize = 1_000;
const TOPIC_ALL: &str = "*";

/// Token returned by subscribe, needed to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionId {
    topic: String,
    id: u64,
}

struct BusInner {
    subscribers: RwLock<HashMap<String, Vec<(u64, Handler)>>>,
    log: Mutex<VecDeque<AgentMessage>>,
    next_id: AtomicU64,
}

pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                log: Mutex::new(VecDeque::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe a handler to one topic.
    pub async fn subscribe(&self, topic: &str, handler: Handler) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let mut subscribers = self.inner.subscribers.write().await;
        subscribers
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        SubscriptionId {
            topic: topic.to_string(),
            id,
        }
    }

    /// Subscribe a handler to every topic.
    pub async fn subscribe_all(&self, handler: Handler) -> SubscriptionId {
        self.subscribe(TOPIC_ALL, handler).await
    }

    pub async fn unsubscribe(&self, subscription: &SubscriptionId) {
        let mut subscribers = self.inner.subscribers.write().await;
        if let Some(handlers) = subscribers.get_mut(&subscription.topic) {
            handlers.retain(|(id, _)| *id != subscription.id);
        }
    }

    /// Publish a message: append to the bounded log, then deliver to each
    /// subscriber in publish order. Handler failures are logged and never
    /// stall delivery to siblings.
    pub async fn publish(&self, message: AgentMessage) {
        {
            let mut log = self.inner.log.lock().await;
            log.push_back(message.clone());
            while log.len() > MAX_LOG_SIZE {
                log.pop_front();
            }
        }

        let handlers: Vec<Handler> = {
            let subscribers = self.inner.subscribers.read().await;
            let mut collected = Vec::new();
            if let Some(topic_handlers) = subscribers.get(&message.topic) {
                collected.extend(topic_handlers.iter().map(|(_, h)| h.clone()));
            }
            if let Some(wildcard) = subscribers.get(TOPIC_ALL) {
                collected.extend(wildcard.iter().map(|(_, h)| h.clone()));
            }
            collected
        };

        for handler in handlers {
            if let Err(e) = handler(message.clone()).await {
                error!("Handler error on topic '{}': {}", message.topic, e);
            }
        }
    }

    /// Build and publish a message in one call.
    pub async fn broadcast(&self, sender: &str, topic: &str, payload: serde_json::Value) {
        self.publish(AgentMessage::new(sender, topic, payload)).await;
    }

    /// Recent messages, optionally filtered by topic, oldest first.
    pub async fn get_recent_messages(
        &self,
        topic: Option<&str>,
        limit: usize,
    ) -> Vec<AgentMessage> {
        let log = self.inner.log.lock().await;
        let filtered: Vec<AgentMessage> = log
            .iter()
            .filter(|m| topic.is_none_or(|t| m.topic == t))
            .cloned()
            .collect();
        let start = filtered.len().saturating_sub(limit);
        filtered[start..].to_vec()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
