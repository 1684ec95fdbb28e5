use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{Message, Subscription, Transport, client_id};
use crate::error::TransportError;

/// Exact-topic fan-out bus living inside the process.
///
/// Each subscription receives every message published on one of its topics
/// after it subscribed. Dropped subscriptions are pruned on the next publish.
#[derive(Debug)]
pub struct LocalBus {
    client_id: String,
    subscribers: Mutex<Vec<(Vec<String>, mpsc::UnboundedSender<Message>)>>,
}

impl LocalBus {
    /// Creates a bus with no subscribers and a generated `local-<hex>` client id.
    pub fn new() -> Self {
        Self::with_client_id(client_id("local"))
    }

    /// Creates a bus that tags its log records with `client_id`.
    pub fn with_client_id(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|e| TransportError::PublishFailure {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        subscribers.retain(|(_, tx)| !tx.is_closed());
        let mut delivered = 0_usize;
        for (topics, tx) in subscribers.iter() {
            if topics.iter().any(|t| t == topic) {
                let message = Message {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                };
                if tx.send(message).is_ok() {
                    delivered += 1;
                }
            }
        }
        trace!(client_id = %self.client_id, topic, delivered, "published");
        Ok(())
    }

    async fn subscribe(&self, topics: &[&str]) -> Result<Subscription, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|e| TransportError::SubscribeFailure {
                topic: topics.join(","),
                reason: e.to_string(),
            })?;
        subscribers.push((topics.iter().map(|t| t.to_string()).collect(), tx));
        debug!(client_id = %self.client_id, ?topics, "subscribed");
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_to_matching_topics() {
        let bus = LocalBus::new();
        let mut grid = bus.subscribe(&["grid/a", "grid/b"]).await.unwrap();
        let mut other = bus.subscribe(&["other"]).await.unwrap();

        bus.publish("grid/b", b"hello".to_vec()).await.unwrap();

        let msg = grid.try_recv().expect("grid subscriber should receive");
        assert_eq!(msg.topic, "grid/b");
        assert_eq!(msg.payload, b"hello");
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn bus_keeps_the_configured_client_id() {
        let bus = LocalBus::with_client_id("demand-response-1f");
        assert_eq!(bus.client_id(), "demand-response-1f");
        assert!(LocalBus::new().client_id().starts_with("local-"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = LocalBus::new();
        assert!(bus.publish("nobody", Vec::new()).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let bus = LocalBus::new();
        let sub = bus.subscribe(&["t"]).await.unwrap();
        drop(sub);
        bus.publish("t", Vec::new()).await.unwrap();
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }
}
