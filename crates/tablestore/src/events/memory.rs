//! In-memory event publisher.
//!
//! Fans committed domain events out to subscribers using tokio broadcast
//! channels.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use tablestore_core::events::{DomainEvent, EventPublisher, Result};

/// Channel capacity for published events.
const CHANNEL_CAPACITY: usize = 100;

/// In-memory publisher.
///
/// One channel carries every event; each aggregate type additionally gets
/// its own channel, created on first use.
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    all: broadcast::Sender<DomainEvent>,
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<DomainEvent>>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        let (all, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            all,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Receives every published event.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.all.subscribe()
    }

    /// Receives the events of one aggregate type.
    pub async fn subscribe_to(&self, aggregate_type: &str) -> broadcast::Receiver<DomainEvent> {
        self.get_or_create_channel(aggregate_type).await.subscribe()
    }

    async fn get_or_create_channel(&self, aggregate_type: &str) -> broadcast::Sender<DomainEvent> {
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(aggregate_type) {
                return sender.clone();
            }
        }

        let mut channels = self.channels.write().await;

        // Double-check after acquiring write lock
        if let Some(sender) = channels.get(aggregate_type) {
            return sender.clone();
        }

        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(aggregate_type.to_string(), sender.clone());
        sender
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, events: &[DomainEvent]) -> Result<()> {
        for event in events {
            // No receivers is fine: nobody is listening yet.
            let _ = self.all.send(event.clone());

            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(&event.aggregate_type) {
                let _ = sender.send(event.clone());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(aggregate_type: &str, id: &str) -> DomainEvent {
        DomainEvent::new("Created", json!({"id": id})).stamped(aggregate_type, id, Some(1))
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let publisher = MemoryPublisher::new();
        let mut receiver = publisher.subscribe();

        publisher
            .publish(&[event("order", "o1"), event("customer", "c1")])
            .await
            .unwrap();

        assert_eq!(receiver.recv().await.unwrap().aggregate_id, "o1");
        assert_eq!(receiver.recv().await.unwrap().aggregate_id, "c1");
    }

    #[tokio::test]
    async fn test_subscribe_to_aggregate_type() {
        let publisher = MemoryPublisher::new();
        let mut orders = publisher.subscribe_to("order").await;
        let mut customers = publisher.subscribe_to("customer").await;

        publisher
            .publish(&[event("customer", "c1"), event("order", "o1")])
            .await
            .unwrap();

        assert_eq!(orders.recv().await.unwrap().aggregate_id, "o1");
        assert_eq!(customers.recv().await.unwrap().aggregate_id, "c1");
        assert!(orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let publisher = MemoryPublisher::new();
        let result = publisher.publish(&[event("order", "o1")]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_channel_reuse() {
        let publisher = MemoryPublisher::new();

        let _receiver1 = publisher.subscribe_to("order").await;
        let _receiver2 = publisher.subscribe_to("order").await;

        let channels = publisher.channels.read().await;
        assert_eq!(channels.len(), 1);
    }
}
