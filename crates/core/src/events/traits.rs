use async_trait::async_trait;

use super::{DomainEvent, Result};

/// Sink for the events an aggregate buffered before a committed write.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one aggregate's pending events as a single batch.
    async fn publish(&self, events: &[DomainEvent]) -> Result<()>;
}
