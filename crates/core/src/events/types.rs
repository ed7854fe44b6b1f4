use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PublishError;

/// Something that happened to an aggregate.
///
/// Models create events with [`DomainEvent::new`]; the repository fills in
/// `aggregate_type`, `aggregate_id` and `version` once the write commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub name: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            aggregate_type: String::new(),
            aggregate_id: String::new(),
            version: None,
            occurred_at: Utc::now(),
            payload,
        }
    }

    /// Binds the event to the aggregate whose write just committed.
    pub fn stamped(mut self, aggregate_type: &str, aggregate_id: &str, version: Option<u64>) -> Self {
        self.aggregate_type = aggregate_type.to_string();
        self.aggregate_id = aggregate_id.to_string();
        self.version = version;
        self
    }
}

/// Pending events held by an aggregate until its next save or delete.
///
/// Not serialized: embed it with `#[serde(skip)]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBuffer {
    events: Vec<DomainEvent>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    /// Records an event whose payload is any serializable value.
    pub fn record<P: Serialize>(&mut self, name: &str, payload: &P) -> Result<(), PublishError> {
        let payload =
            serde_json::to_value(payload).map_err(|e| PublishError::Serialization(e.to_string()))?;
        self.push(DomainEvent::new(name, payload));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainEvent> {
        self.events.iter()
    }

    /// Drains the buffer.
    pub fn take(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}
