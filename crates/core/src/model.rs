//! The contract a domain type fulfils to be persisted.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::events::DomainEvent;
use crate::keys::IndexSlot;
use crate::record::{IndexData, VersionStamp};

/// A persistable aggregate or entity.
///
/// The serialized form of the model is stored as the row's `state`. Models
/// that return a [`VersionStamp`] are versioned: their saves are guarded by
/// an optimistic-concurrency condition on the stored version.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Sort-key type tag. Non-empty, without `-`.
    const MODEL_TYPE: &'static str;

    /// Logical index names mapped onto physical index slots.
    const INDEXES: &'static [(&'static str, IndexSlot)] = &[];

    /// Identity within the partition.
    fn id(&self) -> String;

    /// Partition and index values for the next write.
    fn index_data(&self) -> IndexData;

    /// Absolute expiry, overriding the table-wide default.
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// `Some` for versioned models.
    fn version_stamp(&self) -> Option<VersionStamp> {
        None
    }

    fn set_version_stamp(&mut self, _stamp: VersionStamp) {}

    /// Whether a save has anything to write. Unchanged models are skipped
    /// unless the save is forced.
    fn is_changed(&self) -> bool {
        true
    }

    /// Drains the events recorded since the last commit.
    fn take_events(&mut self) -> Vec<DomainEvent> {
        Vec::new()
    }

    fn to_state(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Rebuilds a model from its stored state and version columns.
    fn from_state(state: Value, stamp: Option<VersionStamp>) -> serde_json::Result<Self> {
        let mut model: Self = serde_json::from_value(state)?;
        if let Some(stamp) = stamp {
            model.set_version_stamp(stamp);
        }
        Ok(model)
    }
}
