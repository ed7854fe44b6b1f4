//! Physical row layout.
//!
//! Converts between a model's persisted parts and the store-native [`Item`].
//! Pure functions only; the repository decides when to call them.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::keys::{
    IndexSlot, SortKey, HASH_KEY, RANGE_KEY, RESERVED_ATTRIBUTES, STATE, TIME, TTL, VERSION,
};
use crate::storage::{RepositoryError, Result};
use crate::value::{AttrValue, Item};

/// Optimistic-concurrency columns of a versioned model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionStamp {
    pub version: u64,
    /// Epoch seconds of the last mutation.
    pub time: i64,
}

impl VersionStamp {
    pub fn new(version: u64, time: i64) -> Self {
        Self { version, time }
    }
}

/// Partition and index values of a model, computed on every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexData {
    pub hash_key: String,
    indexes: [Option<String>; 5],
}

impl IndexData {
    pub fn new(hash_key: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            indexes: Default::default(),
        }
    }

    pub fn with_index(mut self, slot: IndexSlot, value: impl Into<String>) -> Self {
        self.indexes[slot.position()] = Some(value.into());
        self
    }

    pub fn with_optional_index(mut self, slot: IndexSlot, value: Option<impl Into<String>>) -> Self {
        self.indexes[slot.position()] = value.map(Into::into);
        self
    }

    pub fn get(&self, slot: IndexSlot) -> Option<&str> {
        self.indexes[slot.position()].as_deref()
    }
}

/// A stored row in typed form.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub index_data: IndexData,
    pub sort_key: SortKey,
    /// Epoch seconds; 0 means the row never expires.
    pub ttl: i64,
    pub state: Value,
    pub version: Option<VersionStamp>,
    /// Extra top-level attributes written next to the state.
    pub custom: Item,
}

impl Record {
    pub fn hash_key(&self) -> &str {
        &self.index_data.hash_key
    }

    /// Primary key of this row.
    pub fn key(&self) -> Item {
        primary_key(self.hash_key(), &self.sort_key)
    }

    /// Builds the store item.
    ///
    /// Custom fields are written first so the engine-owned attributes always
    /// win; naming a reserved attribute is rejected outright.
    pub fn to_item(&self) -> Result<Item> {
        validate_custom_fields(&self.custom)?;

        let mut item = self.custom.clone();
        item.insert(HASH_KEY.to_string(), AttrValue::S(self.hash_key().to_string()));
        item.insert(RANGE_KEY.to_string(), AttrValue::S(self.sort_key.to_string()));
        item.insert(TTL.to_string(), AttrValue::number(self.ttl));
        item.insert(STATE.to_string(), AttrValue::from_json(self.state.clone()));

        for slot in IndexSlot::ALL {
            if let Some(value) = self.index_data.get(slot) {
                item.insert(slot.attribute_name().to_string(), AttrValue::S(value.to_string()));
            }
        }

        if let Some(stamp) = self.version {
            item.insert(VERSION.to_string(), AttrValue::number(stamp.version));
            item.insert(TIME.to_string(), AttrValue::number(stamp.time));
        }

        Ok(item)
    }

    /// Reads a stored item back.
    pub fn from_item(mut item: Item) -> Result<Record> {
        let hash_key = take_string(&mut item, HASH_KEY)?;
        let raw_sort_key = take_string(&mut item, RANGE_KEY)?;
        let sort_key = SortKey::parse(&raw_sort_key).ok_or_else(|| {
            RepositoryError::CorruptRecord(format!("untagged sort key {raw_sort_key:?}"))
        })?;

        let state = item
            .remove(STATE)
            .ok_or_else(|| RepositoryError::CorruptRecord(format!("{raw_sort_key}: missing state")))?
            .into_json();

        let ttl = match item.remove(TTL) {
            Some(value) => value.as_i64().ok_or_else(|| {
                RepositoryError::CorruptRecord(format!("{raw_sort_key}: ttl is not a number"))
            })?,
            None => 0,
        };

        let version = match (item.remove(VERSION), item.remove(TIME)) {
            (Some(version), time) => Some(VersionStamp {
                version: version.as_u64().ok_or_else(|| {
                    RepositoryError::CorruptRecord(format!("{raw_sort_key}: bad version"))
                })?,
                time: time.and_then(|t| t.as_i64()).unwrap_or_default(),
            }),
            (None, _) => None,
        };

        let mut index_data = IndexData::new(hash_key);
        for slot in IndexSlot::ALL {
            if let Some(AttrValue::S(value)) = item.remove(slot.attribute_name()) {
                index_data = index_data.with_index(slot, value);
            }
        }

        Ok(Record {
            index_data,
            sort_key,
            ttl,
            state,
            version,
            custom: item,
        })
    }
}

/// Primary key item for `(hash_key, sort_key)`.
pub fn primary_key(hash_key: &str, sort_key: &SortKey) -> Item {
    Item::from([
        (HASH_KEY.to_string(), AttrValue::S(hash_key.to_string())),
        (RANGE_KEY.to_string(), AttrValue::S(sort_key.to_string())),
    ])
}

/// Expiry for a row written at `now`.
///
/// An explicit model expiry wins over the table-wide default; no expiry at
/// all yields 0.
pub fn compute_ttl(
    now: DateTime<Utc>,
    default_ttl_seconds: Option<u64>,
    expires_at: Option<DateTime<Utc>>,
) -> i64 {
    match (expires_at, default_ttl_seconds) {
        (Some(at), _) => at.timestamp(),
        (None, Some(seconds)) => now.timestamp().saturating_add_unsigned(seconds),
        (None, None) => 0,
    }
}

/// Rejects custom fields that would shadow engine-owned attributes.
pub fn validate_custom_fields(custom: &Item) -> Result<()> {
    match custom
        .keys()
        .find(|name| RESERVED_ATTRIBUTES.contains(&name.as_str()))
    {
        Some(name) => Err(RepositoryError::InvalidModel(format!(
            "custom field {name} uses a reserved attribute name"
        ))),
        None => Ok(()),
    }
}

fn take_string(item: &mut Item, attribute: &str) -> Result<String> {
    match item.remove(attribute) {
        Some(AttrValue::S(value)) => Ok(value),
        Some(_) => Err(RepositoryError::CorruptRecord(format!(
            "{attribute} is not a string"
        ))),
        None => Err(RepositoryError::CorruptRecord(format!("missing {attribute}"))),
    }
}
