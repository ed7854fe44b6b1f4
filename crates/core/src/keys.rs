//! Key layout for the shared single table.
//!
//! Pure functions and constants describing where identity, indexes and state
//! live on a stored row. Several model types share one table; the sort key
//! carries an explicit type tag so rows can be told apart.

use std::fmt;

// ============================================================================
// Attribute names
// ============================================================================

pub const HASH_KEY: &str = "hk";
pub const RANGE_KEY: &str = "rk";
pub const TTL: &str = "ttl";
pub const STATE: &str = "state";
pub const VERSION: &str = "version";
pub const TIME: &str = "time";

/// Attributes owned by the engine. Custom fields may not use these names.
pub const RESERVED_ATTRIBUTES: [&str; 11] = [
    HASH_KEY, RANGE_KEY, TTL, STATE, VERSION, TIME, "index1", "index2", "index3", "index4",
    "index5",
];

/// Separator between the type tag and the id inside a sort key.
pub const TYPE_SEPARATOR: char = '-';

/// Returns the sort-key prefix shared by every row of `model_type`.
///
/// Pattern: `<model_type>-`
pub fn type_prefix(model_type: &str) -> String {
    format!("{model_type}{TYPE_SEPARATOR}")
}

/// Checks that a model type can be used as a sort-key tag.
pub fn is_valid_model_type(model_type: &str) -> bool {
    !model_type.is_empty() && !model_type.contains(TYPE_SEPARATOR)
}

// ============================================================================
// Sort key
// ============================================================================

/// A type-tagged sort key.
///
/// Pattern: `<model_type>-<id>`. The id may itself contain `-`; the tag may not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub model_type: String,
    pub id: String,
}

impl SortKey {
    pub fn new(model_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            id: id.into(),
        }
    }

    /// Splits a raw sort key on its first separator.
    pub fn parse(raw: &str) -> Option<Self> {
        let (model_type, id) = raw.split_once(TYPE_SEPARATOR)?;
        if model_type.is_empty() {
            return None;
        }
        Some(Self::new(model_type, id))
    }

    /// True if `raw` parses and carries the `model_type` tag.
    pub fn has_type(raw: &str, model_type: &str) -> bool {
        Self::parse(raw).is_some_and(|key| key.model_type == model_type)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{TYPE_SEPARATOR}{}", self.model_type, self.id)
    }
}

// ============================================================================
// Secondary indexes
// ============================================================================

/// One of the five generic index attributes.
///
/// Each slot is backed by a local secondary index of the same name keyed on
/// (`hk`, `indexN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexSlot {
    Index1,
    Index2,
    Index3,
    Index4,
    Index5,
}

impl IndexSlot {
    pub const ALL: [IndexSlot; 5] = [
        IndexSlot::Index1,
        IndexSlot::Index2,
        IndexSlot::Index3,
        IndexSlot::Index4,
        IndexSlot::Index5,
    ];

    /// Attribute holding the index value on the row.
    pub fn attribute_name(&self) -> &'static str {
        match self {
            IndexSlot::Index1 => "index1",
            IndexSlot::Index2 => "index2",
            IndexSlot::Index3 => "index3",
            IndexSlot::Index4 => "index4",
            IndexSlot::Index5 => "index5",
        }
    }

    /// Name of the store-side index over this attribute.
    pub fn index_name(&self) -> &'static str {
        self.attribute_name()
    }

    pub fn position(&self) -> usize {
        match self {
            IndexSlot::Index1 => 0,
            IndexSlot::Index2 => 1,
            IndexSlot::Index3 => 2,
            IndexSlot::Index4 => 3,
            IndexSlot::Index5 => 4,
        }
    }
}
