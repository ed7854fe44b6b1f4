//! Per-call options for repository operations.

use tablestore_core::expression::{FilterCondition, RangeKeyCondition};
use tablestore_core::Item;

/// Which version a save persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    /// Persist the model's current version.
    #[default]
    AsIs,
    /// Persist the current version plus one.
    Increment,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOptions {
    /// Write even when the model reports no changes.
    pub force: bool,
    /// Skip the optimistic-concurrency condition.
    pub force_version: bool,
    pub version_policy: VersionPolicy,
    /// Extra top-level attributes. Reserved names are rejected.
    pub custom_fields: Item,
}

impl SaveOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn increment() -> Self {
        Self {
            version_policy: VersionPolicy::Increment,
            ..Self::default()
        }
    }
}

/// Outcome of a save that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// Nothing to write; the store was not called.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOptions {
    /// Condition the stored row must satisfy.
    pub condition: Option<FilterCondition>,
    /// Delete only if the stored version equals this one.
    pub expect_version: Option<u64>,
}

/// Identity of a stored model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub hash_key: String,
    pub id: String,
}

impl ModelKey {
    pub fn new(hash_key: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            id: id.into(),
        }
    }
}

/// A partition query.
///
/// Without `index`, `range` literals are model ids and are matched against
/// the type-tagged sort key. With `index`, they are raw index values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub hash_key: String,
    /// Logical index name declared by the model.
    pub index: Option<String>,
    pub range: Option<RangeKeyCondition>,
    pub filter: Option<FilterCondition>,
    pub limit: Option<usize>,
    /// Continuation token from a previous page.
    pub token: Option<String>,
    pub scan_forward: Option<bool>,
    /// Overrides the configured read consistency.
    pub consistent_read: Option<bool>,
}

impl QueryOptions {
    pub fn new(hash_key: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            ..Self::default()
        }
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn range(mut self, range: RangeKeyCondition) -> Self {
        self.range = Some(range);
        self
    }

    pub fn filter(mut self, filter: Option<FilterCondition>) -> Self {
        self.filter = filter;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn scan_forward(mut self, scan_forward: bool) -> Self {
        self.scan_forward = Some(scan_forward);
        self
    }
}

/// A full-table scan, one store page at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOptions {
    pub filter: Option<FilterCondition>,
    /// Rows evaluated per store call; defaults to the configured page size.
    pub limit: Option<usize>,
    pub token: Option<String>,
    pub consistent_read: Option<bool>,
}
