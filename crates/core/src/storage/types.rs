use crate::expression::{FilterCondition, KeyCondition};
use crate::keys::{IndexSlot, HASH_KEY, RANGE_KEY, TTL};
use crate::value::Item;

/// Maximum keys per batch read.
pub const BATCH_GET_LIMIT: usize = 100;

/// Maximum requests per batch write.
pub const BATCH_WRITE_LIMIT: usize = 25;

/// One store query call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    pub key_condition: KeyCondition,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
    pub consistent_read: bool,
}

impl QueryRequest {
    /// Request parameters for error reports.
    pub fn describe(&self) -> String {
        format!(
            "table={} index={} key={:?} partition={} filter={:?} limit={:?}",
            self.table_name,
            self.index_name.as_deref().unwrap_or("-"),
            self.key_condition.key_expression,
            self.key_condition.partition_value().unwrap_or("-"),
            self.key_condition.filter_expression,
            self.limit,
        )
    }
}

/// One store scan call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanRequest {
    pub table_name: String,
    pub filter: Option<FilterCondition>,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
    pub consistent_read: bool,
}

impl ScanRequest {
    pub fn describe(&self) -> String {
        format!(
            "table={} filter={:?} limit={:?}",
            self.table_name,
            self.filter.as_ref().map(|f| f.expression.as_str()),
            self.limit,
        )
    }
}

/// Rows returned by one query or scan call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOutput {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

/// One member of an all-or-nothing transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactWrite {
    Put {
        table_name: String,
        item: Item,
        condition: Option<FilterCondition>,
    },
    Delete {
        table_name: String,
        key: Item,
        condition: Option<FilterCondition>,
    },
}

/// One member of a non-transactional batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Item),
    Delete(Item),
}

/// A local secondary index sharing the table's partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIndex {
    pub index_name: String,
    pub range_key: String,
}

/// Physical table layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: String,
    pub hash_key: String,
    pub range_key: String,
    pub local_indexes: Vec<LocalIndex>,
    pub ttl_attribute: Option<String>,
}

impl TableSchema {
    /// The shared single-table layout: `hk`/`rk`, five local indexes, `ttl`.
    pub fn single_table(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            hash_key: HASH_KEY.to_string(),
            range_key: RANGE_KEY.to_string(),
            local_indexes: IndexSlot::ALL
                .iter()
                .map(|slot| LocalIndex {
                    index_name: slot.index_name().to_string(),
                    range_key: slot.attribute_name().to_string(),
                })
                .collect(),
            ttl_attribute: Some(TTL.to_string()),
        }
    }

    /// Sort attribute of the named index, or the table's own range key.
    pub fn range_key_for(&self, index_name: Option<&str>) -> Option<&str> {
        match index_name {
            None => Some(&self.range_key),
            Some(name) => self
                .local_indexes
                .iter()
                .find(|index| index.index_name == name)
                .map(|index| index.range_key.as_str()),
        }
    }
}
