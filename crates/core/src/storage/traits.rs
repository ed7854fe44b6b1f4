use async_trait::async_trait;

use crate::value::Item;

use super::{QueryOutput, QueryRequest, ScanRequest, StoreResult, TableSchema, TransactWrite, WriteRequest};

/// The backing wide-column store.
///
/// Implementations apply a query's `limit` before its filter expression, the
/// way the real store does, and report a continuation key whenever more rows
/// may follow.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads one item by primary key.
    async fn get_item(&self, table_name: &str, key: &Item, consistent_read: bool)
        -> StoreResult<Option<Item>>;

    /// Runs one partition query call.
    async fn query(&self, request: &QueryRequest) -> StoreResult<QueryOutput>;

    /// Runs one scan call.
    async fn scan(&self, request: &ScanRequest) -> StoreResult<QueryOutput>;

    /// Commits every write or none of them.
    async fn transact_write(&self, writes: Vec<TransactWrite>) -> StoreResult<()>;

    /// Reads up to [`BATCH_GET_LIMIT`](super::BATCH_GET_LIMIT) keys. Missing keys are omitted.
    async fn batch_get(
        &self,
        table_name: &str,
        keys: Vec<Item>,
        consistent_read: bool,
    ) -> StoreResult<Vec<Item>>;

    /// Applies up to [`BATCH_WRITE_LIMIT`](super::BATCH_WRITE_LIMIT) unconditional writes.
    async fn batch_write(&self, table_name: &str, requests: Vec<WriteRequest>) -> StoreResult<()>;

    async fn create_table(&self, schema: &TableSchema) -> StoreResult<()>;

    async fn delete_table(&self, table_name: &str) -> StoreResult<()>;
}
