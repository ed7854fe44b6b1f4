//! DynamoDB store implementation.
//!
//! Implements the [`Store`] trait from `tablestore_core::storage` on top of
//! the AWS SDK.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, Delete, DeleteRequest, KeySchemaElement, KeyType,
    KeysAndAttributes, LocalSecondaryIndex, Projection, ProjectionType, Put, PutRequest,
    ScalarAttributeType, TableStatus, TimeToLiveSpecification, TransactWriteItem,
    WriteRequest as SdkWriteRequest,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info, warn};

use tablestore_core::expression::FilterCondition;
use tablestore_core::storage::{
    QueryOutput, QueryRequest, ScanRequest, Store, StoreError, StoreResult, TableSchema,
    TransactWrite, WriteRequest,
};
use tablestore_core::Item;

use super::client::{create_client, AwsConfig};
use super::conversions::{from_sdk_item, last_key, non_empty, to_sdk_item, SdkItem};
use super::error::{
    map_batch_get_error, map_batch_write_error, map_build_error, map_create_table_error,
    map_delete_table_error, map_describe_table_error, map_get_item_error, map_query_error,
    map_scan_error, map_transact_write_error, map_update_ttl_error,
};

/// Resubmits of unprocessed batch members before giving up.
const MAX_UNPROCESSED_ATTEMPTS: u32 = 8;

/// Table status polls while waiting for a new table.
const TABLE_ACTIVE_ATTEMPTS: u32 = 60;

const TABLE_ACTIVE_DELAY: Duration = Duration::from_secs(2);

/// DynamoDB-backed store.
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    client: Client,
}

impl DynamoDbStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a store from the given AWS configuration.
    pub async fn from_config(config: &AwsConfig) -> Self {
        Self::new(create_client(config).await)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn wait_for_table_active(&self, table_name: &str) -> StoreResult<()> {
        for _ in 0..TABLE_ACTIVE_ATTEMPTS {
            let output = self
                .client
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|e| map_describe_table_error(e, table_name))?;

            let status = output.table().and_then(|table| table.table_status());
            if status == Some(&TableStatus::Active) {
                return Ok(());
            }

            debug!(table = %table_name, status = ?status, "Waiting for table to become active");
            tokio::time::sleep(TABLE_ACTIVE_DELAY).await;
        }

        Err(StoreError::Unavailable(format!(
            "Timed out waiting for table {table_name} to become active"
        )))
    }

    async fn enable_ttl(&self, table_name: &str, attribute: &str) -> StoreResult<()> {
        let specification = TimeToLiveSpecification::builder()
            .attribute_name(attribute)
            .enabled(true)
            .build()
            .map_err(map_build_error)?;

        self.client
            .update_time_to_live()
            .table_name(table_name)
            .time_to_live_specification(specification)
            .send()
            .await
            .map_err(|e| map_update_ttl_error(e, table_name))?;

        Ok(())
    }
}

#[async_trait]
impl Store for DynamoDbStore {
    async fn get_item(
        &self,
        table_name: &str,
        key: &Item,
        consistent_read: bool,
    ) -> StoreResult<Option<Item>> {
        let result = self
            .client
            .get_item()
            .table_name(table_name)
            .set_key(Some(to_sdk_item(key.clone())))
            .consistent_read(consistent_read)
            .send()
            .await
            .map_err(|e| map_get_item_error(e, table_name))?;

        Ok(result.item.map(from_sdk_item))
    }

    async fn query(&self, request: &QueryRequest) -> StoreResult<QueryOutput> {
        let condition = request.key_condition.clone();

        let result = self
            .client
            .query()
            .table_name(&request.table_name)
            .set_index_name(request.index_name.clone())
            .key_condition_expression(condition.key_expression)
            .set_filter_expression(condition.filter_expression)
            .set_expression_attribute_names(non_empty(condition.names))
            .set_expression_attribute_values(non_empty(sdk_values(condition.values)))
            .set_scan_index_forward(condition.scan_forward)
            .set_limit(request.limit.map(sdk_limit))
            .set_exclusive_start_key(request.exclusive_start_key.clone().map(to_sdk_item))
            .consistent_read(request.consistent_read)
            .send()
            .await
            .map_err(|e| map_query_error(e, &request.table_name))?;

        Ok(QueryOutput {
            items: result
                .items
                .unwrap_or_default()
                .into_iter()
                .map(from_sdk_item)
                .collect(),
            last_evaluated_key: last_key(result.last_evaluated_key),
        })
    }

    async fn scan(&self, request: &ScanRequest) -> StoreResult<QueryOutput> {
        let (expression, names, values) = split_condition(request.filter.clone());

        let result = self
            .client
            .scan()
            .table_name(&request.table_name)
            .set_filter_expression(expression)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .set_limit(request.limit.map(sdk_limit))
            .set_exclusive_start_key(request.exclusive_start_key.clone().map(to_sdk_item))
            .consistent_read(request.consistent_read)
            .send()
            .await
            .map_err(|e| map_scan_error(e, &request.table_name))?;

        Ok(QueryOutput {
            items: result
                .items
                .unwrap_or_default()
                .into_iter()
                .map(from_sdk_item)
                .collect(),
            last_evaluated_key: last_key(result.last_evaluated_key),
        })
    }

    async fn transact_write(&self, writes: Vec<TransactWrite>) -> StoreResult<()> {
        let items = writes
            .into_iter()
            .map(transact_item)
            .collect::<StoreResult<Vec<_>>>()?;

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(map_transact_write_error)?;

        Ok(())
    }

    async fn batch_get(
        &self,
        table_name: &str,
        keys: Vec<Item>,
        consistent_read: bool,
    ) -> StoreResult<Vec<Item>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pending = Some(
            KeysAndAttributes::builder()
                .set_keys(Some(keys.into_iter().map(to_sdk_item).collect()))
                .consistent_read(consistent_read)
                .build()
                .map_err(map_build_error)?,
        );
        let mut found = Vec::new();
        let mut attempt = 0;

        while let Some(request) = pending.take() {
            if attempt > 0 {
                if attempt >= MAX_UNPROCESSED_ATTEMPTS {
                    return Err(StoreError::Throttled(format!(
                        "BatchGetItem left keys unprocessed after {attempt} attempts"
                    )));
                }
                warn!(table = %table_name, attempt, "Resubmitting unprocessed batch keys");
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let result = self
                .client
                .batch_get_item()
                .request_items(table_name, request)
                .send()
                .await
                .map_err(|e| map_batch_get_error(e, table_name))?;

            if let Some(mut responses) = result.responses {
                found.extend(
                    responses
                        .remove(table_name)
                        .unwrap_or_default()
                        .into_iter()
                        .map(from_sdk_item),
                );
            }

            pending = result
                .unprocessed_keys
                .and_then(|mut unprocessed| unprocessed.remove(table_name))
                .filter(|request| !request.keys().is_empty());
            attempt += 1;
        }

        Ok(found)
    }

    async fn batch_write(&self, table_name: &str, requests: Vec<WriteRequest>) -> StoreResult<()> {
        let mut pending = requests
            .into_iter()
            .map(sdk_write_request)
            .collect::<StoreResult<Vec<_>>>()?;
        let mut attempt = 0;

        while !pending.is_empty() {
            if attempt > 0 {
                if attempt >= MAX_UNPROCESSED_ATTEMPTS {
                    return Err(StoreError::Throttled(format!(
                        "BatchWriteItem left {} writes unprocessed after {attempt} attempts",
                        pending.len()
                    )));
                }
                warn!(
                    table = %table_name,
                    attempt,
                    remaining = pending.len(),
                    "Resubmitting unprocessed batch writes"
                );
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let result = self
                .client
                .batch_write_item()
                .request_items(table_name, std::mem::take(&mut pending))
                .send()
                .await
                .map_err(|e| map_batch_write_error(e, table_name))?;

            pending = result
                .unprocessed_items
                .and_then(|mut unprocessed| unprocessed.remove(table_name))
                .unwrap_or_default();
            attempt += 1;
        }

        Ok(())
    }

    async fn create_table(&self, schema: &TableSchema) -> StoreResult<()> {
        let table_name = schema.table_name.as_str();

        self.client
            .create_table()
            .table_name(table_name)
            .set_key_schema(Some(vec![
                key_schema_element(&schema.hash_key, KeyType::Hash)?,
                key_schema_element(&schema.range_key, KeyType::Range)?,
            ]))
            .set_attribute_definitions(Some(attribute_definitions(schema)?))
            .set_local_secondary_indexes(non_empty_vec(local_secondary_indexes(schema)?))
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| map_create_table_error(e, table_name))?;

        self.wait_for_table_active(table_name).await?;

        if let Some(attribute) = &schema.ttl_attribute {
            self.enable_ttl(table_name, attribute).await?;
        }

        info!(table = %table_name, "Table created");
        Ok(())
    }

    async fn delete_table(&self, table_name: &str) -> StoreResult<()> {
        self.client
            .delete_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| map_delete_table_error(e, table_name))?;

        info!(table = %table_name, "Table deleted");
        Ok(())
    }
}

// ============================================================================
// Request building
// ============================================================================

type SdkValues = SdkItem;

fn sdk_values(values: Item) -> SdkValues {
    to_sdk_item(values)
}

fn sdk_limit(limit: usize) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

/// Splits a filter into the optional expression parts the SDK setters take.
fn split_condition(
    condition: Option<FilterCondition>,
) -> (Option<String>, Option<HashMap<String, String>>, Option<SdkValues>) {
    match condition {
        Some(condition) => (
            Some(condition.expression),
            non_empty(condition.names),
            non_empty(sdk_values(condition.values)),
        ),
        None => (None, None, None),
    }
}

fn transact_item(write: TransactWrite) -> StoreResult<TransactWriteItem> {
    let item = match write {
        TransactWrite::Put {
            table_name,
            item,
            condition,
        } => {
            let (expression, names, values) = split_condition(condition);
            let put = Put::builder()
                .table_name(table_name)
                .set_item(Some(to_sdk_item(item)))
                .set_condition_expression(expression)
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values)
                .build()
                .map_err(map_build_error)?;
            TransactWriteItem::builder().put(put).build()
        }
        TransactWrite::Delete {
            table_name,
            key,
            condition,
        } => {
            let (expression, names, values) = split_condition(condition);
            let delete = Delete::builder()
                .table_name(table_name)
                .set_key(Some(to_sdk_item(key)))
                .set_condition_expression(expression)
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values)
                .build()
                .map_err(map_build_error)?;
            TransactWriteItem::builder().delete(delete).build()
        }
    };
    Ok(item)
}

fn sdk_write_request(request: WriteRequest) -> StoreResult<SdkWriteRequest> {
    let request = match request {
        WriteRequest::Put(item) => SdkWriteRequest::builder()
            .put_request(
                PutRequest::builder()
                    .set_item(Some(to_sdk_item(item)))
                    .build()
                    .map_err(map_build_error)?,
            )
            .build(),
        WriteRequest::Delete(key) => SdkWriteRequest::builder()
            .delete_request(
                DeleteRequest::builder()
                    .set_key(Some(to_sdk_item(key)))
                    .build()
                    .map_err(map_build_error)?,
            )
            .build(),
    };
    Ok(request)
}

fn key_schema_element(name: &str, key_type: KeyType) -> StoreResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(map_build_error)
}

/// Every key attribute is a string: the table keys and each index sort key.
fn attribute_definitions(schema: &TableSchema) -> StoreResult<Vec<AttributeDefinition>> {
    std::iter::once(schema.hash_key.as_str())
        .chain(std::iter::once(schema.range_key.as_str()))
        .chain(schema.local_indexes.iter().map(|index| index.range_key.as_str()))
        .map(|name| {
            AttributeDefinition::builder()
                .attribute_name(name)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(map_build_error)
        })
        .collect()
}

fn local_secondary_indexes(schema: &TableSchema) -> StoreResult<Vec<LocalSecondaryIndex>> {
    schema
        .local_indexes
        .iter()
        .map(|index| {
            LocalSecondaryIndex::builder()
                .index_name(&index.index_name)
                .set_key_schema(Some(vec![
                    key_schema_element(&schema.hash_key, KeyType::Hash)?,
                    key_schema_element(&index.range_key, KeyType::Range)?,
                ]))
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()
                .map_err(map_build_error)
        })
        .collect()
}

fn non_empty_vec<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// Exponential backoff starting at 50ms, capped at ~3.2s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(50u64 << attempt.min(6))
}
