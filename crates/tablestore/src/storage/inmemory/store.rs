//! In-memory store implementation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use tablestore_core::keys::{HASH_KEY, RANGE_KEY};
use tablestore_core::storage::{
    QueryOutput, QueryRequest, ScanRequest, Store, StoreError, StoreResult, TableSchema,
    TransactWrite, WriteRequest, BATCH_GET_LIMIT, BATCH_WRITE_LIMIT,
};
use tablestore_core::{AttrValue, Item};

use super::expression::Condition;

/// Maximum members of one transaction.
const TRANSACT_LIMIT: usize = 100;

type PrimaryKey = (String, String);

#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    items: BTreeMap<PrimaryKey, Item>,
}

/// In-memory store for tests and local development.
///
/// Tables live in a `BTreeMap` keyed by `(hash, range)` behind
/// `Arc<RwLock<_>>`. Query and scan apply `limit` before the filter
/// expression and report a continuation key whenever the limit is reached,
/// like the real store. Transactions check every condition under the write
/// lock before applying anything.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl InMemoryStore {
    /// Creates an empty store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds an empty table for `schema`.
    pub fn with_table(schema: TableSchema) -> Self {
        let tables = HashMap::from([(
            schema.table_name.clone(),
            Table {
                schema,
                items: BTreeMap::new(),
            },
        )]);
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Number of rows in `table_name`.
    pub async fn len(&self, table_name: &str) -> usize {
        let tables = self.tables.read().await;
        tables.get(table_name).map_or(0, |table| table.items.len())
    }

    pub async fn is_empty(&self, table_name: &str) -> bool {
        self.len(table_name).await == 0
    }
}

fn table<'a>(tables: &'a HashMap<String, Table>, name: &str) -> StoreResult<&'a Table> {
    tables
        .get(name)
        .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
}

fn table_mut<'a>(tables: &'a mut HashMap<String, Table>, name: &str) -> StoreResult<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
}

fn primary_key(schema: &TableSchema, item: &Item) -> StoreResult<PrimaryKey> {
    let part = |attribute: &str| match item.get(attribute) {
        Some(AttrValue::S(value)) => Ok(value.clone()),
        Some(_) => Err(StoreError::Validation(format!("{attribute} must be a string"))),
        None => Err(StoreError::Validation(format!("missing key attribute {attribute}"))),
    };
    Ok((part(&schema.hash_key)?, part(&schema.range_key)?))
}

/// Checks index key attributes on a row about to be written.
fn validate_item(schema: &TableSchema, item: &Item) -> StoreResult<PrimaryKey> {
    let key = primary_key(schema, item)?;
    for index in &schema.local_indexes {
        match item.get(&index.range_key) {
            None | Some(AttrValue::S(_)) => {}
            Some(_) => {
                return Err(StoreError::Validation(format!(
                    "index key {} must be a string",
                    index.range_key
                )))
            }
        }
    }
    Ok(key)
}

fn key_of(item: &Item, attributes: &[&str]) -> Item {
    attributes
        .iter()
        .filter_map(|name| item.get(*name).map(|value| (name.to_string(), value.clone())))
        .collect()
}

fn parse_filter(
    expression: Option<&str>,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttrValue>,
) -> StoreResult<Option<Condition>> {
    expression
        .map(|expression| Condition::parse(expression, names, values))
        .transpose()
}

/// Orders rows by sort attribute, then by primary range key.
fn position_cmp(a: (&AttrValue, &str), b: (&AttrValue, &str)) -> Ordering {
    a.0.compare(b.0)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.1.cmp(b.1))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_item(
        &self,
        table_name: &str,
        key: &Item,
        _consistent_read: bool,
    ) -> StoreResult<Option<Item>> {
        let tables = self.tables.read().await;
        let table = table(&tables, table_name)?;
        let key = primary_key(&table.schema, key)?;
        Ok(table.items.get(&key).cloned())
    }

    async fn query(&self, request: &QueryRequest) -> StoreResult<QueryOutput> {
        let tables = self.tables.read().await;
        let table = table(&tables, &request.table_name)?;
        let schema = &table.schema;
        let condition = &request.key_condition;

        let sort_attr = schema
            .range_key_for(request.index_name.as_deref())
            .ok_or_else(|| {
                StoreError::Validation(format!(
                    "unknown index {}",
                    request.index_name.as_deref().unwrap_or_default()
                ))
            })?
            .to_string();

        let key_condition = Condition::parse(
            &condition.key_expression,
            &condition.names,
            &condition.values,
        )?;
        let filter = parse_filter(
            condition.filter_expression.as_deref(),
            &condition.names,
            &condition.values,
        )?;

        // Rows without the index attribute are not part of the index.
        let mut candidates: Vec<(&AttrValue, &str, &Item)> = table
            .items
            .iter()
            .filter(|(_, item)| key_condition.matches(item))
            .filter_map(|((_, range), item)| {
                item.get(&sort_attr)
                    .map(|sort| (sort, range.as_str(), item))
            })
            .collect();

        let forward = condition.scan_forward.unwrap_or(true);
        candidates.sort_by(|a, b| {
            let ordering = position_cmp((a.0, a.1), (b.0, b.1));
            if forward {
                ordering
            } else {
                ordering.reverse()
            }
        });

        if let Some(start) = &request.exclusive_start_key {
            let start_sort = start.get(&sort_attr).ok_or_else(|| {
                StoreError::Validation(format!("exclusive start key lacks {sort_attr}"))
            })?;
            let start_range = match start.get(RANGE_KEY) {
                Some(AttrValue::S(range)) => range.as_str(),
                _ => {
                    return Err(StoreError::Validation(
                        "exclusive start key lacks a string range key".to_string(),
                    ))
                }
            };
            candidates.retain(|(sort, range, _)| {
                let ordering = position_cmp((*sort, *range), (start_sort, start_range));
                if forward {
                    ordering == Ordering::Greater
                } else {
                    ordering == Ordering::Less
                }
            });
        }

        let limit = request.limit.unwrap_or(usize::MAX).max(1);
        let evaluated: Vec<&Item> = candidates
            .iter()
            .take(limit)
            .map(|(_, _, item)| *item)
            .collect();

        let mut key_attributes = vec![HASH_KEY, RANGE_KEY];
        if request.index_name.is_some() {
            key_attributes.push(sort_attr.as_str());
        }
        let last_evaluated_key = match evaluated.last() {
            Some(last) if evaluated.len() == limit => Some(key_of(last, &key_attributes)),
            _ => None,
        };

        let items = evaluated
            .into_iter()
            .filter(|item| filter.as_ref().is_none_or(|f| f.matches(item)))
            .cloned()
            .collect();

        Ok(QueryOutput {
            items,
            last_evaluated_key,
        })
    }

    async fn scan(&self, request: &ScanRequest) -> StoreResult<QueryOutput> {
        let tables = self.tables.read().await;
        let table = table(&tables, &request.table_name)?;

        let filter = match &request.filter {
            Some(filter) => Some(Condition::parse(
                &filter.expression,
                &filter.names,
                &filter.values,
            )?),
            None => None,
        };

        let start = match &request.exclusive_start_key {
            Some(key) => Some(primary_key(&table.schema, key)?),
            None => None,
        };

        let limit = request.limit.unwrap_or(usize::MAX).max(1);
        let evaluated: Vec<(&PrimaryKey, &Item)> = table
            .items
            .iter()
            .filter(|(key, _)| start.as_ref().is_none_or(|start| *key > start))
            .take(limit)
            .collect();

        let last_evaluated_key = match evaluated.last() {
            Some((_, last)) if evaluated.len() == limit => {
                Some(key_of(last, &[HASH_KEY, RANGE_KEY]))
            }
            _ => None,
        };

        let items = evaluated
            .into_iter()
            .map(|(_, item)| item)
            .filter(|item| filter.as_ref().is_none_or(|f| f.matches(item)))
            .cloned()
            .collect();

        Ok(QueryOutput {
            items,
            last_evaluated_key,
        })
    }

    async fn transact_write(&self, writes: Vec<TransactWrite>) -> StoreResult<()> {
        if writes.is_empty() || writes.len() > TRANSACT_LIMIT {
            return Err(StoreError::Validation(format!(
                "transactions take 1 to {TRANSACT_LIMIT} writes, got {}",
                writes.len()
            )));
        }

        let mut tables = self.tables.write().await;

        // Resolve and check everything before touching any row.
        let mut seen = HashSet::new();
        let mut reasons = Vec::with_capacity(writes.len());
        let mut planned = Vec::with_capacity(writes.len());
        for write in &writes {
            let (table_name, key, item, condition) = match write {
                TransactWrite::Put {
                    table_name,
                    item,
                    condition,
                } => {
                    let schema = &table(&tables, table_name)?.schema;
                    (table_name, validate_item(schema, item)?, Some(item), condition)
                }
                TransactWrite::Delete {
                    table_name,
                    key,
                    condition,
                } => {
                    let schema = &table(&tables, table_name)?.schema;
                    (table_name, primary_key(schema, key)?, None, condition)
                }
            };

            if !seen.insert((table_name.clone(), key.clone())) {
                return Err(StoreError::Validation(
                    "transaction touches the same item twice".to_string(),
                ));
            }

            let passed = match condition {
                Some(condition) => {
                    let parsed =
                        Condition::parse(&condition.expression, &condition.names, &condition.values)?;
                    let empty = Item::new();
                    let current = table(&tables, table_name)?
                        .items
                        .get(&key)
                        .unwrap_or(&empty);
                    parsed.matches(current)
                }
                None => true,
            };
            reasons.push(if passed { "None" } else { "ConditionalCheckFailed" }.to_string());
            planned.push((table_name.clone(), key, item.cloned()));
        }

        if reasons.iter().any(|reason| reason != "None") {
            return Err(StoreError::TransactionCanceled { reasons });
        }

        for (table_name, key, item) in planned {
            let table = table_mut(&mut tables, &table_name)?;
            match item {
                Some(item) => {
                    table.items.insert(key, item);
                }
                None => {
                    table.items.remove(&key);
                }
            }
        }

        Ok(())
    }

    async fn batch_get(
        &self,
        table_name: &str,
        keys: Vec<Item>,
        _consistent_read: bool,
    ) -> StoreResult<Vec<Item>> {
        if keys.len() > BATCH_GET_LIMIT {
            return Err(StoreError::Validation(format!(
                "batch get takes at most {BATCH_GET_LIMIT} keys, got {}",
                keys.len()
            )));
        }

        let tables = self.tables.read().await;
        let table = table(&tables, table_name)?;

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(keys.len());
        for key in &keys {
            let key = primary_key(&table.schema, key)?;
            if !seen.insert(key.clone()) {
                return Err(StoreError::Validation("duplicate key in batch get".to_string()));
            }
            if let Some(item) = table.items.get(&key) {
                items.push(item.clone());
            }
        }

        Ok(items)
    }

    async fn batch_write(&self, table_name: &str, requests: Vec<WriteRequest>) -> StoreResult<()> {
        if requests.len() > BATCH_WRITE_LIMIT {
            return Err(StoreError::Validation(format!(
                "batch write takes at most {BATCH_WRITE_LIMIT} requests, got {}",
                requests.len()
            )));
        }

        let mut tables = self.tables.write().await;
        let table = table_mut(&mut tables, table_name)?;

        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(requests.len());
        for request in requests {
            let key = match &request {
                WriteRequest::Put(item) => validate_item(&table.schema, item)?,
                WriteRequest::Delete(key) => primary_key(&table.schema, key)?,
            };
            if !seen.insert(key.clone()) {
                return Err(StoreError::Validation("duplicate key in batch write".to_string()));
            }
            planned.push((key, request));
        }

        for (key, request) in planned {
            match request {
                WriteRequest::Put(item) => {
                    table.items.insert(key, item);
                }
                WriteRequest::Delete(_) => {
                    table.items.remove(&key);
                }
            }
        }

        Ok(())
    }

    async fn create_table(&self, schema: &TableSchema) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(&schema.table_name) {
            return Err(StoreError::TableAlreadyExists(schema.table_name.clone()));
        }
        tables.insert(
            schema.table_name.clone(),
            Table {
                schema: schema.clone(),
                items: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_table(&self, table_name: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.remove(table_name) {
            Some(_) => Ok(()),
            None => Err(StoreError::TableNotFound(table_name.to_string())),
        }
    }
}
