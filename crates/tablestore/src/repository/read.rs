//! Read operations: lookups, partition queries and table scans.

use std::collections::HashSet;
use std::future::Future;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use tablestore_core::cursor;
use tablestore_core::expression::{
    FilterBuilder, FilterCondition, KeyConditionBuilder, RangeKeyCondition,
};
use tablestore_core::keys::{type_prefix, HASH_KEY, RANGE_KEY};
use tablestore_core::storage::{
    QueryRequest, RepositoryError, Result, ScanRequest, BATCH_GET_LIMIT,
};
use tablestore_core::{AttrValue, Item, Model, Page, Pager};

use super::options::{ModelKey, QueryOptions, ScanOptions};
use super::{validate_identity, Repository};

const MODEL_TYPE_PREFIX: &str = ":modelTypePrefix";

impl<T: Model> Repository<T> {
    /// Reads one model. A missing row is `Ok(None)`.
    pub async fn get(&self, hash_key: &str, id: &str) -> Result<Option<T>> {
        validate_identity(T::MODEL_TYPE, hash_key, id)?;

        let key = Self::key(hash_key, id);
        let consistent_read = self.consistent_read(None);
        let item = self
            .store
            .get_item(&self.config.table_name, &key, consistent_read)
            .await
            .map_err(|e| {
                RepositoryError::store(
                    "get",
                    format!(
                        "table={} hk={hash_key} id={id} model_type={}",
                        self.config.table_name,
                        T::MODEL_TYPE
                    ),
                    e,
                )
            })?;

        item.map(Self::decode).transpose()
    }

    /// Reads the first model whose logical index equals `value`.
    pub async fn get_by_index(&self, hash_key: &str, index: &str, value: &str) -> Result<Option<T>> {
        let options = QueryOptions::new(hash_key)
            .index(index)
            .range(RangeKeyCondition::Eq(value.to_string()))
            .limit(1);
        let page = self.query_page(options).await?;
        Ok(page.items.into_iter().next())
    }

    /// Reads many models by identity.
    ///
    /// Keys are deduplicated and fetched in chunks of 100, several chunks at
    /// a time. Missing rows are skipped and the result has no particular
    /// order.
    pub async fn multi_get(&self, keys: &[ModelKey]) -> Result<Vec<T>> {
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            validate_identity(T::MODEL_TYPE, &key.hash_key, &key.id)?;
            if seen.insert(key) {
                items.push(Self::key(&key.hash_key, &key.id));
            }
        }

        let table_name = self.config.table_name.as_str();
        let consistent_read = self.consistent_read(None);
        let chunks: Vec<Vec<Item>> = items
            .chunks(BATCH_GET_LIMIT)
            .map(<[Item]>::to_vec)
            .collect();

        let pages: Vec<Vec<Item>> = stream::iter(chunks)
            .map(|chunk| async move {
                let size = chunk.len();
                self.store
                    .batch_get(table_name, chunk, consistent_read)
                    .await
                    .map_err(|e| {
                        RepositoryError::store(
                            "multi_get",
                            format!("table={table_name} keys={size}"),
                            e,
                        )
                    })
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .try_collect()
            .await?;

        pages.into_iter().flatten().map(Self::decode).collect()
    }

    /// Runs a query: one page when `limit` is set, every match otherwise.
    pub async fn query(&self, options: QueryOptions) -> Result<Vec<T>> {
        if options.limit.is_some() {
            Ok(self.query_page(options).await?.items)
        } else {
            self.query_all(options).await
        }
    }

    /// Fetches one page of exactly `limit` models (the configured page size
    /// when unset), fewer only on the last page.
    pub async fn query_page(&self, options: QueryOptions) -> Result<Page<T>> {
        let limit = options.limit.unwrap_or(self.config.page_size);
        let request = self.query_request(&options)?;

        let page = Pager::new(self.store.as_ref())
            .fetch_page(&request, limit, options.token.as_deref())
            .await?;

        page.try_map(Self::decode)
    }

    /// Fetches every match, following continuation keys until exhausted.
    pub async fn query_all(&self, options: QueryOptions) -> Result<Vec<T>> {
        let mut request = self.query_request(&options)?;
        if let Some(token) = options.token.as_deref() {
            let key = cursor::decode(HASH_KEY, RANGE_KEY, &options.hash_key, token)
                .map_err(|e| RepositoryError::invalid_cursor(Some(&options.hash_key), e))?;
            request.exclusive_start_key = Some(key);
        }

        let items = Pager::new(self.store.as_ref()).fetch_all(&request).await?;
        debug!(
            model_type = T::MODEL_TYPE,
            hk = %options.hash_key,
            count = items.len(),
            "Queried all"
        );

        items.into_iter().map(Self::decode).collect()
    }

    /// Scans one store page.
    ///
    /// Pagination is store-native: `limit` bounds the rows evaluated, so a
    /// page may hold fewer models (rows of other types are dropped) while
    /// `next_token` still points further.
    pub async fn scan(&self, options: ScanOptions) -> Result<Page<T>> {
        let start_key = options
            .token
            .as_deref()
            .map(|token| cursor::decode_key(HASH_KEY, RANGE_KEY, token))
            .transpose()
            .map_err(|e| RepositoryError::invalid_cursor(None, e))?;

        let request = ScanRequest {
            table_name: self.config.table_name.clone(),
            filter: options.filter,
            limit: Some(options.limit.unwrap_or(self.config.page_size).max(1)),
            exclusive_start_key: start_key,
            consistent_read: self.consistent_read(options.consistent_read),
        };
        let output = self
            .store
            .scan(&request)
            .await
            .map_err(|e| RepositoryError::store("scan", request.describe(), e))?;

        let scanned = output.items.len();
        let items = output
            .items
            .into_iter()
            .filter(Self::owns)
            .map(Self::decode)
            .collect::<Result<Vec<_>>>()?;
        debug!(
            model_type = T::MODEL_TYPE,
            scanned,
            kept = items.len(),
            "Scanned page"
        );

        let next_token = output
            .last_evaluated_key
            .as_ref()
            .map(cursor::encode_key)
            .transpose()
            .map_err(|e| RepositoryError::CorruptRecord(e.to_string()))?;

        Ok(Page::new(items, next_token))
    }

    /// Scans the whole table, handing every store page to `handler`.
    ///
    /// A page may be empty when it held only rows of other model types.
    /// Stops at the first handler error.
    pub async fn scan_all<F, Fut>(&self, mut options: ScanOptions, mut handler: F) -> Result<()>
    where
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        loop {
            let page = self.scan(options.clone()).await?;
            handler(page.items).await?;
            match page.next_token {
                Some(token) => options.token = Some(token),
                None => return Ok(()),
            }
        }
    }

    /// Translates query options into a store request.
    ///
    /// Base-table queries prefix range literals with the model's type tag.
    /// Index queries key on `(hk, indexN)` and filter on the sort-key tag
    /// instead, since other model types may share the index.
    fn query_request(&self, options: &QueryOptions) -> Result<QueryRequest> {
        let builder = match options.index.as_deref() {
            None => KeyConditionBuilder::new(HASH_KEY, &options.hash_key, RANGE_KEY)
                .type_prefix(Some(T::MODEL_TYPE))
                .filter(options.filter.clone()),
            Some(index) => {
                let slot = self.slot(index)?;
                KeyConditionBuilder::new(HASH_KEY, &options.hash_key, slot.attribute_name())
                    .filter(FilterBuilder::and([
                        options.filter.clone(),
                        Some(type_filter(T::MODEL_TYPE)),
                    ]))
            }
        };

        let key_condition = builder
            .range(options.range.clone())
            .scan_forward(options.scan_forward)
            .build();
        let index_name = match options.index.as_deref() {
            Some(index) => Some(self.slot(index)?.index_name().to_string()),
            None => None,
        };

        Ok(QueryRequest {
            table_name: self.config.table_name.clone(),
            index_name,
            key_condition,
            limit: None,
            exclusive_start_key: None,
            consistent_read: self.consistent_read(options.consistent_read),
        })
    }
}

/// `begins_with(#rk, :modelTypePrefix)` over the primary sort key.
fn type_filter(model_type: &str) -> FilterCondition {
    FilterCondition {
        expression: format!("begins_with(#{RANGE_KEY}, {MODEL_TYPE_PREFIX})"),
        names: [(format!("#{RANGE_KEY}"), RANGE_KEY.to_string())].into(),
        values: [(
            MODEL_TYPE_PREFIX.to_string(),
            AttrValue::S(type_prefix(model_type)),
        )]
        .into(),
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::super::fixtures::{config, note, order, repositories, Order, RecordingStore};
    use super::super::options::SaveOptions;
    use super::*;
    use tablestore_core::cursor::CursorError;
    use tablestore_core::expression::CompareOp;
    use tablestore_core::storage::repository_error_to_status_code;

    async fn seed_orders(orders: &Repository<Order>, customer: &str, count: usize) {
        for i in 0..count {
            let mut order = order(customer, &format!("ord#{i}"), "open");
            orders.save(&mut order, SaveOptions::default()).await.unwrap();
        }
    }

    fn ids(orders: &[Order]) -> Vec<String> {
        orders.iter().map(|o| o.order_id.clone()).collect()
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (orders, _) = repositories();
        assert!(orders.get("cust#1", "ord#1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_reads_back_state_and_version() {
        let (orders, _) = repositories();
        let mut order = order("cust#1", "ord#1", "open");
        orders.save(&mut order, SaveOptions::increment()).await.unwrap();

        let stored = orders.get("cust#1", "ord#1").await.unwrap().unwrap();
        assert_eq!(stored.status, "open");
        assert_eq!(stored.total, 10);
        assert_eq!(stored.stamp, order.stamp);
    }

    #[tokio::test]
    async fn test_five_items_in_pages_of_two() {
        let (orders, _) = repositories();
        seed_orders(&orders, "cust#1", 5).await;

        let first = orders
            .query_page(QueryOptions::new("cust#1").limit(2))
            .await
            .unwrap();
        assert_eq!(ids(&first.items), vec!["ord#0", "ord#1"]);
        assert!(first.next_token.is_some());

        let second = orders
            .query_page(QueryOptions::new("cust#1").limit(2).token(first.next_token))
            .await
            .unwrap();
        assert_eq!(ids(&second.items), vec!["ord#2", "ord#3"]);
        assert!(second.next_token.is_some());

        let third = orders
            .query_page(QueryOptions::new("cust#1").limit(2).token(second.next_token))
            .await
            .unwrap();
        assert_eq!(ids(&third.items), vec!["ord#4"]);
        assert!(third.next_token.is_none());
    }

    #[tokio::test]
    async fn test_pages_cover_filtered_results_for_every_limit() {
        let (orders, notes) = repositories();
        for i in 0..12 {
            let status = if i % 3 == 0 { "shipped" } else { "open" };
            let mut order = order("cust#1", &format!("ord#{i:02}"), status);
            orders.save(&mut order, SaveOptions::default()).await.unwrap();
        }
        let mut stray = note("cust#1", "n1", "open");
        notes.save(&mut stray, SaveOptions::default()).await.unwrap();

        let filter = || {
            let mut filters = FilterBuilder::new();
            let open = filters.compare("state.status", CompareOp::Eq, "open");
            filters.build(open)
        };
        let expected = ids(
            &orders
                .query_all(QueryOptions::new("cust#1").filter(filter()))
                .await
                .unwrap(),
        );
        assert_eq!(expected.len(), 8);

        for limit in 1..=10 {
            let mut collected = Vec::new();
            let mut token = None;
            loop {
                let page = orders
                    .query_page(
                        QueryOptions::new("cust#1")
                            .filter(filter())
                            .limit(limit)
                            .token(token),
                    )
                    .await
                    .unwrap();
                assert!(page.items.len() <= limit);
                collected.extend(ids(&page.items));
                match page.next_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
            assert_eq!(collected, expected, "limit {limit}");
        }
    }

    #[tokio::test]
    async fn test_query_range_uses_model_ids() {
        let (orders, _) = repositories();
        seed_orders(&orders, "cust#1", 5).await;

        let between = orders
            .query(
                QueryOptions::new("cust#1")
                    .range(RangeKeyCondition::Between("ord#1".into(), "ord#3".into())),
            )
            .await
            .unwrap();
        assert_eq!(ids(&between), vec!["ord#1", "ord#2", "ord#3"]);

        let backwards = orders
            .query(QueryOptions::new("cust#1").scan_forward(false).limit(2))
            .await
            .unwrap();
        assert_eq!(ids(&backwards), vec!["ord#4", "ord#3"]);
    }

    #[tokio::test]
    async fn test_query_excludes_other_model_types() {
        let (orders, notes) = repositories();
        seed_orders(&orders, "cust#1", 2).await;
        let mut note = note("cust#1", "n1", "open");
        notes.save(&mut note, SaveOptions::default()).await.unwrap();

        assert_eq!(orders.query_all(QueryOptions::new("cust#1")).await.unwrap().len(), 2);
        assert_eq!(notes.query_all(QueryOptions::new("cust#1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_index_query_discriminates_types() {
        let (orders, notes) = repositories();
        seed_orders(&orders, "cust#1", 3).await;
        let mut shipped = order("cust#1", "ord#9", "shipped");
        orders.save(&mut shipped, SaveOptions::default()).await.unwrap();
        let mut note = note("cust#1", "n1", "open");
        notes.save(&mut note, SaveOptions::default()).await.unwrap();

        let open = orders
            .query(
                QueryOptions::new("cust#1")
                    .index("status")
                    .range(RangeKeyCondition::Eq("open".into())),
            )
            .await
            .unwrap();
        assert_eq!(ids(&open), vec!["ord#0", "ord#1", "ord#2"]);

        let labelled = notes
            .get_by_index("cust#1", "label", "open")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(labelled.note_id, "n1");

        let found = orders
            .get_by_index("cust#1", "status", "shipped")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.order_id, "ord#9");
        assert!(orders
            .get_by_index("cust#1", "status", "lost")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_index_pages_carry_index_attribute() {
        let (orders, _) = repositories();
        seed_orders(&orders, "cust#1", 3).await;

        let options = QueryOptions::new("cust#1")
            .index("status")
            .range(RangeKeyCondition::Eq("open".into()))
            .limit(2);
        let first = orders.query_page(options.clone()).await.unwrap();
        let token = first.next_token.clone().unwrap();
        let key = cursor::decode(HASH_KEY, RANGE_KEY, "cust#1", &token).unwrap();
        assert!(key.contains_key("index1"));

        let second = orders.query_page(options.token(Some(token))).await.unwrap();
        assert_eq!(ids(&second.items), vec!["ord#2"]);
    }

    #[tokio::test]
    async fn test_unknown_index_is_client_error() {
        let (orders, _) = repositories();
        let error = orders
            .query(QueryOptions::new("cust#1").index("colour"))
            .await
            .unwrap_err();
        assert!(error.is_client_error());
    }

    #[tokio::test]
    async fn test_foreign_token_is_rejected() {
        let (orders, _) = repositories();
        seed_orders(&orders, "cust#1", 3).await;
        seed_orders(&orders, "cust#2", 3).await;

        let page = orders
            .query_page(QueryOptions::new("cust#1").limit(1))
            .await
            .unwrap();
        let error = orders
            .query_page(QueryOptions::new("cust#2").limit(1).token(page.next_token))
            .await
            .unwrap_err();
        match &error {
            RepositoryError::InvalidCursor { partition, source } => {
                assert_eq!(partition.as_deref(), Some("cust#2"));
                assert_eq!(*source, CursorError::PartitionMismatch);
            }
            other => panic!("expected an invalid cursor, got {other:?}"),
        }
        assert_eq!(repository_error_to_status_code(&error), 400);

        let forged = cursor::encode_key(&Item::from([
            ("hk".to_string(), AttrValue::from("cust#1")),
            ("rk".to_string(), AttrValue::from("order-ord#0")),
            ("index1".to_string(), AttrValue::N("NaN".to_string())),
        ]))
        .unwrap();
        let error = orders
            .query_page(QueryOptions::new("cust#1").limit(1).token(Some(forged)))
            .await
            .unwrap_err();
        assert_eq!(repository_error_to_status_code(&error), 400);

        let error = orders
            .query_page(QueryOptions::new("cust#1").token(Some("%%%".to_string())))
            .await
            .unwrap_err();
        assert!(error.is_client_error());
    }

    #[tokio::test]
    async fn test_query_all_resumes_from_token() {
        let (orders, _) = repositories();
        seed_orders(&orders, "cust#1", 5).await;

        let first = orders
            .query_page(QueryOptions::new("cust#1").limit(2))
            .await
            .unwrap();
        let rest = orders
            .query_all(QueryOptions::new("cust#1").token(first.next_token))
            .await
            .unwrap();
        assert_eq!(ids(&rest), vec!["ord#2", "ord#3", "ord#4"]);
    }

    #[tokio::test]
    async fn test_scan_checks_type_tag() {
        let (orders, notes) = repositories();
        seed_orders(&orders, "cust#1", 3).await;
        seed_orders(&orders, "cust#2", 2).await;
        for i in 0..4 {
            let mut note = note("cust#1", &format!("n{i}"), "x");
            notes.save(&mut note, SaveOptions::default()).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = orders
                .scan(ScanOptions {
                    limit: Some(3),
                    token,
                    ..ScanOptions::default()
                })
                .await
                .unwrap();
            seen.extend(ids(&page.items));
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        seen.sort();
        assert_eq!(seen, vec!["ord#0", "ord#0", "ord#1", "ord#1", "ord#2"]);
    }

    #[tokio::test]
    async fn test_scan_all_pushes_pages() {
        let (orders, notes) = repositories();
        seed_orders(&orders, "cust#1", 7).await;
        let mut note = note("cust#1", "n1", "x");
        notes.save(&mut note, SaveOptions::default()).await.unwrap();

        let pages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pages);
        orders
            .scan_all(
                ScanOptions {
                    limit: Some(3),
                    ..ScanOptions::default()
                },
                |batch| {
                    let sink = Arc::clone(&sink);
                    async move {
                        sink.lock().unwrap().push(batch.len());
                        Ok(())
                    }
                },
            )
            .await
            .unwrap();

        let pages = pages.lock().unwrap().clone();
        // Eight rows in pages of three: 3, 3, 2.
        assert_eq!(pages.len(), 3);
        assert_eq!(pages.iter().sum::<usize>(), 7);
        assert!(pages.iter().all(|&size| size <= 3));
    }

    #[tokio::test]
    async fn test_scan_all_hands_over_pages_without_matches() {
        let (orders, notes) = repositories();
        for id in ["n1", "n2"] {
            let mut note = note("cust#1", id, "x");
            notes.save(&mut note, SaveOptions::default()).await.unwrap();
        }

        let mut pages = Vec::new();
        orders
            .scan_all(
                ScanOptions {
                    limit: Some(1),
                    ..ScanOptions::default()
                },
                |batch| {
                    pages.push(batch.len());
                    async { Ok(()) }
                },
            )
            .await
            .unwrap();

        assert!(!pages.is_empty());
        assert!(pages.iter().all(|&size| size == 0));
    }

    #[tokio::test]
    async fn test_scan_all_stops_on_handler_error() {
        let (orders, _) = repositories();
        seed_orders(&orders, "cust#1", 6).await;

        let mut calls = 0;
        let result = orders
            .scan_all(
                ScanOptions {
                    limit: Some(2),
                    ..ScanOptions::default()
                },
                |_| {
                    calls += 1;
                    async { Err(RepositoryError::InvalidModel("stop".to_string())) }
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_multi_get_chunks_and_dedupes() {
        let store = Arc::new(RecordingStore::new());
        let orders = Repository::<Order>::new(store.clone(), config()).unwrap();
        let batch: Vec<Order> = (0..150)
            .map(|i| order("cust#1", &format!("ord#{i:03}"), "open"))
            .collect();
        orders.batch_put(&batch).await.unwrap();

        let mut keys: Vec<ModelKey> = (0..220)
            .map(|i| ModelKey::new("cust#1", format!("ord#{i:03}")))
            .collect();
        keys.push(ModelKey::new("cust#1", "ord#000"));

        let found = orders.multi_get(&keys).await.unwrap();
        assert_eq!(found.len(), 150);

        let mut sizes = store.batch_get_sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![20, 100, 100]);
    }

    #[test]
    fn test_type_filter() {
        let filter = type_filter("order");
        assert_eq!(filter.expression, "begins_with(#rk, :modelTypePrefix)");
        assert_eq!(
            filter.values[":modelTypePrefix"],
            AttrValue::S("order-".to_string())
        );
    }
}
