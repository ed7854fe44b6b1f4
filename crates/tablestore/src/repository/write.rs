//! Write operations: transactional save/delete and batched writes.

use std::collections::HashSet;

use chrono::Utc;
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, error, warn};

use tablestore_core::events::DomainEvent;
use tablestore_core::expression::{CompareOp, FilterBuilder, FilterCondition};
use tablestore_core::keys::{SortKey, VERSION};
use tablestore_core::record::{compute_ttl, Record};
use tablestore_core::storage::{
    RepositoryError, Result, TransactWrite, WriteRequest, BATCH_WRITE_LIMIT,
};
use tablestore_core::{AttrValue, Item, Model, VersionStamp};

use super::options::{DeleteOptions, ModelKey, SaveOptions, SaveOutcome, VersionPolicy};
use super::{validate_identity, Repository};

const EXPECTED_VERSION: &str = ":expectedVersion";

impl<T: Model> Repository<T> {
    /// Saves a model with a single-item transactional put.
    ///
    /// Versioned models are guarded by
    /// `(attribute_not_exists(#version) OR #version < :valN)` unless
    /// `force_version` is set. Events are published only after the write
    /// commits; a publish failure is returned as [`RepositoryError::Publish`]
    /// with the write left in place.
    pub async fn save(&self, model: &mut T, options: SaveOptions) -> Result<SaveOutcome> {
        let id = model.id();
        if !options.force && !model.is_changed() {
            debug!(model_type = T::MODEL_TYPE, id = %id, "Skipping unchanged model");
            return Ok(SaveOutcome::Unchanged);
        }

        let (item, stamp) = self.build_item(model, options.version_policy, options.custom_fields)?;
        let condition = match stamp {
            Some(stamp) if !options.force_version => version_condition(stamp.version),
            _ => None,
        };

        let write = TransactWrite::Put {
            table_name: self.config.table_name.clone(),
            item: item.clone(),
            condition,
        };
        self.commit("save", write, &id, item).await?;

        if let Some(stamp) = stamp {
            model.set_version_stamp(stamp);
        }
        debug!(
            model_type = T::MODEL_TYPE,
            id = %id,
            version = stamp.map(|s| s.version),
            "Saved model"
        );

        self.publish(&id, stamp.map(|s| s.version), model.take_events())
            .await?;
        Ok(SaveOutcome::Written)
    }

    /// Deletes a model with a single-item transactional delete.
    pub async fn delete(&self, model: &mut T, options: DeleteOptions) -> Result<()> {
        let id = model.id();
        let hash_key = model.index_data().hash_key;
        validate_identity(T::MODEL_TYPE, &hash_key, &id)?;

        let key = Self::key(&hash_key, &id);
        let condition = FilterBuilder::and([
            options.condition,
            options.expect_version.map(expected_version_condition),
        ]);

        let write = TransactWrite::Delete {
            table_name: self.config.table_name.clone(),
            key: key.clone(),
            condition,
        };
        self.commit("delete", write, &id, key).await?;
        debug!(model_type = T::MODEL_TYPE, id = %id, "Deleted model");

        let version = model.version_stamp().map(|s| s.version);
        self.publish(&id, version, model.take_events()).await
    }

    /// Unconditionally deletes one row. No events are published.
    pub async fn delete_by_id(&self, hash_key: &str, id: &str) -> Result<()> {
        validate_identity(T::MODEL_TYPE, hash_key, id)?;

        let key = Self::key(hash_key, id);
        let write = TransactWrite::Delete {
            table_name: self.config.table_name.clone(),
            key: key.clone(),
            condition: None,
        };
        self.commit("delete", write, id, key).await?;
        debug!(model_type = T::MODEL_TYPE, id = %id, "Deleted model by id");
        Ok(())
    }

    /// Saves every model concurrently. Each save is its own transaction; one
    /// result per model, in input order.
    pub async fn multi_save(
        &self,
        models: &mut [T],
        options: SaveOptions,
    ) -> Vec<Result<SaveOutcome>> {
        join_all(
            models
                .iter_mut()
                .map(|model| self.save(model, options.clone())),
        )
        .await
    }

    /// Deletes every model concurrently. One result per model, in input order.
    pub async fn multi_delete(&self, models: &mut [T], options: DeleteOptions) -> Vec<Result<()>> {
        join_all(
            models
                .iter_mut()
                .map(|model| self.delete(model, options.clone())),
        )
        .await
    }

    /// Writes models without conditions in batches of 25.
    ///
    /// When a model identity repeats, the last occurrence wins. Versions are
    /// persisted as-is and no events are published.
    pub async fn batch_put(&self, models: &[T]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut requests = Vec::with_capacity(models.len());
        for model in models.iter().rev() {
            let (item, _) = self.build_item(model, VersionPolicy::AsIs, Item::new())?;
            let identity = (model.index_data().hash_key, model.id());
            if seen.insert(identity) {
                requests.push(WriteRequest::Put(item));
            }
        }
        requests.reverse();

        self.write_batches(requests).await
    }

    /// Deletes rows by identity in batches of 25. Duplicate keys are dropped.
    pub async fn batch_delete(&self, keys: &[ModelKey]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut requests = Vec::with_capacity(keys.len());
        for key in keys {
            validate_identity(T::MODEL_TYPE, &key.hash_key, &key.id)?;
            if seen.insert(key) {
                requests.push(WriteRequest::Delete(Self::key(&key.hash_key, &key.id)));
            }
        }

        self.write_batches(requests).await
    }

    /// Builds the stored row and the version stamp it carries.
    fn build_item(
        &self,
        model: &T,
        policy: VersionPolicy,
        custom_fields: Item,
    ) -> Result<(Item, Option<VersionStamp>)> {
        let id = model.id();
        let index_data = model.index_data();
        validate_identity(T::MODEL_TYPE, &index_data.hash_key, &id)?;

        let now = Utc::now();
        let stamp = model.version_stamp().map(|current| {
            let version = match policy {
                VersionPolicy::AsIs => current.version,
                VersionPolicy::Increment => current.version + 1,
            };
            VersionStamp::new(version, now.timestamp())
        });

        let record = Record {
            index_data,
            sort_key: SortKey::new(T::MODEL_TYPE, id),
            ttl: compute_ttl(now, self.config.ttl_seconds, model.expires_at()),
            state: model.to_state()?,
            version: stamp,
            custom: custom_fields,
        };

        Ok((record.to_item()?, stamp))
    }

    /// Runs one transactional write, classifying condition failures.
    async fn commit(
        &self,
        operation: &'static str,
        write: TransactWrite,
        id: &str,
        attempted: Item,
    ) -> Result<()> {
        match self.store.transact_write(vec![write]).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_condition_failure() => {
                warn!(
                    model_type = T::MODEL_TYPE,
                    id = %id,
                    operation,
                    reasons = ?e.reasons(),
                    "Concurrency conflict"
                );
                Err(RepositoryError::ConcurrencyConflict {
                    model_type: T::MODEL_TYPE,
                    id: id.to_string(),
                    reasons: e.reasons(),
                    item: Box::new(attempted),
                })
            }
            Err(e) => Err(RepositoryError::store(
                operation,
                format!(
                    "table={} model_type={} id={id}",
                    self.config.table_name,
                    T::MODEL_TYPE
                ),
                e,
            )),
        }
    }

    /// Stamps and publishes the events drained after a commit.
    async fn publish(&self, id: &str, version: Option<u64>, events: Vec<DomainEvent>) -> Result<()> {
        let Some(publisher) = &self.publisher else {
            return Ok(());
        };
        if events.is_empty() {
            return Ok(());
        }

        let events: Vec<DomainEvent> = events
            .into_iter()
            .map(|event| event.stamped(T::MODEL_TYPE, id, version))
            .collect();

        publisher.publish(&events).await.map_err(|source| {
            error!(
                model_type = T::MODEL_TYPE,
                id = %id,
                events = events.len(),
                error = %source,
                "Failed to publish events"
            );
            RepositoryError::Publish {
                model_type: T::MODEL_TYPE,
                id: id.to_string(),
                source,
            }
        })
    }

    async fn write_batches(&self, requests: Vec<WriteRequest>) -> Result<()> {
        let table_name = self.config.table_name.as_str();
        let chunks: Vec<Vec<WriteRequest>> = requests
            .chunks(BATCH_WRITE_LIMIT)
            .map(<[WriteRequest]>::to_vec)
            .collect();

        stream::iter(chunks)
            .map(|chunk| async move {
                let size = chunk.len();
                self.store
                    .batch_write(table_name, chunk)
                    .await
                    .map_err(|e| {
                        RepositoryError::store(
                            "batch_write",
                            format!("table={table_name} requests={size}"),
                            e,
                        )
                    })
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .try_collect::<Vec<()>>()
            .await?;

        Ok(())
    }
}

/// `(attribute_not_exists(#version) OR #version < :valN)`
fn version_condition(version: u64) -> Option<FilterCondition> {
    let mut filters = FilterBuilder::new();
    let missing = filters.attribute_not_exists(VERSION);
    let older = filters.compare(VERSION, CompareOp::Lt, version);
    filters.build(FilterBuilder::or([missing, older]))
}

fn expected_version_condition(version: u64) -> FilterCondition {
    FilterCondition {
        expression: format!("#{VERSION} = {EXPECTED_VERSION}"),
        names: [(format!("#{VERSION}"), VERSION.to_string())].into(),
        values: [(EXPECTED_VERSION.to_string(), AttrValue::number(version))].into(),
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::super::fixtures::{
        config, note, order, repositories, FailingPublisher, Note, Order, RecordingStore, TABLE,
    };
    use super::*;
    use crate::events::MemoryPublisher;
    use tablestore_core::storage::{Store, StoreError};

    async fn stored_version(repository: &Repository<Order>, customer: &str, id: &str) -> u64 {
        repository
            .get(customer, id)
            .await
            .unwrap()
            .unwrap()
            .stamp
            .version
    }

    #[test]
    fn test_version_condition_expression() {
        let condition = version_condition(3).unwrap();

        assert_eq!(
            condition.expression,
            "(attribute_not_exists(#version) OR #version < :val1)"
        );
        assert_eq!(condition.values[":val1"], AttrValue::from(3u64));
        assert_eq!(condition.names["#version"], "version");
    }

    #[tokio::test]
    async fn test_version_scenario() {
        let (orders, _) = repositories();
        let mut order = order("cust#1", "ord#1", "open");

        // version 0 on a fresh row
        orders.save(&mut order, SaveOptions::default()).await.unwrap();
        assert_eq!(stored_version(&orders, "cust#1", "ord#1").await, 0);

        // version 1 passes `version < 1`
        order.stamp.version = 1;
        order.ship();
        orders.save(&mut order, SaveOptions::default()).await.unwrap();
        assert_eq!(stored_version(&orders, "cust#1", "ord#1").await, 1);

        // replaying version 1 fails
        order.ship();
        let error = orders
            .save(&mut order, SaveOptions::default())
            .await
            .unwrap_err();
        assert!(error.is_conflict());
        match error {
            RepositoryError::ConcurrencyConflict { id, item, .. } => {
                assert_eq!(id, "ord#1");
                assert_eq!(item["version"], AttrValue::from(1u64));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_increment_policy() {
        let (orders, _) = repositories();
        let mut order = order("cust#1", "ord#1", "open");

        orders.save(&mut order, SaveOptions::increment()).await.unwrap();
        assert_eq!(order.stamp.version, 1);
        assert!(order.stamp.time > 0);

        order.ship();
        orders.save(&mut order, SaveOptions::increment()).await.unwrap();
        assert_eq!(order.stamp.version, 2);
        assert_eq!(stored_version(&orders, "cust#1", "ord#1").await, 2);
    }

    #[tokio::test]
    async fn test_force_version_skips_condition() {
        let (orders, _) = repositories();
        let mut order = order("cust#1", "ord#1", "open");
        order.stamp.version = 5;
        orders.save(&mut order, SaveOptions::default()).await.unwrap();

        let mut stale = super::super::fixtures::order("cust#1", "ord#1", "cancelled");
        stale.stamp.version = 2;
        let options = SaveOptions {
            force_version: true,
            ..SaveOptions::default()
        };
        orders.save(&mut stale, options).await.unwrap();

        let stored = orders.get("cust#1", "ord#1").await.unwrap().unwrap();
        assert_eq!(stored.status, "cancelled");
        assert_eq!(stored.stamp.version, 2);
    }

    #[tokio::test]
    async fn test_concurrent_saves_have_one_winner() {
        let (orders, _) = repositories();
        let mut first = order("cust#1", "ord#1", "open");
        let mut second = order("cust#1", "ord#1", "open");
        first.stamp.version = 1;
        second.stamp.version = 1;

        let (a, b) = tokio::join!(
            orders.save(&mut first, SaveOptions::default()),
            orders.save(&mut second, SaveOptions::default())
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(e) if e.is_conflict()))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_unchanged_model_is_not_written() {
        let store = Arc::new(RecordingStore::new());
        let orders = Repository::<Order>::new(store.clone(), config()).unwrap();
        let mut order = order("cust#1", "ord#1", "open");

        assert_eq!(
            orders.save(&mut order, SaveOptions::default()).await.unwrap(),
            SaveOutcome::Written
        );
        let calls = store.calls();

        // events drained by the first save
        assert_eq!(
            orders.save(&mut order, SaveOptions::default()).await.unwrap(),
            SaveOutcome::Unchanged
        );
        assert_eq!(store.calls(), calls);

        order.stamp.version = 1;
        assert_eq!(
            orders.save(&mut order, SaveOptions::forced()).await.unwrap(),
            SaveOutcome::Written
        );
        assert_eq!(store.calls(), calls + 1);
    }

    #[tokio::test]
    async fn test_events_published_after_commit() {
        let (orders, _) = repositories();
        let publisher = Arc::new(MemoryPublisher::new());
        let orders = orders.with_publisher(publisher.clone());
        let mut receiver = publisher.subscribe();

        let mut order = order("cust#1", "ord#1", "open");
        orders.save(&mut order, SaveOptions::increment()).await.unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, "OrderPlaced");
        assert_eq!(event.aggregate_type, "order");
        assert_eq!(event.aggregate_id, "ord#1");
        assert_eq!(event.version, Some(1));
        assert!(order.events.is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_events() {
        let (orders, _) = repositories();
        let publisher = Arc::new(MemoryPublisher::new());
        let orders = orders.with_publisher(publisher.clone());
        let mut receiver = publisher.subscribe();

        let mut winner = order("cust#1", "ord#1", "open");
        winner.stamp.version = 1;
        orders.save(&mut winner, SaveOptions::default()).await.unwrap();
        receiver.recv().await.unwrap();

        let mut loser = order("cust#1", "ord#1", "open");
        loser.stamp.version = 1;
        assert!(orders.save(&mut loser, SaveOptions::default()).await.is_err());
        assert_eq!(loser.events.len(), 1);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_write() {
        let (orders, _) = repositories();
        let publisher = Arc::new(FailingPublisher::default());
        let orders = orders.with_publisher(publisher.clone());

        let mut order = order("cust#1", "ord#1", "open");
        let error = orders
            .save(&mut order, SaveOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(error, RepositoryError::Publish { .. }));
        assert_eq!(publisher.attempts.load(Ordering::SeqCst), 1);
        assert!(orders.get("cust#1", "ord#1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_custom_fields() {
        let store = Arc::new(RecordingStore::new());
        let orders = Repository::<Order>::new(store.clone(), config()).unwrap();

        let mut order = order("cust#1", "ord#1", "open");
        let options = SaveOptions {
            custom_fields: Item::from([("region".to_string(), AttrValue::from("eu"))]),
            ..SaveOptions::default()
        };
        orders.save(&mut order, options).await.unwrap();

        let key = Repository::<Order>::key("cust#1", "ord#1");
        let row = store.get_item(TABLE, &key, false).await.unwrap().unwrap();
        assert_eq!(row["region"], AttrValue::from("eu"));

        order.ship();
        let options = SaveOptions {
            custom_fields: Item::from([("hk".to_string(), AttrValue::from("other"))]),
            ..SaveOptions::increment()
        };
        assert!(matches!(
            orders.save(&mut order, options).await,
            Err(RepositoryError::InvalidModel(_))
        ));
    }

    #[tokio::test]
    async fn test_ttl_from_config() {
        let store = Arc::new(RecordingStore::new());
        let config = crate::Config {
            ttl_seconds: Some(3600),
            ..config()
        };
        let notes = Repository::<Note>::new(store.clone(), config).unwrap();

        let mut note = note("cust#1", "n1", "todo");
        let before = Utc::now().timestamp();
        notes.save(&mut note, SaveOptions::default()).await.unwrap();

        let key = Repository::<Note>::key("cust#1", "n1");
        let row = store.get_item(TABLE, &key, false).await.unwrap().unwrap();
        let ttl = row["ttl"].as_i64().unwrap();
        assert!(ttl >= before + 3600);
        assert!(!row.contains_key("version"));
    }

    #[tokio::test]
    async fn test_delete_with_expected_version() {
        let (orders, _) = repositories();
        let mut order = order("cust#1", "ord#1", "open");
        orders.save(&mut order, SaveOptions::increment()).await.unwrap();

        let stale = DeleteOptions {
            expect_version: Some(7),
            ..DeleteOptions::default()
        };
        assert!(orders
            .delete(&mut order, stale)
            .await
            .unwrap_err()
            .is_conflict());

        let current = DeleteOptions {
            expect_version: Some(1),
            ..DeleteOptions::default()
        };
        orders.delete(&mut order, current).await.unwrap();
        assert!(orders.get("cust#1", "ord#1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_with_condition_and_version() {
        let (orders, _) = repositories();
        let mut order = order("cust#1", "ord#1", "open");
        orders.save(&mut order, SaveOptions::default()).await.unwrap();

        let mut filters = FilterBuilder::new();
        let shipped = filters.compare("state.status", CompareOp::Eq, "shipped");
        let options = DeleteOptions {
            condition: filters.build(shipped),
            expect_version: Some(0),
        };
        assert!(orders
            .delete(&mut order, options)
            .await
            .unwrap_err()
            .is_conflict());

        let mut filters = FilterBuilder::new();
        let open = filters.compare("state.status", CompareOp::Eq, "open");
        let options = DeleteOptions {
            condition: filters.build(open),
            expect_version: Some(0),
        };
        orders.delete(&mut order, options).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let (_, notes) = repositories();
        let mut note = note("cust#1", "n1", "todo");
        notes.save(&mut note, SaveOptions::default()).await.unwrap();

        notes.delete_by_id("cust#1", "n1").await.unwrap();
        assert!(notes.get("cust#1", "n1").await.unwrap().is_none());

        // deleting a missing row is not an error
        notes.delete_by_id("cust#1", "n1").await.unwrap();
    }

    #[tokio::test]
    async fn test_multi_save_reports_each_item() {
        let (orders, _) = repositories();
        let mut existing = order("cust#1", "ord#2", "open");
        existing.stamp.version = 3;
        orders.save(&mut existing, SaveOptions::default()).await.unwrap();

        let mut batch = vec![
            order("cust#1", "ord#1", "open"),
            order("cust#1", "ord#2", "open"),
            order("cust#1", "ord#3", "open"),
        ];
        let results = orders.multi_save(&mut batch, SaveOptions::default()).await;

        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_conflict());
        assert!(results[2].is_ok());
        assert!(orders.get("cust#1", "ord#3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_multi_delete() {
        let (_, notes) = repositories();
        let mut batch = vec![note("cust#1", "n1", "a"), note("cust#1", "n2", "b")];
        for result in notes.multi_save(&mut batch, SaveOptions::default()).await {
            result.unwrap();
        }

        let results = notes.multi_delete(&mut batch, DeleteOptions::default()).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(notes.get("cust#1", "n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_put_chunks_and_dedupes() {
        let store = Arc::new(RecordingStore::new());
        let notes = Repository::<Note>::new(store.clone(), config()).unwrap();

        let mut batch: Vec<Note> = (0..60)
            .map(|i| note("cust#1", &format!("n{i:02}"), "a"))
            .collect();
        batch.push(note("cust#1", "n00", "latest"));
        notes.batch_put(&batch).await.unwrap();

        let mut sizes = store.batch_write_sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![10, 25, 25]);
        assert_eq!(store.inner.len(TABLE).await, 60);

        let first = notes.get("cust#1", "n00").await.unwrap().unwrap();
        assert_eq!(first.label, "latest");
    }

    #[tokio::test]
    async fn test_batch_delete() {
        let store = Arc::new(RecordingStore::new());
        let notes = Repository::<Note>::new(store.clone(), config()).unwrap();
        let batch: Vec<Note> = (0..30)
            .map(|i| note("cust#1", &format!("n{i:02}"), "a"))
            .collect();
        notes.batch_put(&batch).await.unwrap();

        let mut keys: Vec<ModelKey> = (0..30)
            .map(|i| ModelKey::new("cust#1", format!("n{i:02}")))
            .collect();
        keys.push(ModelKey::new("cust#1", "n00"));
        notes.batch_delete(&keys).await.unwrap();

        assert!(store.inner.is_empty(TABLE).await);
    }

    #[tokio::test]
    async fn test_store_failure_is_wrapped() {
        let store: Arc<dyn Store> = Arc::new(crate::storage::InMemoryStore::new());
        let orders = Repository::<Order>::new(store, config()).unwrap();

        let mut order = order("cust#1", "ord#1", "open");
        let error = orders
            .save(&mut order, SaveOptions::default())
            .await
            .unwrap_err();

        match error {
            RepositoryError::Store {
                operation,
                params,
                source,
            } => {
                assert_eq!(operation, "save");
                assert!(params.contains("id=ord#1"));
                assert_eq!(source, StoreError::TableNotFound(TABLE.to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
