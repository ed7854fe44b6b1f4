//! Test models and store doubles shared by the repository tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tablestore_core::events::{DomainEvent, EventBuffer, EventPublisher, PublishError};
use tablestore_core::keys::IndexSlot;
use tablestore_core::storage::{
    QueryOutput, QueryRequest, ScanRequest, Store, StoreResult, TableSchema, TransactWrite,
    WriteRequest,
};
use tablestore_core::{IndexData, Item, Model, VersionStamp};

use super::Repository;
use crate::config::Config;
use crate::provision::table_schema;
use crate::storage::InMemoryStore;

pub const TABLE: &str = "tablestore";

/// A versioned aggregate that records events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub customer_id: String,
    pub order_id: String,
    pub status: String,
    pub total: i64,
    #[serde(skip)]
    pub stamp: VersionStamp,
    #[serde(skip)]
    pub events: EventBuffer,
}

impl Order {
    pub fn ship(&mut self) {
        self.status = "shipped".to_string();
        self.events
            .record("OrderShipped", &serde_json::json!({"orderId": self.order_id}))
            .unwrap();
    }
}

impl Model for Order {
    const MODEL_TYPE: &'static str = "order";
    const INDEXES: &'static [(&'static str, IndexSlot)] = &[("status", IndexSlot::Index1)];

    fn id(&self) -> String {
        self.order_id.clone()
    }

    fn index_data(&self) -> IndexData {
        IndexData::new(&self.customer_id).with_index(IndexSlot::Index1, &self.status)
    }

    fn version_stamp(&self) -> Option<VersionStamp> {
        Some(self.stamp)
    }

    fn set_version_stamp(&mut self, stamp: VersionStamp) {
        self.stamp = stamp;
    }

    fn is_changed(&self) -> bool {
        !self.events.is_empty()
    }

    fn take_events(&mut self) -> Vec<DomainEvent> {
        self.events.take()
    }
}

/// A new order carrying one pending `OrderPlaced` event.
pub fn order(customer_id: &str, order_id: &str, status: &str) -> Order {
    let mut order = Order {
        customer_id: customer_id.to_string(),
        order_id: order_id.to_string(),
        status: status.to_string(),
        total: 10,
        stamp: VersionStamp::default(),
        events: EventBuffer::new(),
    };
    order
        .events
        .record("OrderPlaced", &serde_json::json!({"orderId": order_id}))
        .unwrap();
    order
}

/// An unversioned entity sharing the order's partition and index slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub customer_id: String,
    pub note_id: String,
    pub label: String,
}

impl Model for Note {
    const MODEL_TYPE: &'static str = "note";
    const INDEXES: &'static [(&'static str, IndexSlot)] = &[("label", IndexSlot::Index1)];

    fn id(&self) -> String {
        self.note_id.clone()
    }

    fn index_data(&self) -> IndexData {
        IndexData::new(&self.customer_id).with_index(IndexSlot::Index1, &self.label)
    }
}

pub fn note(customer_id: &str, note_id: &str, label: &str) -> Note {
    Note {
        customer_id: customer_id.to_string(),
        note_id: note_id.to_string(),
        label: label.to_string(),
    }
}

pub fn config() -> Config {
    Config {
        table_name: TABLE.to_string(),
        page_size: 20,
        batch_concurrency: 4,
        ttl_seconds: None,
        consistent_read: false,
    }
}

/// Order and note repositories over one in-memory table.
pub fn repositories() -> (Repository<Order>, Repository<Note>) {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::with_table(table_schema(TABLE)));
    (
        Repository::new(Arc::clone(&store), config()).unwrap(),
        Repository::new(store, config()).unwrap(),
    )
}

/// Delegates to an [`InMemoryStore`] while recording what was asked of it.
#[derive(Debug, Default)]
pub struct RecordingStore {
    pub inner: InMemoryStore,
    pub calls: AtomicUsize,
    pub batch_get_sizes: Mutex<Vec<usize>>,
    pub batch_write_sizes: Mutex<Vec<usize>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::with_table(table_schema(TABLE)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn get_item(
        &self,
        table_name: &str,
        key: &Item,
        consistent_read: bool,
    ) -> StoreResult<Option<Item>> {
        self.count();
        self.inner.get_item(table_name, key, consistent_read).await
    }

    async fn query(&self, request: &QueryRequest) -> StoreResult<QueryOutput> {
        self.count();
        self.inner.query(request).await
    }

    async fn scan(&self, request: &ScanRequest) -> StoreResult<QueryOutput> {
        self.count();
        self.inner.scan(request).await
    }

    async fn transact_write(&self, writes: Vec<TransactWrite>) -> StoreResult<()> {
        self.count();
        self.inner.transact_write(writes).await
    }

    async fn batch_get(
        &self,
        table_name: &str,
        keys: Vec<Item>,
        consistent_read: bool,
    ) -> StoreResult<Vec<Item>> {
        self.count();
        self.batch_get_sizes.lock().unwrap().push(keys.len());
        self.inner.batch_get(table_name, keys, consistent_read).await
    }

    async fn batch_write(&self, table_name: &str, requests: Vec<WriteRequest>) -> StoreResult<()> {
        self.count();
        self.batch_write_sizes.lock().unwrap().push(requests.len());
        self.inner.batch_write(table_name, requests).await
    }

    async fn create_table(&self, schema: &TableSchema) -> StoreResult<()> {
        self.count();
        self.inner.create_table(schema).await
    }

    async fn delete_table(&self, table_name: &str) -> StoreResult<()> {
        self.count();
        self.inner.delete_table(table_name).await
    }
}

/// A publisher whose broker is always down.
#[derive(Debug, Default)]
pub struct FailingPublisher {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _events: &[DomainEvent]) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PublishError::Failed("broker down".to_string()))
    }
}
