//! Generic repository over the shared single table.
//!
//! One `Repository<T>` per model type. Repositories hold the store handle,
//! an optional event publisher, configuration, and the model's index map
//! resolved once at construction; they are cheap to clone and safe to share
//! across tasks.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tablestore::{Config, Repository, SaveOptions};
//! use tablestore::storage::InMemoryStore;
//!
//! let repository = Repository::<Order>::new(Arc::new(InMemoryStore::new()), Config::default())?;
//! repository.create_table(true).await?;
//! repository.save(&mut order, SaveOptions::default()).await?;
//! ```

mod options;
mod read;
mod write;

#[cfg(all(test, feature = "inmemory"))]
mod fixtures;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tablestore_core::events::EventPublisher;
use tablestore_core::keys::{is_valid_model_type, IndexSlot, SortKey, RANGE_KEY};
use tablestore_core::record::{primary_key, Record};
use tablestore_core::storage::{RepositoryError, Result, Store};
use tablestore_core::{Item, Model};

use crate::config::Config;
use crate::provision;

pub use options::{
    DeleteOptions, ModelKey, QueryOptions, SaveOptions, SaveOutcome, ScanOptions, VersionPolicy,
};

/// Persistence operations for one model type.
pub struct Repository<T: Model> {
    store: Arc<dyn Store>,
    publisher: Option<Arc<dyn EventPublisher>>,
    config: Config,
    indexes: HashMap<&'static str, IndexSlot>,
    model: PhantomData<fn() -> T>,
}

impl<T: Model> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            publisher: self.publisher.clone(),
            config: self.config.clone(),
            indexes: self.indexes.clone(),
            model: PhantomData,
        }
    }
}

impl<T: Model> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("model_type", &T::MODEL_TYPE)
            .field("table_name", &self.config.table_name)
            .field("publisher", &self.publisher.is_some())
            .finish()
    }
}

impl<T: Model> Repository<T> {
    /// Creates a repository, validating the model's type tag and index map.
    pub fn new(store: Arc<dyn Store>, config: Config) -> Result<Self> {
        if !is_valid_model_type(T::MODEL_TYPE) {
            return Err(RepositoryError::InvalidModel(format!(
                "model type {:?} must be non-empty and must not contain '-'",
                T::MODEL_TYPE
            )));
        }

        let mut indexes = HashMap::with_capacity(T::INDEXES.len());
        for (name, slot) in T::INDEXES {
            if indexes.insert(*name, *slot).is_some() {
                return Err(RepositoryError::InvalidModel(format!(
                    "{} declares index {name} more than once",
                    T::MODEL_TYPE
                )));
            }
        }

        Ok(Self {
            store,
            publisher: None,
            config,
            indexes,
            model: PhantomData,
        })
    }

    /// Publishes drained model events after every committed save or delete.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    /// Creates the shared table. Returns `false` if it already existed.
    pub async fn create_table(&self, ignore_existing: bool) -> Result<bool> {
        let schema = provision::table_schema(self.table_name());
        provision::create_table(self.store.as_ref(), &schema, ignore_existing).await
    }

    /// Deletes the shared table. Returns `false` if it was already gone.
    pub async fn delete_table(&self, ignore_missing: bool) -> Result<bool> {
        provision::delete_table(self.store.as_ref(), self.table_name(), ignore_missing).await
    }

    fn slot(&self, index: &str) -> Result<IndexSlot> {
        self.indexes
            .get(index)
            .copied()
            .ok_or_else(|| RepositoryError::UnknownIndex {
                model_type: T::MODEL_TYPE,
                index: index.to_string(),
            })
    }

    fn consistent_read(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or(self.config.consistent_read)
    }

    fn key(hash_key: &str, id: &str) -> Item {
        primary_key(hash_key, &SortKey::new(T::MODEL_TYPE, id))
    }

    /// Whether a raw row belongs to this model type.
    fn owns(item: &Item) -> bool {
        item.get(RANGE_KEY)
            .and_then(|value| value.as_str())
            .is_some_and(|raw| SortKey::has_type(raw, T::MODEL_TYPE))
    }

    /// Rebuilds a model from a stored row of its own type.
    fn decode(item: Item) -> Result<T> {
        let record = Record::from_item(item)?;
        if record.sort_key.model_type != T::MODEL_TYPE {
            return Err(RepositoryError::CorruptRecord(format!(
                "expected a {} row, found {}",
                T::MODEL_TYPE,
                record.sort_key
            )));
        }
        Ok(T::from_state(record.state, record.version)?)
    }
}

fn validate_identity(model_type: &str, hash_key: &str, id: &str) -> Result<()> {
    if hash_key.is_empty() {
        return Err(RepositoryError::InvalidModel(format!(
            "{model_type} {id:?} has an empty hash key"
        )));
    }
    if id.is_empty() {
        return Err(RepositoryError::InvalidModel(format!(
            "{model_type} in {hash_key} has an empty id"
        )));
    }
    Ok(())
}
