//! In-memory storage backend for testing.
//!
//! Keeps every table in a `BTreeMap` behind `Arc<RwLock<_>>` and evaluates
//! key, filter and condition expressions itself, so repository code runs
//! unchanged against it.
//!
//! # Example
//!
//! ```rust,ignore
//! use tablestore::storage::inmemory::InMemoryStore;
//! use tablestore_core::storage::TableSchema;
//!
//! let store = InMemoryStore::with_table(TableSchema::single_table("tablestore"));
//! ```

mod expression;
mod store;

pub use store::InMemoryStore;
