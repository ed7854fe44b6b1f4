//! Table provisioning.
//!
//! Idempotent-by-request wrappers over [`Store::create_table`] and
//! [`Store::delete_table`]: "already exists" and "not found" count as success
//! when the caller asks for it.

use tracing::info;

use tablestore_core::storage::{RepositoryError, Result, Store, StoreError, TableSchema};

/// The single-table layout every repository writes to.
pub fn table_schema(table_name: &str) -> TableSchema {
    TableSchema::single_table(table_name)
}

/// Creates the table. Returns `false` when it already existed and
/// `ignore_existing` was set.
pub async fn create_table(
    store: &dyn Store,
    schema: &TableSchema,
    ignore_existing: bool,
) -> Result<bool> {
    match store.create_table(schema).await {
        Ok(()) => Ok(true),
        Err(StoreError::TableAlreadyExists(_)) if ignore_existing => {
            info!(table = %schema.table_name, "Table already exists");
            Ok(false)
        }
        Err(e) => Err(RepositoryError::store(
            "create_table",
            format!("table={}", schema.table_name),
            e,
        )),
    }
}

/// Deletes the table. Returns `false` when it was already gone and
/// `ignore_missing` was set.
pub async fn delete_table(store: &dyn Store, table_name: &str, ignore_missing: bool) -> Result<bool> {
    match store.delete_table(table_name).await {
        Ok(()) => Ok(true),
        Err(StoreError::TableNotFound(_)) if ignore_missing => {
            info!(table = %table_name, "Table does not exist");
            Ok(false)
        }
        Err(e) => Err(RepositoryError::store(
            "delete_table",
            format!("table={table_name}"),
            e,
        )),
    }
}
