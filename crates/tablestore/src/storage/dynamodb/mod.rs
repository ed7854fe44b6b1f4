//! DynamoDB storage backend.
//!
//! Implements [`Store`](tablestore_core::storage::Store) on top of
//! `aws-sdk-dynamodb`. Unprocessed batch keys and items are resubmitted here,
//! so callers only ever see complete batches or an error.

mod client;
mod conversions;
mod error;
mod store;

pub use client::{create_client, AwsConfig};
pub use store::DynamoDbStore;
