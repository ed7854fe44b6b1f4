//! Store backend implementations.
//!
//! This module provides concrete implementations of the `Store` trait
//! defined in `tablestore_core::storage`. Backends are selected at compile
//! time via feature flags.
//!
//! # Feature Flags
//!
//! - `inmemory` (default): in-process store with the same limit, condition
//!   and pagination semantics as the real one
//! - `dynamodb`: AWS DynamoDB backend using `aws-sdk-dynamodb`
//!
//! Unlike repository backends, both stores can be compiled in together: the
//! repository takes any `Arc<dyn Store>`.
//!
//! # Examples
//!
//! Build with DynamoDB:
//! ```bash
//! cargo build -p tablestore --features dynamodb
//! ```

#[cfg(not(any(feature = "inmemory", feature = "dynamodb")))]
compile_error!(
    "No store backend selected. Enable 'inmemory' or 'dynamodb' feature. \
    Example: cargo build -p tablestore --features dynamodb"
);

#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryStore;

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbStore;
