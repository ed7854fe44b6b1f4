//! Generic persistence engine over a single wide-column table.
//!
//! Typed models are stored as rows of one shared table keyed by `hk`/`rk`,
//! with five local secondary indexes, optimistic concurrency on a version
//! column, cursor pagination and domain-event publication after commit.
//! The pure building blocks live in `tablestore_core`; this crate adds the
//! repository, the store backends, and configuration.

pub mod config;
pub mod events;
pub mod provision;
pub mod repository;
pub mod storage;

pub use config::Config;
pub use repository::{
    DeleteOptions, ModelKey, QueryOptions, Repository, SaveOptions, SaveOutcome, ScanOptions,
    VersionPolicy,
};

pub use tablestore_core::expression::{CompareOp, FilterBuilder, FilterCondition, RangeKeyCondition};
pub use tablestore_core::storage::{RepositoryError, Result};
pub use tablestore_core::{IndexData, Model, Page, VersionStamp};
