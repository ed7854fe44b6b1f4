mod error;
mod http_mapping;
mod traits;
mod types;

pub use error::{RepositoryError, Result, StoreError, StoreResult};
pub use http_mapping::repository_error_to_status_code;
pub use traits::Store;
pub use types::{
    LocalIndex, QueryOutput, QueryRequest, ScanRequest, TableSchema, TransactWrite, WriteRequest,
    BATCH_GET_LIMIT, BATCH_WRITE_LIMIT,
};
