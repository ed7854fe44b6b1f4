//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to [`StoreError`] from `tablestore_core::storage`.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::batch_get_item::BatchGetItemError;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::operation::delete_table::DeleteTableError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::operation::update_time_to_live::UpdateTimeToLiveError;
use tablestore_core::storage::StoreError;

const THROUGHPUT_EXCEEDED: &str = "Throughput exceeded, please retry";
const REQUEST_LIMIT_EXCEEDED: &str = "Request limit exceeded, please retry";
const INTERNAL_SERVER_ERROR: &str = "DynamoDB internal server error";

/// Timeouts and dispatch failures never reached the service.
fn transport_error<E, R>(err: &SdkError<E, R>) -> Option<StoreError>
where
    E: Debug,
    R: Debug,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            Some(StoreError::Unavailable(format!("{err:?}")))
        }
        _ => None,
    }
}

/// Classifies service errors the SDK does not model as variants.
fn unmodeled<E: ProvideErrorMetadata + Debug>(operation: &str, err: E) -> StoreError {
    let message = err.message().unwrap_or_default().to_string();
    match err.code() {
        Some("ValidationException") => StoreError::Validation(message),
        Some("ThrottlingException") => StoreError::Throttled(message),
        Some("ConditionalCheckFailedException") => StoreError::ConditionalCheckFailed,
        _ => StoreError::Service(format!("{operation} failed: {err:?}")),
    }
}

/// Map a GetItem SDK error to StoreError.
pub fn map_get_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<GetItemError, R>,
    table_name: &str,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        GetItemError::ResourceNotFoundException(_) => {
            StoreError::TableNotFound(table_name.to_string())
        }
        GetItemError::ProvisionedThroughputExceededException(_) => {
            StoreError::Throttled(THROUGHPUT_EXCEEDED.to_string())
        }
        GetItemError::RequestLimitExceeded(_) => {
            StoreError::Throttled(REQUEST_LIMIT_EXCEEDED.to_string())
        }
        GetItemError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("GetItem", err),
    }
}

/// Map a Query SDK error to StoreError.
pub fn map_query_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<QueryError, R>,
    table_name: &str,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        QueryError::ResourceNotFoundException(_) => StoreError::TableNotFound(table_name.to_string()),
        QueryError::ProvisionedThroughputExceededException(_) => {
            StoreError::Throttled(THROUGHPUT_EXCEEDED.to_string())
        }
        QueryError::RequestLimitExceeded(_) => {
            StoreError::Throttled(REQUEST_LIMIT_EXCEEDED.to_string())
        }
        QueryError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("Query", err),
    }
}

/// Map a Scan SDK error to StoreError.
pub fn map_scan_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<ScanError, R>,
    table_name: &str,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        ScanError::ResourceNotFoundException(_) => StoreError::TableNotFound(table_name.to_string()),
        ScanError::ProvisionedThroughputExceededException(_) => {
            StoreError::Throttled(THROUGHPUT_EXCEEDED.to_string())
        }
        ScanError::RequestLimitExceeded(_) => {
            StoreError::Throttled(REQUEST_LIMIT_EXCEEDED.to_string())
        }
        ScanError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("Scan", err),
    }
}

/// Map a TransactWriteItems SDK error to StoreError.
///
/// Cancellations keep the per-item reason codes so the repository can tell a
/// failed version condition from any other cancellation.
pub fn map_transact_write_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<TransactWriteItemsError, R>,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        TransactWriteItemsError::TransactionCanceledException(canceled) => {
            StoreError::TransactionCanceled {
                reasons: canceled
                    .cancellation_reasons()
                    .iter()
                    .map(|reason| reason.code().unwrap_or("None").to_string())
                    .collect(),
            }
        }
        TransactWriteItemsError::TransactionInProgressException(_) => {
            StoreError::TransactionCanceled {
                reasons: vec!["TransactionConflict".to_string()],
            }
        }
        TransactWriteItemsError::ResourceNotFoundException(e) => {
            StoreError::TableNotFound(e.message().unwrap_or_default().to_string())
        }
        TransactWriteItemsError::ProvisionedThroughputExceededException(_) => {
            StoreError::Throttled(THROUGHPUT_EXCEEDED.to_string())
        }
        TransactWriteItemsError::RequestLimitExceeded(_) => {
            StoreError::Throttled(REQUEST_LIMIT_EXCEEDED.to_string())
        }
        TransactWriteItemsError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("TransactWriteItems", err),
    }
}

/// Map a BatchGetItem SDK error to StoreError.
pub fn map_batch_get_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<BatchGetItemError, R>,
    table_name: &str,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        BatchGetItemError::ResourceNotFoundException(_) => {
            StoreError::TableNotFound(table_name.to_string())
        }
        BatchGetItemError::ProvisionedThroughputExceededException(_) => {
            StoreError::Throttled(THROUGHPUT_EXCEEDED.to_string())
        }
        BatchGetItemError::RequestLimitExceeded(_) => {
            StoreError::Throttled(REQUEST_LIMIT_EXCEEDED.to_string())
        }
        BatchGetItemError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("BatchGetItem", err),
    }
}

/// Map a BatchWriteItem SDK error to StoreError.
pub fn map_batch_write_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<BatchWriteItemError, R>,
    table_name: &str,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        BatchWriteItemError::ResourceNotFoundException(_) => {
            StoreError::TableNotFound(table_name.to_string())
        }
        BatchWriteItemError::ProvisionedThroughputExceededException(_) => {
            StoreError::Throttled(THROUGHPUT_EXCEEDED.to_string())
        }
        BatchWriteItemError::RequestLimitExceeded(_) => {
            StoreError::Throttled(REQUEST_LIMIT_EXCEEDED.to_string())
        }
        BatchWriteItemError::ItemCollectionSizeLimitExceededException(_) => {
            StoreError::Validation("Item collection size limit exceeded".to_string())
        }
        BatchWriteItemError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("BatchWriteItem", err),
    }
}

/// Map a CreateTable SDK error to StoreError.
pub fn map_create_table_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<CreateTableError, R>,
    table_name: &str,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        CreateTableError::ResourceInUseException(_) => {
            StoreError::TableAlreadyExists(table_name.to_string())
        }
        CreateTableError::LimitExceededException(_) => {
            StoreError::Throttled("Table limit exceeded".to_string())
        }
        CreateTableError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("CreateTable", err),
    }
}

/// Map a DeleteTable SDK error to StoreError.
pub fn map_delete_table_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<DeleteTableError, R>,
    table_name: &str,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        DeleteTableError::ResourceNotFoundException(_) => {
            StoreError::TableNotFound(table_name.to_string())
        }
        DeleteTableError::ResourceInUseException(_) => {
            StoreError::Service(format!("Table {table_name} is busy"))
        }
        DeleteTableError::LimitExceededException(_) => {
            StoreError::Throttled("Table limit exceeded".to_string())
        }
        DeleteTableError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("DeleteTable", err),
    }
}

/// Map a DescribeTable SDK error to StoreError.
pub fn map_describe_table_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<DescribeTableError, R>,
    table_name: &str,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        DescribeTableError::ResourceNotFoundException(_) => {
            StoreError::TableNotFound(table_name.to_string())
        }
        DescribeTableError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("DescribeTable", err),
    }
}

/// Map an UpdateTimeToLive SDK error to StoreError.
pub fn map_update_ttl_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<UpdateTimeToLiveError, R>,
    table_name: &str,
) -> StoreError {
    if let Some(error) = transport_error(&err) {
        return error;
    }
    match err.into_service_error() {
        UpdateTimeToLiveError::ResourceNotFoundException(_) => {
            StoreError::TableNotFound(table_name.to_string())
        }
        UpdateTimeToLiveError::InternalServerError(_) => {
            StoreError::Unavailable(INTERNAL_SERVER_ERROR.to_string())
        }
        err => unmodeled("UpdateTimeToLive", err),
    }
}

/// Map an SDK builder error (missing required field) to StoreError.
pub fn map_build_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Validation(err.to_string())
}
