use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use thiserror::Error;

/// Result type alias for outbox storage operations
pub type OutboxStorageResult<T> = Result<T, OutboxStorageError>;

/// Error types for outbox storage operations
#[derive(Error, Debug)]
pub enum OutboxStorageError {
    /// Error storing an entry in Dynamo DB
    #[error("Failed to store outbox entry")]
    PutEntry(#[from] SdkError<PutItemError>),

    /// Error loading an entry from Dynamo DB
    #[error("Failed to load outbox entry")]
    GetEntry(#[from] SdkError<GetItemError>),

    /// Error querying the pending view
    #[error("Failed to query pending outbox entries")]
    QueryPending(#[from] SdkError<QueryError>),

    /// Error updating an entry in Dynamo DB
    #[error("Failed to update outbox entry")]
    UpdateEntry(#[from] SdkError<UpdateItemError>),

    /// Error converting an entry to or from a Dynamo DB item
    #[error("Failed to serialize outbox entry: {0}")]
    SerializationError(String),

    /// An entry with the same id already exists
    #[error("Outbox entry already exists")]
    EntryExists,

    /// The entry left the pending state before the update was applied
    #[error("Outbox entry is not pending")]
    EntryNotPending,
}

impl OutboxStorageError {
    /// Checks if this error represents a transport-level condition (timeout,
    /// dispatch failure, 5xx response) worth reconnecting over
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::PutEntry(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::GetEntry(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::QueryPending(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::UpdateEntry(sdk_err) => Self::check_sdk_error_status(sdk_err),
            _ => false,
        }
    }

    fn check_sdk_error_status<E>(sdk_err: &SdkError<E>) -> bool {
        match sdk_err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => true,
            SdkError::ServiceError(err) => {
                let raw = err.raw();
                let status = raw.status();
                status.as_u16() >= 500
            }
            _ => false,
        }
    }
}
