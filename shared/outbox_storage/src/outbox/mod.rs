//! Outbox entry storage integration using Dynamo DB
//!
//! The outbox holds one document per outbound message. Entries are created
//! as `pending` by an external producer and transitioned exactly once to
//! `sent` or `error` by the relay worker.

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

mod error;

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeValue, Select},
    Client as DynamoDbClient,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub use error::{OutboxStorageError, OutboxStorageResult};
use strum::Display;

/// Attribute names for the outbox table
#[derive(Debug, Clone, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OutboxAttribute {
    /// Opaque unique entry id (Primary Key)
    EntryId,
    /// Recipient chat identifier
    RecipientId,
    /// Message body, may contain simple Markdown markup
    Body,
    /// Delivery status. This field is a Global Secondary Index,
    /// which backs the pending view the relay worker subscribes to.
    Status,
    /// Creation timestamp
    CreatedAt,
    /// Delivery timestamp, set on success
    SentAt,
    /// Sink failure text, set on failure
    ErrorMessage,
}

/// Delivery status of an outbox entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutboxStatus {
    /// Waiting for delivery
    Pending,
    /// Delivered to the sink
    Sent,
    /// Delivery failed, terminal
    Error,
}

/// Outbox entry data structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Opaque unique entry id (Primary Key)
    pub entry_id: String,
    /// Recipient chat identifier
    pub recipient_id: String,
    /// Message body
    pub body: String,
    /// Delivery status (Global Secondary Index)
    pub status: OutboxStatus,
    /// Creation timestamp (Unix timestamp in seconds)
    pub created_at: i64,
    /// Delivery timestamp (Unix timestamp in seconds), set on success
    pub sent_at: Option<i64>,
    /// Sink failure text, set on failure
    pub error_message: Option<String>,
}

impl OutboxEntry {
    /// Creates a new pending entry with the storage-layer clock
    #[must_use]
    pub fn pending(entry_id: &str, recipient_id: &str, body: &str) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            recipient_id: recipient_id.to_string(),
            body: body.to_string(),
            status: OutboxStatus::Pending,
            created_at: Utc::now().timestamp(),
            sent_at: None,
            error_message: None,
        }
    }
}

/// Write-back seam used by the relay worker to record delivery outcomes
#[async_trait]
pub trait OutboxWriter: Send + Sync {
    /// Marks an entry as delivered, stamping the sent timestamp
    async fn mark_sent(&self, entry_id: &str) -> OutboxStorageResult<()>;

    /// Marks an entry as failed, recording the sink's failure text
    async fn mark_error(&self, entry_id: &str, message: &str) -> OutboxStorageResult<()>;
}

/// Outbox storage client for Dynamo DB operations
pub struct OutboxStorage {
    dynamodb_client: Arc<DynamoDbClient>,
    table_name: String,
    status_gsi_name: String,
}

impl OutboxStorage {
    /// Creates a new outbox storage client
    ///
    /// # Arguments
    ///
    /// * `dynamodb_client` - Pre-configured Dynamo DB client
    /// * `table_name` - Dynamo DB table name for outbox entries
    /// * `status_gsi_name` - Global Secondary Index name for status queries
    #[must_use]
    pub const fn new(
        dynamodb_client: Arc<DynamoDbClient>,
        table_name: String,
        status_gsi_name: String,
    ) -> Self {
        Self {
            dynamodb_client,
            table_name,
            status_gsi_name,
        }
    }

    /// Inserts a new outbox entry
    ///
    /// Entry creation is the producer's side of the contract; the relay
    /// worker itself never inserts.
    ///
    /// # Errors
    ///
    /// Returns `OutboxStorageError::EntryExists` if an entry with the same id
    /// is already stored, or another `OutboxStorageError` if the Dynamo DB
    /// operation fails
    pub async fn insert(&self, entry: &OutboxEntry) -> OutboxStorageResult<()> {
        let item = serde_dynamo::to_item(entry)
            .map_err(|e| OutboxStorageError::SerializationError(e.to_string()))?;

        self.dynamodb_client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#pk)")
            .expression_attribute_names("#pk", OutboxAttribute::EntryId.to_string())
            .send()
            .await
            .map_err(|err| {
                if matches!(
                    err,
                    SdkError::ServiceError(ref svc) if svc.err().is_conditional_check_failed_exception()
                ) {
                    OutboxStorageError::EntryExists
                } else {
                    err.into()
                }
            })?;

        Ok(())
    }

    /// Gets an outbox entry by id
    ///
    /// # Errors
    ///
    /// Returns `OutboxStorageError` if the Dynamo DB operation fails
    pub async fn get(&self, entry_id: &str) -> OutboxStorageResult<Option<OutboxEntry>> {
        let response = self
            .dynamodb_client
            .get_item()
            .table_name(&self.table_name)
            .key(
                OutboxAttribute::EntryId.to_string(),
                AttributeValue::S(entry_id.to_string()),
            )
            .send()
            .await?;

        let entry = response
            .item()
            .map(|item| serde_dynamo::from_item(item.clone()))
            .transpose()
            .map_err(|e| OutboxStorageError::SerializationError(e.to_string()))?;

        Ok(entry)
    }

    /// Gets all entries currently in the pending view
    ///
    /// Entries that fail to decode are logged and skipped rather than
    /// failing the whole snapshot.
    ///
    /// # Errors
    ///
    /// Returns `OutboxStorageError` if the Dynamo DB operation fails
    pub async fn get_pending(&self) -> OutboxStorageResult<Vec<OutboxEntry>> {
        let response = self
            .dynamodb_client
            .query()
            .table_name(&self.table_name)
            .index_name(&self.status_gsi_name)
            .key_condition_expression("#status = :status")
            .expression_attribute_names("#status", OutboxAttribute::Status.to_string())
            .expression_attribute_values(
                ":status",
                AttributeValue::S(OutboxStatus::Pending.to_string()),
            )
            .select(Select::AllAttributes)
            .send()
            .await?;

        let entries = response
            .items()
            .iter()
            .filter_map(|item| match serde_dynamo::from_item(item.clone()) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::error!("Failed to decode outbox entry, skipping: {}", e);
                    None
                }
            })
            .collect();

        Ok(entries)
    }
}

#[async_trait]
impl OutboxWriter for OutboxStorage {
    /// Conditionally transitions a pending entry to `sent`
    ///
    /// The sent timestamp is stamped here, at write time, so the consumer's
    /// clock never leaks into the stored entry.
    async fn mark_sent(&self, entry_id: &str) -> OutboxStorageResult<()> {
        self.dynamodb_client
            .update_item()
            .table_name(&self.table_name)
            .key(
                OutboxAttribute::EntryId.to_string(),
                AttributeValue::S(entry_id.to_string()),
            )
            .update_expression("SET #status = :sent, #sent_at = :sent_at")
            .condition_expression("#status = :pending")
            .expression_attribute_names("#status", OutboxAttribute::Status.to_string())
            .expression_attribute_names("#sent_at", OutboxAttribute::SentAt.to_string())
            .expression_attribute_values(
                ":sent",
                AttributeValue::S(OutboxStatus::Sent.to_string()),
            )
            .expression_attribute_values(
                ":pending",
                AttributeValue::S(OutboxStatus::Pending.to_string()),
            )
            .expression_attribute_values(
                ":sent_at",
                AttributeValue::N(Utc::now().timestamp().to_string()),
            )
            .send()
            .await
            .map_err(|err| {
                if matches!(
                    err,
                    SdkError::ServiceError(ref svc) if svc.err().is_conditional_check_failed_exception()
                ) {
                    OutboxStorageError::EntryNotPending
                } else {
                    err.into()
                }
            })?;

        Ok(())
    }

    /// Conditionally transitions a pending entry to `error`, recording the
    /// sink's failure text
    async fn mark_error(&self, entry_id: &str, message: &str) -> OutboxStorageResult<()> {
        self.dynamodb_client
            .update_item()
            .table_name(&self.table_name)
            .key(
                OutboxAttribute::EntryId.to_string(),
                AttributeValue::S(entry_id.to_string()),
            )
            .update_expression("SET #status = :error, #error_message = :error_message")
            .condition_expression("#status = :pending")
            .expression_attribute_names("#status", OutboxAttribute::Status.to_string())
            .expression_attribute_names(
                "#error_message",
                OutboxAttribute::ErrorMessage.to_string(),
            )
            .expression_attribute_values(
                ":error",
                AttributeValue::S(OutboxStatus::Error.to_string()),
            )
            .expression_attribute_values(
                ":pending",
                AttributeValue::S(OutboxStatus::Pending.to_string()),
            )
            .expression_attribute_values(
                ":error_message",
                AttributeValue::S(message.to_string()),
            )
            .send()
            .await
            .map_err(|err| {
                if matches!(
                    err,
                    SdkError::ServiceError(ref svc) if svc.err().is_conditional_check_failed_exception()
                ) {
                    OutboxStorageError::EntryNotPending
                } else {
                    err.into()
                }
            })?;

        Ok(())
    }
}
