//! Delivery sink contract
//!
//! The sink is the messaging endpoint the relay delivers to. One attempt per
//! entry; the failure text of a rejected delivery is recorded verbatim on
//! the outbox entry, so `Display` for a delivery failure must be the raw
//! reason with no decoration.

mod telegram;

use async_trait::async_trait;
use thiserror::Error;

pub use telegram::TelegramSink;

/// Body format flag of the sink contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Plain text
    Plain,
    /// Simple Markdown markup
    Markdown,
}

/// Error types for delivery attempts
#[derive(Error, Debug)]
pub enum SinkError {
    /// The recipient identifier could not be interpreted by the sink
    #[error("Invalid recipient id: {0}")]
    InvalidRecipient(String),

    /// The endpoint rejected or could not complete the delivery
    #[error("{0}")]
    Delivery(String),
}

/// A messaging endpoint capable of sending a formatted message to a
/// recipient identifier
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Sends `body` to the recipient; exactly one attempt, no retries
    async fn send(
        &self,
        recipient_id: &str,
        body: &str,
        format: MessageFormat,
    ) -> Result<(), SinkError>;
}
