//! Per-entry delivery and outcome recording.

use std::sync::Arc;

use outbox_storage::outbox::{OutboxEntry, OutboxWriter};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::sink::{DeliverySink, MessageFormat};

/// `EntryProcessor` drives one delivery attempt per received entry and
/// records the terminal status on the outbox
pub struct EntryProcessor {
    worker_id: usize,
    sink: Arc<dyn DeliverySink>,
    outbox: Arc<dyn OutboxWriter>,
}

impl EntryProcessor {
    /// Creates a new `EntryProcessor`
    #[must_use]
    pub fn new(worker_id: usize, sink: Arc<dyn DeliverySink>, outbox: Arc<dyn OutboxWriter>) -> Self {
        Self {
            worker_id,
            sink,
            outbox,
        }
    }

    /// Runs the processor loop
    ///
    /// Shutdown is only observed between entries; an in-flight delivery
    /// always runs to completion.
    pub async fn run(&self, receiver: flume::Receiver<OutboxEntry>, shutdown_token: CancellationToken) {
        info!("Entry processor {} started", self.worker_id);

        loop {
            tokio::select! {
                () = shutdown_token.cancelled() => {
                    info!("Entry processor {} received shutdown signal", self.worker_id);
                    break;
                }
                result = receiver.recv_async() => {
                    match result {
                        Ok(entry) => self.process_entry(&entry).await,
                        Err(flume::RecvError::Disconnected) => {
                            info!("Entry channel closed for processor {}", self.worker_id);
                            break;
                        }
                    }
                }
            }
        }

        info!("Entry processor {} stopped", self.worker_id);
    }

    /// Delivers a single entry and records the outcome
    ///
    /// Delivery gets exactly one attempt. The status write is fire-and-forget
    /// relative to delivery: its failure is logged, never retried, and does
    /// not undo a delivery that already happened.
    pub async fn process_entry(&self, entry: &OutboxEntry) {
        match self
            .sink
            .send(&entry.recipient_id, &entry.body, MessageFormat::Markdown)
            .await
        {
            Ok(()) => {
                info!(
                    "Worker {} delivered entry {} to recipient {}",
                    self.worker_id, entry.entry_id, entry.recipient_id
                );
                if let Err(e) = self.outbox.mark_sent(&entry.entry_id).await {
                    error!(
                        "Worker {} failed to record sent status for entry {}: {}",
                        self.worker_id, entry.entry_id, e
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Worker {} delivery failed for entry {}: {}",
                    self.worker_id, entry.entry_id, e
                );
                if let Err(write_err) = self.outbox.mark_error(&entry.entry_id, &e.to_string()).await
                {
                    error!(
                        "Worker {} failed to record error status for entry {}: {}",
                        self.worker_id, entry.entry_id, write_err
                    );
                }
            }
        }
    }
}
