//! Live-updating view over pending outbox entries
//!
//! Dynamo DB has no change feed for GSI queries, so the live view is a poll
//! loop: each tick queries the pending view and diffs it against the last
//! observed snapshot, classifying every difference as an added, modified or
//! removed entry. Consumers receive classified batches over a channel; a
//! query failure ends the subscription and it is the consumer's job to
//! resubscribe.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::outbox::{OutboxEntry, OutboxStorage, OutboxStorageError};

/// Capacity of the event channel between the poll task and the subscriber
const FEED_CHANNEL_CAPACITY: usize = 16;

/// How an entry's presence in the pending view changed between snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The entry appeared in the pending view
    Added,
    /// The entry is still pending but its content changed
    Modified,
    /// The entry left the pending view
    Removed,
}

/// A single classified change, carrying the affected entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryChange {
    /// Change classification
    pub kind: ChangeKind,
    /// The entry as last observed
    pub entry: OutboxEntry,
}

/// Error types for the live view
#[derive(Error, Debug)]
pub enum FeedError {
    /// The pending-view query failed
    #[error("Pending-view query failed: {0}")]
    Query(#[from] OutboxStorageError),

    /// The subscription could not be established
    #[error("Subscription failed: {0}")]
    Subscribe(String),
}

impl FeedError {
    /// Whether this error is a reconnect-worthy transport-level condition,
    /// as opposed to a configuration or decoding problem. The distinction
    /// only affects log severity in the consumer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Query(err) => err.is_transient(),
            Self::Subscribe(_) => false,
        }
    }
}

/// Events delivered on a feed subscription
#[derive(Debug)]
pub enum FeedEvent {
    /// A batch of classified changes. The initial snapshot of a new
    /// subscription arrives as one batch of `Added` changes, possibly empty.
    Batch(Vec<EntryChange>),
    /// The subscription failed; no further events will arrive
    Error(FeedError),
}

/// Handle for one live subscription to the pending view
///
/// At most one subscription is active per consumer; dropping or cancelling
/// the handle stops the poll task, so replacing a subscription is
/// close-before-open by construction.
pub struct FeedSubscription {
    events: mpsc::Receiver<FeedEvent>,
    cancel: CancellationToken,
}

impl FeedSubscription {
    /// Creates a subscription from its event channel and cancel token
    #[must_use]
    pub const fn new(events: mpsc::Receiver<FeedEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Waits for the next feed event; `None` means the feed closed
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Releases the subscription; idempotent
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Source of live subscriptions to the pending view
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Opens a fresh subscription
    async fn subscribe(&self) -> Result<FeedSubscription, FeedError>;
}

/// Polling watcher over the outbox's pending view
pub struct OutboxWatcher {
    storage: Arc<OutboxStorage>,
    poll_interval: Duration,
}

impl OutboxWatcher {
    /// Creates a new watcher
    #[must_use]
    pub const fn new(storage: Arc<OutboxStorage>, poll_interval: Duration) -> Self {
        Self {
            storage,
            poll_interval,
        }
    }
}

#[async_trait]
impl FeedSource for OutboxWatcher {
    async fn subscribe(&self) -> Result<FeedSubscription, FeedError> {
        let (event_tx, event_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let storage = Arc::clone(&self.storage);
        let poll_interval = self.poll_interval;
        let poll_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut seen: HashMap<String, OutboxEntry> = HashMap::new();
            let mut first_snapshot = true;

            loop {
                if poll_cancel.is_cancelled() {
                    debug!("Pending-view subscription cancelled");
                    break;
                }

                match storage.get_pending().await {
                    Ok(entries) => {
                        let changes = diff_pending(&mut seen, entries);
                        // The initial snapshot is always delivered, even when
                        // empty; later ticks only report actual changes.
                        if first_snapshot || !changes.is_empty() {
                            if event_tx.send(FeedEvent::Batch(changes)).await.is_err() {
                                break;
                            }
                        }
                        first_snapshot = false;
                    }
                    Err(err) => {
                        let _ = event_tx.send(FeedEvent::Error(err.into())).await;
                        break;
                    }
                }

                tokio::select! {
                    () = poll_cancel.cancelled() => break,
                    () = sleep(poll_interval) => {}
                }
            }
        });

        Ok(FeedSubscription::new(event_rx, cancel))
    }
}

/// Diffs the current pending view against the previous snapshot, updating
/// the snapshot in place
fn diff_pending(
    seen: &mut HashMap<String, OutboxEntry>,
    current: Vec<OutboxEntry>,
) -> Vec<EntryChange> {
    let mut changes = Vec::new();
    let mut current_ids: HashSet<String> = HashSet::with_capacity(current.len());

    for entry in current {
        match seen.get(&entry.entry_id) {
            None => changes.push(EntryChange {
                kind: ChangeKind::Added,
                entry: entry.clone(),
            }),
            Some(previous) if previous != &entry => changes.push(EntryChange {
                kind: ChangeKind::Modified,
                entry: entry.clone(),
            }),
            Some(_) => {}
        }
        current_ids.insert(entry.entry_id.clone());
        seen.insert(entry.entry_id.clone(), entry);
    }

    let departed: Vec<String> = seen
        .keys()
        .filter(|id| !current_ids.contains(*id))
        .cloned()
        .collect();
    for entry_id in departed {
        if let Some(entry) = seen.remove(&entry_id) {
            changes.push(EntryChange {
                kind: ChangeKind::Removed,
                entry,
            });
        }
    }

    changes
}
