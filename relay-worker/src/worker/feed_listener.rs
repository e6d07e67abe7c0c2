//! Pending-entry feed consumer with automatic reconnection.

use std::sync::Arc;
use std::time::Duration;

use outbox_storage::outbox::OutboxEntry;
use outbox_storage::watch::{ChangeKind, EntryChange, FeedError, FeedEvent, FeedSource};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::dispatch_ledger::DispatchLedger;

/// Entry ids remembered for duplicate suppression
const DISPATCH_LEDGER_CAPACITY: usize = 4096;

/// Configuration for the feed listener
#[derive(Debug, Clone)]
pub struct FeedListenerConfig {
    /// Initial reconnection delay
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
}

/// How one feed subscription ended
enum StreamFailure {
    /// The subscription reported an error; reconnect after backoff
    Feed(FeedError),
    /// The processor channel closed; the worker is shutting down
    ChannelClosed,
}

/// `FeedListener` owns the live subscription to the pending view and the
/// reconnect state (backoff schedule, dispatch ledger). It is the single
/// consumer of feed events; accepted entries are handed to the processor
/// pool over the entry channel.
pub struct FeedListener {
    feed: Arc<dyn FeedSource>,
    entry_tx: flume::Sender<OutboxEntry>,
    ledger: DispatchLedger,
    backoff: Backoff,
    shutdown_token: CancellationToken,
}

impl FeedListener {
    /// Creates a new `FeedListener`
    #[must_use]
    pub fn new(
        feed: Arc<dyn FeedSource>,
        entry_tx: flume::Sender<OutboxEntry>,
        config: &FeedListenerConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            feed,
            entry_tx,
            ledger: DispatchLedger::new(DISPATCH_LEDGER_CAPACITY),
            backoff: Backoff::new(config.reconnect_delay, config.max_reconnect_delay),
            shutdown_token,
        }
    }

    /// Runs the listener with automatic reconnection until shutdown
    ///
    /// A feed error never ends the worker: the listener waits out the
    /// current backoff delay, doubles it (capped), and resubscribes. Every
    /// received snapshot resets the delay to its floor.
    ///
    /// # Errors
    ///
    /// Returns an error only if the entry channel closes underneath the
    /// listener, which means the processors are gone.
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            if self.shutdown_token.is_cancelled() {
                info!("Feed listener shutting down");
                return Ok(());
            }

            match self.consume_feed().await {
                Ok(()) => {
                    if self.shutdown_token.is_cancelled() {
                        info!("Feed listener shutting down");
                        return Ok(());
                    }
                    warn!("Pending-entry feed ended unexpectedly, resubscribing...");
                    self.backoff.reset();
                }
                Err(StreamFailure::ChannelClosed) => {
                    return Err(anyhow::anyhow!("Entry channel closed"));
                }
                Err(StreamFailure::Feed(e)) => {
                    let delay = self.backoff.next_delay();
                    // Transient transport conditions are expected operational
                    // noise; both classes take the same recovery path.
                    if e.is_transient() {
                        warn!(
                            "Transient feed error: {}, resubscribing in {}ms",
                            e,
                            delay.as_millis()
                        );
                    } else {
                        error!("Feed error: {}, resubscribing in {}ms", e, delay.as_millis());
                    }

                    tokio::select! {
                        () = self.shutdown_token.cancelled() => {
                            info!("Feed listener shutting down during reconnect delay");
                            return Ok(());
                        }
                        () = sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Opens a fresh subscription and consumes its events until it ends
    ///
    /// The previous subscription handle is dropped before this is called
    /// again, so there is never more than one live feed.
    async fn consume_feed(&mut self) -> Result<(), StreamFailure> {
        let mut subscription = self.feed.subscribe().await.map_err(StreamFailure::Feed)?;

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    subscription.cancel();
                    return Ok(());
                }
                event = subscription.next_event() => match event {
                    Some(FeedEvent::Batch(changes)) => {
                        // A live snapshot, even an empty one, means the feed
                        // is healthy.
                        self.backoff.reset();
                        self.dispatch_batch(changes).await?;
                    }
                    Some(FeedEvent::Error(e)) => {
                        subscription.cancel();
                        return Err(StreamFailure::Feed(e));
                    }
                    None => return Ok(()),
                }
            }
        }
    }

    /// Hands the `added` entries of one snapshot batch to the processors
    async fn dispatch_batch(&mut self, changes: Vec<EntryChange>) -> Result<(), StreamFailure> {
        for change in changes {
            if change.kind != ChangeKind::Added {
                debug!(
                    "Ignoring {:?} change for entry {}",
                    change.kind, change.entry.entry_id
                );
                continue;
            }

            let entry = change.entry;
            if !self.ledger.try_dispatch(&entry.entry_id) {
                debug!("Entry {} already dispatched, skipping", entry.entry_id);
                continue;
            }

            if self.entry_tx.send_async(entry).await.is_err() {
                error!("Failed to hand entry to processors: channel closed");
                return Err(StreamFailure::ChannelClosed);
            }
        }

        Ok(())
    }
}
