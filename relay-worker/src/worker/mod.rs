pub mod backoff;
pub mod dispatch_ledger;
pub mod entry_processor;
pub mod feed_listener;

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use outbox_storage::outbox::{OutboxEntry, OutboxStorage, OutboxWriter};
use outbox_storage::watch::{FeedSource, OutboxWatcher};
use teloxide::Bot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::sink::{DeliverySink, TelegramSink};
use crate::types::environment::Environment;

use self::entry_processor::EntryProcessor;
use self::feed_listener::{FeedListener, FeedListenerConfig};

/// Relay worker that bridges the outbox's pending view to the delivery sink
pub struct RelayWorker {
    env: Environment,
    feed: Arc<dyn FeedSource>,
    sink: Arc<dyn DeliverySink>,
    outbox: Arc<dyn OutboxWriter>,
    bot: Bot,
    shutdown_token: CancellationToken,
}

impl RelayWorker {
    /// Creates a new relay worker from the ambient configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the Telegram credential is missing; there is no
    /// partial operation mode.
    pub async fn new(env: Environment) -> anyhow::Result<Self> {
        let token = env.telegram_bot_token()?;
        let bot = Bot::new(token);

        info!(
            "Using outbox table {} (pending view via {})",
            env.outbox_table_name(),
            env.outbox_status_gsi_name()
        );

        let dynamodb_client = Arc::new(DynamoDbClient::new(&env.aws_config().await));
        let storage = Arc::new(OutboxStorage::new(
            dynamodb_client,
            env.outbox_table_name(),
            env.outbox_status_gsi_name(),
        ));
        let watcher = Arc::new(OutboxWatcher::new(
            Arc::clone(&storage),
            Duration::from_millis(env.poll_interval_ms()),
        ));

        Ok(Self {
            env,
            feed: watcher,
            sink: Arc::new(TelegramSink::new(bot.clone())),
            outbox: storage,
            bot,
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Returns a clone of the shutdown token for external control
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Returns a clone of the bot client for the command listener
    #[must_use]
    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Starts the worker and all components
    ///
    /// # Errors
    ///
    /// Returns an error if the feed listener dies on a closed entry channel.
    pub async fn start(self) -> anyhow::Result<()> {
        info!(
            "Starting relay worker with {} entry processors",
            self.env.num_entry_processors()
        );

        let (entry_tx, entry_rx) = flume::bounded::<OutboxEntry>(self.env.entry_channel_capacity());
        let processor_handles = self.spawn_processors(&entry_rx);

        let listener = FeedListener::new(
            Arc::clone(&self.feed),
            entry_tx,
            &FeedListenerConfig {
                reconnect_delay: Duration::from_millis(self.env.reconnect_delay_ms()),
                max_reconnect_delay: Duration::from_millis(self.env.max_reconnect_delay_ms()),
            },
            self.shutdown_token.clone(),
        );
        let listener_result = listener.run().await;
        if let Err(e) = &listener_result {
            error!("Feed listener error: {}", e);
        }

        self.shutdown_token.cancel();
        info!("Relay worker shutdown initiated");

        for handle in processor_handles {
            if let Err(e) = handle.await {
                error!("Processor task error: {}", e);
            }
        }
        info!("All relay worker components stopped");

        listener_result
    }

    /// Spawns entry processor tasks
    fn spawn_processors(&self, receiver: &flume::Receiver<OutboxEntry>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for i in 0..self.env.num_entry_processors() {
            let processor =
                EntryProcessor::new(i, Arc::clone(&self.sink), Arc::clone(&self.outbox));
            let rx = receiver.clone();
            let shutdown_token = self.shutdown_token.clone();

            let handle = tokio::spawn(async move {
                processor.run(rx, shutdown_token).await;
            });

            handles.push(handle);
        }

        handles
    }
}
