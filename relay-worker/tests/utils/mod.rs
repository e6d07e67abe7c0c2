#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use outbox_storage::outbox::{
    OutboxEntry, OutboxStatus, OutboxStorageError, OutboxStorageResult, OutboxWriter,
};
use outbox_storage::watch::{
    ChangeKind, EntryChange, FeedError, FeedEvent, FeedSource, FeedSubscription,
};
use relay_worker::sink::{DeliverySink, MessageFormat, SinkError};
use relay_worker::worker::entry_processor::EntryProcessor;
use relay_worker::worker::feed_listener::{FeedListener, FeedListenerConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Builds a pending entry the way a producer would store it
pub fn pending_entry(entry_id: &str, recipient_id: &str, body: &str) -> OutboxEntry {
    OutboxEntry {
        entry_id: entry_id.to_string(),
        recipient_id: recipient_id.to_string(),
        body: body.to_string(),
        status: OutboxStatus::Pending,
        created_at: chrono::Utc::now().timestamp(),
        sent_at: None,
        error_message: None,
    }
}

pub fn added(entry: OutboxEntry) -> EntryChange {
    EntryChange {
        kind: ChangeKind::Added,
        entry,
    }
}

pub fn modified(entry: OutboxEntry) -> EntryChange {
    EntryChange {
        kind: ChangeKind::Modified,
        entry,
    }
}

pub fn removed(entry: OutboxEntry) -> EntryChange {
    EntryChange {
        kind: ChangeKind::Removed,
        entry,
    }
}

/// Delivery sink double that records every call and can be told to reject
/// specific recipients
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<(String, String)>>,
    failures: Mutex<HashMap<String, String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every send to `recipient_id` fail with `reason`
    pub fn fail_recipient(&self, recipient_id: &str, reason: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(recipient_id.to_string(), reason.to_string());
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn send_count(&self, recipient_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(recipient, _)| recipient == recipient_id)
            .count()
    }

    pub fn total_sends(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send(
        &self,
        recipient_id: &str,
        body: &str,
        _format: MessageFormat,
    ) -> Result<(), SinkError> {
        self.calls
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), body.to_string()));

        if let Some(reason) = self.failures.lock().unwrap().get(recipient_id) {
            return Err(SinkError::Delivery(reason.clone()));
        }
        Ok(())
    }
}

/// Terminal status recorded by the outbox double
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOutcome {
    Sent,
    Error(String),
}

/// Outbox write-back double; records successful status writes and can
/// simulate the store rejecting them
#[derive(Default)]
pub struct RecordingOutbox {
    outcomes: Mutex<Vec<(String, RecordedOutcome)>>,
    write_attempts: Mutex<usize>,
    fail_writes: Mutex<bool>,
}

impl RecordingOutbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every subsequent status write fail
    pub fn fail_status_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }

    pub fn outcomes(&self) -> Vec<(String, RecordedOutcome)> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn outcome_for(&self, entry_id: &str) -> Option<RecordedOutcome> {
        self.outcomes
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == entry_id)
            .map(|(_, outcome)| outcome.clone())
    }

    pub fn write_attempts(&self) -> usize {
        *self.write_attempts.lock().unwrap()
    }
}

#[async_trait]
impl OutboxWriter for RecordingOutbox {
    async fn mark_sent(&self, entry_id: &str) -> OutboxStorageResult<()> {
        *self.write_attempts.lock().unwrap() += 1;
        if *self.fail_writes.lock().unwrap() {
            return Err(OutboxStorageError::SerializationError(
                "simulated status-write failure".to_string(),
            ));
        }
        self.outcomes
            .lock()
            .unwrap()
            .push((entry_id.to_string(), RecordedOutcome::Sent));
        Ok(())
    }

    async fn mark_error(&self, entry_id: &str, message: &str) -> OutboxStorageResult<()> {
        *self.write_attempts.lock().unwrap() += 1;
        if *self.fail_writes.lock().unwrap() {
            return Err(OutboxStorageError::SerializationError(
                "simulated status-write failure".to_string(),
            ));
        }
        self.outcomes.lock().unwrap().push((
            entry_id.to_string(),
            RecordedOutcome::Error(message.to_string()),
        ));
        Ok(())
    }
}

/// Feed source double replaying one scripted event sequence per
/// subscription; once the scripts run out, subscriptions stay open and
/// silent so the listener parks
pub struct ScriptedFeed {
    scripts: Mutex<VecDeque<Vec<FeedEvent>>>,
    subscribed_at: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedFeed {
    pub fn new(scripts: Vec<Vec<FeedEvent>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            subscribed_at: Mutex::new(Vec::new()),
        })
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribed_at.lock().unwrap().len()
    }

    /// Instants at which each subscription was opened, for backoff timing
    /// assertions under a paused clock
    pub fn subscribed_at(&self) -> Vec<tokio::time::Instant> {
        self.subscribed_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn subscribe(&self) -> Result<FeedSubscription, FeedError> {
        self.subscribed_at
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());

        let script = self.scripts.lock().unwrap().pop_front();
        let (event_tx, event_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        tokio::spawn(async move {
            match script {
                Some(events) => {
                    for event in events {
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                None => {
                    // Hold the sender open so the subscription never ends.
                    let _event_tx = event_tx;
                    std::future::pending::<()>().await;
                }
            }
        });

        Ok(FeedSubscription::new(event_rx, cancel))
    }
}

/// A running listener + processor pipeline against test doubles
pub struct RelayTestHarness {
    pub sink: Arc<RecordingSink>,
    pub outbox: Arc<RecordingOutbox>,
    pub shutdown_token: CancellationToken,
    listener_handle: JoinHandle<anyhow::Result<()>>,
    processor_handles: Vec<JoinHandle<()>>,
}

impl RelayTestHarness {
    /// Spawns the pipeline with the default backoff bounds
    /// (floor 1000 ms, ceiling 60000 ms) and two entry processors
    pub fn start(
        feed: Arc<dyn FeedSource>,
        sink: Arc<RecordingSink>,
        outbox: Arc<RecordingOutbox>,
    ) -> Self {
        let shutdown_token = CancellationToken::new();
        let (entry_tx, entry_rx) = flume::bounded(8);

        let mut processor_handles = Vec::new();
        for i in 0..2 {
            let processor = EntryProcessor::new(
                i,
                Arc::clone(&sink) as Arc<dyn DeliverySink>,
                Arc::clone(&outbox) as Arc<dyn OutboxWriter>,
            );
            let rx = entry_rx.clone();
            let token = shutdown_token.clone();
            processor_handles.push(tokio::spawn(async move {
                processor.run(rx, token).await;
            }));
        }

        let listener = FeedListener::new(
            feed,
            entry_tx,
            &FeedListenerConfig {
                reconnect_delay: Duration::from_millis(1000),
                max_reconnect_delay: Duration::from_millis(60000),
            },
            shutdown_token.clone(),
        );
        let listener_handle = tokio::spawn(listener.run());

        Self {
            sink,
            outbox,
            shutdown_token,
            listener_handle,
            processor_handles,
        }
    }

    /// Cancels the pipeline and waits for every task to stop
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        let _ = self.listener_handle.await;
        for handle in self.processor_handles {
            let _ = handle.await;
        }
    }
}

/// Polls `condition` until it holds, advancing the (paused) clock
///
/// # Panics
///
/// Panics if the condition does not hold before polling gives up.
pub async fn wait_until<F: Fn() -> bool>(description: &str, condition: F) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for: {description}");
}
