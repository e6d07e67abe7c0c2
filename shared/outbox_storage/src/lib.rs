//! Outbox storage for the notification relay worker
//!
//! This crate provides the persisted outbox of outbound messages (Dynamo DB)
//! and a live-updating view over its pending entries, consumed by the relay
//! worker.

pub mod outbox;
pub mod watch;
