//! Per-devnet pub/sub fabric for provisioning progress.
//!
//! Subscribers get a bounded receiver (capacity 100). Unsubscribe flips a
//! `done` flag and removes the subscriber from the map rather than closing
//! the sending half, so a broadcast already in flight for that subscriber
//! never races a closed channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

const SUBSCRIBER_BUFFER: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub phase: String,
    pub step_name: String,
    pub step_status: String,
    pub progress_current: u64,
    pub progress_total: u64,
    pub progress_unit: String,
    pub step_detail: String,
    pub speed: Option<f64>,
}

impl ProvisionLogEntry {
    pub fn info(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: message.into(),
            phase: phase.into(),
            step_name: String::new(),
            step_status: String::new(),
            progress_current: 0,
            progress_total: 0,
            progress_unit: String::new(),
            step_detail: String::new(),
            speed: None,
        }
    }
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<ProvisionLogEntry>,
    done: Arc<AtomicBool>,
}

/// Handle returned from `subscribe`. Drop it or call `unsubscribe` through
/// the broadcaster to stop receiving without racing in-flight sends.
pub struct SubscriptionHandle {
    key: String,
    id: Uuid,
    done: Arc<AtomicBool>,
}

pub struct LogBroadcaster {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self { subscribers: RwLock::new(HashMap::new()) }
    }

    fn key(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }

    pub fn subscribe(
        &self,
        namespace: &str,
        name: &str,
    ) -> (mpsc::Receiver<ProvisionLogEntry>, SubscriptionHandle) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        let done = Arc::new(AtomicBool::new(false));
        let key = Self::key(namespace, name);

        let mut subscribers = self.subscribers.write().expect("broadcaster lock poisoned");
        subscribers.entry(key.clone()).or_default().push(Subscriber {
            id,
            tx,
            done: done.clone(),
        });

        (rx, SubscriptionHandle { key, id, done })
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.done.store(true, Ordering::SeqCst);
        let mut subscribers = self.subscribers.write().expect("broadcaster lock poisoned");
        if let Some(list) = subscribers.get_mut(&handle.key) {
            list.retain(|s| s.id != handle.id);
            if list.is_empty() {
                subscribers.remove(&handle.key);
            }
        }
    }

    /// Snapshots the subscriber list under a read lock, then sends
    /// non-blockingly to each. A full buffer or a `done` subscriber simply
    /// drops the message; this never blocks the caller.
    pub fn broadcast(&self, namespace: &str, name: &str, entry: ProvisionLogEntry) {
        let key = Self::key(namespace, name);
        let snapshot: Vec<(Uuid, mpsc::Sender<ProvisionLogEntry>, Arc<AtomicBool>)> = {
            let subscribers = self.subscribers.read().expect("broadcaster lock poisoned");
            match subscribers.get(&key) {
                Some(list) => list.iter().map(|s| (s.id, s.tx.clone(), s.done.clone())).collect(),
                None => return,
            }
        };

        for (id, tx, done) in snapshot {
            if done.load(Ordering::SeqCst) {
                continue;
            }
            if tx.try_send(entry.clone()).is_err() {
                tracing::warn!(subscriber = %id, devnet = %key, "dropping provision log entry, subscriber buffer full or closed");
            }
        }
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_broadcast_entries() {
        let broadcaster = LogBroadcaster::new();
        let (mut rx, _handle) = broadcaster.subscribe("default", "dev1");
        broadcaster.broadcast("default", "dev1", ProvisionLogEntry::info("Provisioning", "starting"));
        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.message, "starting");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_without_closing_channel_abruptly() {
        let broadcaster = LogBroadcaster::new();
        let (mut rx, handle) = broadcaster.subscribe("default", "dev1");
        broadcaster.unsubscribe(&handle);
        broadcaster.broadcast("default", "dev1", ProvisionLogEntry::info("Provisioning", "ignored"));
        // Channel is not closed by unsubscribe, only starved of new sends.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overflowing_buffer_drops_without_blocking() {
        let broadcaster = LogBroadcaster::new();
        let (_rx, _handle) = broadcaster.subscribe("default", "dev1");
        for i in 0..(SUBSCRIBER_BUFFER + 20) {
            broadcaster.broadcast("default", "dev1", ProvisionLogEntry::info("Provisioning", format!("step {i}")));
        }
        // Completing at all (no deadlock) demonstrates the non-blocking guarantee.
    }
}
