//! Engine event emission.
//!
//! Sync passes report progress through the [`EventSink`] trait so the
//! realtime transport stays outside the engine. [`BroadcastSink`] is the
//! default in-process implementation over a tokio broadcast channel;
//! callers bridge it to their websocket layer or whatever else consumes
//! the feed.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::{AccountId, Email, UserId};
use crate::storage::MailboxStats;

/// Events emitted during sync and classification.
///
/// Serializes with an `event` tag carrying the public event name, so a
/// sink can forward payloads verbatim to transport clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A sync pass began.
    #[serde(rename = "sync:started")]
    SyncStarted {
        /// Account being synced.
        account_id: AccountId,
    },

    /// A fetch batch finished.
    #[serde(rename = "sync:progress")]
    SyncProgress {
        /// Account being synced.
        account_id: AccountId,
        /// Messages handled so far, including skips and failures.
        processed: usize,
        /// Messages listed for this pass.
        total: usize,
    },

    /// A sync pass finished.
    #[serde(rename = "sync:completed")]
    SyncCompleted {
        /// Account that was synced.
        account_id: AccountId,
        /// Newly persisted emails.
        count: usize,
    },

    /// A sync pass failed or was aborted.
    #[serde(rename = "sync:error")]
    SyncError {
        /// Account whose pass failed.
        account_id: AccountId,
        /// Human-readable description.
        message: String,
    },

    /// One email was parsed, classified, and persisted.
    #[serde(rename = "email:processed")]
    EmailProcessed {
        /// The processed email, classification included.
        email: Box<Email>,
    },

    /// Aggregate mailbox counts changed.
    #[serde(rename = "dashboard:updated")]
    DashboardUpdated {
        /// User whose dashboard this is.
        user_id: UserId,
        /// Fresh counts.
        stats: MailboxStats,
    },
}

/// Where the engine sends its events.
///
/// `emit` must not block; implementations queue or drop.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: SyncEvent);
}

/// Broadcast-channel sink for in-process subscribers.
pub struct BroadcastSink {
    sender: broadcast::Sender<SyncEvent>,
}

impl BroadcastSink {
    /// Creates a sink buffering up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to the event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: SyncEvent) {
        // Send only fails when nobody is subscribed.
        let _ = self.sender.send(event);
    }
}

/// Sink that discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: SyncEvent) {}
}
