//! In-memory registry of connected users and their outbound channels.
//!
//! One entry per online user: the bounded sender feeding that user's
//! connection pump. Brokers write through [`OnlineUsers::send`]; only the
//! user's own connection handler reads the receiving end.

use std::sync::Arc;

use dashmap::DashMap;
use ripple_common::Envelope;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Capacity of a user's outbound queue. A connection that can't drain
/// this many envelopes gets them dropped, not queued without bound.
const OUTBOUND_CAPACITY: usize = 32;

/// Thread-safe, DashMap-backed online-user registry.
#[derive(Clone, Default)]
pub struct OnlineUsers {
    inner: Arc<DashMap<Uuid, mpsc::Sender<Envelope>>>,
}

impl OnlineUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user coming online and return the receiving end of
    /// their outbound queue.
    ///
    /// A reconnect replaces any previous entry; the superseded
    /// connection's receiver closes, which ends its pump loop.
    pub fn register(&self, user_id: Uuid) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        if self.inner.insert(user_id, tx).is_some() {
            tracing::debug!(%user_id, "superseded a previous connection");
        }
        rx
    }

    /// Remove the user's entry after their pump loop has ended.
    ///
    /// Only removes an entry whose receiver is gone, so a handler
    /// unregistering late cannot evict a newer connection for the same
    /// user.
    pub fn unregister(&self, user_id: &Uuid) {
        self.inner.remove_if(user_id, |_, tx| tx.is_closed());
    }

    /// Whether the user currently has a registered connection.
    pub fn is_online(&self, user_id: &Uuid) -> bool {
        self.inner.contains_key(user_id)
    }

    /// Queue an envelope for the user. Advisory: returns `false` only
    /// when the user has no registered connection. A full outbound queue
    /// drops the envelope with a warning but still reports the user as
    /// reachable — they are online, just slow.
    pub fn send(&self, user_id: &Uuid, envelope: Envelope) -> bool {
        let Some(tx) = self.inner.get(user_id) else {
            return false;
        };
        match tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%user_id, "outbound queue full, dropping envelope");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Pump already ended; unregister will clean the entry up.
                false
            }
        }
    }

    /// Number of currently-registered users.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
