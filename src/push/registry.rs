//! # Push registry: check id → event stream.
//!
//! The registry is the only state shared between the push server and the
//! check runners. It is an explicit, owned value (wrap it in `Arc` and pass it
//! to both sides); there is no process-wide instance.
//!
//! ## Architecture
//! ```text
//! runner(check A) ── register("A") ──► ┌──────────────────────────┐
//! runner(check B) ── register("B") ──► │ DashMap<id, mpsc::Sender>│
//!                                      └────────────┬─────────────┘
//! PATCH /checks/A ── deliver(update) ── lookup "A" ─┘── send ──► runner(check A) rx
//! ```
//!
//! ## Rules
//! - `register` is atomic per key; a duplicate id is rejected.
//! - `deliver` clones the sender and releases the shard lock before awaiting,
//!   so a slow consumer never blocks other ids or `deregister`.
//! - A delivery waits at most `deliver_timeout` for buffer space.
//! - After `deregister` (or once the receiver is dropped) deliveries for the id
//!   fail with [`PushError::UnknownCheck`].

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use super::update::StatusUpdate;
use crate::config::PushConfig;
use crate::error::PushError;

/// Concurrent registry of per-check push streams.
#[derive(Debug)]
pub struct PushRegistry {
    streams: DashMap<String, mpsc::Sender<StatusUpdate>>,
    buffer: usize,
    deliver_timeout: Duration,
}

impl PushRegistry {
    /// Creates an empty registry.
    ///
    /// `buffer` is the capacity of each check's stream (min 1).
    pub fn new(buffer: usize, deliver_timeout: Duration) -> Self {
        Self {
            streams: DashMap::new(),
            buffer: buffer.max(1),
            deliver_timeout,
        }
    }

    /// Creates an empty registry from push settings.
    pub fn from_config(cfg: &PushConfig) -> Self {
        Self::new(cfg.buffer_clamped(), cfg.deliver_timeout)
    }

    /// Creates a fresh stream for `id` and returns its receiving end.
    pub fn register(&self, id: &str) -> Result<mpsc::Receiver<StatusUpdate>, PushError> {
        match self.streams.entry(id.to_string()) {
            Entry::Occupied(_) => Err(PushError::AlreadyRegistered { id: id.to_string() }),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(self.buffer);
                slot.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Removes the stream for `id`. Returns `false` if it was not registered.
    pub fn deregister(&self, id: &str) -> bool {
        self.streams.remove(id).is_some()
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.streams.contains_key(id)
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// True if no check is registered.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Forwards `update` to the stream registered for `update.id`.
    pub async fn deliver(&self, update: StatusUpdate) -> Result<(), PushError> {
        let Some(tx) = self.streams.get(update.id.as_str()).map(|e| e.value().clone()) else {
            return Err(PushError::UnknownCheck { id: update.id });
        };
        match tx.send_timeout(update, self.deliver_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(update)) => Err(PushError::UnknownCheck { id: update.id }),
            Err(SendTimeoutError::Timeout(update)) => Err(PushError::Stalled {
                id: update.id,
                timeout: self.deliver_timeout,
            }),
        }
    }
}

impl Default for PushRegistry {
    fn default() -> Self {
        Self::from_config(&PushConfig::default())
    }
}
