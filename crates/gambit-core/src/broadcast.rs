// ABOUTME: Fans engine output out to every connected client sink.
// ABOUTME: Sinks that fail a send are pruned during the same broadcast.

use crate::error::SinkError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Default per-client queue depth for [`ChannelSink`].
pub const DEFAULT_CLIENT_QUEUE: usize = 256;

/// Destination for broadcast text, one per connected client.
///
/// `send` must not block: a slow client is only allowed to hurt itself.
pub trait ClientSink: Send + Sync {
    fn send(&self, text: &str) -> Result<(), SinkError>;
}

/// Sink backed by a bounded channel; the receiving half drives the client socket.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ClientSink for ChannelSink {
    fn send(&self, text: &str) -> Result<(), SinkError> {
        self.tx.try_send(text.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Handle returned by [`Broadcaster::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

impl std::fmt::Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// The set of connected clients.
#[derive(Default)]
pub struct Broadcaster {
    sinks: Mutex<HashMap<SinkId, Arc<dyn ClientSink>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Arc<dyn ClientSink>) -> SinkId {
        let id = SinkId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, sink);
        debug!(client = %id, "Client registered");
        id
    }

    pub fn unregister(&self, id: SinkId) {
        if self.lock().remove(&id).is_some() {
            debug!(client = %id, "Client unregistered");
        }
    }

    /// Send `text` to every sink, dropping any that fail. Returns how many received it.
    pub fn broadcast(&self, text: &str) -> usize {
        let mut sinks = self.lock();
        let before = sinks.len();
        sinks.retain(|id, sink| match sink.send(text) {
            Ok(()) => true,
            Err(e) => {
                debug!(client = %id, error = %e, "Dropping client after failed send");
                false
            }
        });
        let delivered = sinks.len();
        if delivered < before {
            debug!(pruned = before - delivered, remaining = delivered, "Pruned clients");
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SinkId, Arc<dyn ClientSink>>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
