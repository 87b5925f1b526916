//! Store events and the synchronous listener list that delivers them.
//!
//! Listeners run on the caller's path, in subscription order, before the
//! store operation that produced the event returns. A slow listener delays
//! the caller. Listeners must not block on the store that is notifying them.
//!
//! # Example
//!
//! ```rust,ignore
//! let subscription = store.subscribe(|event| {
//!     if let ChunkEventKind::Error { operation, error } = &event.kind {
//!         tracing::warn!("{:?} failed: {}", operation, error);
//!     }
//! });
//! // ...
//! subscription.unsubscribe();
//! ```

use crate::chunk::{ChunkId, ChunkItem};
use crate::error::ChunkError;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use std::time::Instant;

/// Store operation that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOperation {
    /// `configure`.
    Configure,
    /// `add`.
    Add,
    /// `merge`.
    Merge,
    /// `split`.
    Split,
}

/// What happened in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEventKind {
    /// A chunk was stored.
    Add {
        /// The stored chunk.
        item: ChunkItem,
    },
    /// A chunk was removed, explicitly, by eviction or because it was folded
    /// into a merged chunk.
    Remove {
        /// The removed chunk.
        item: ChunkItem,
    },
    /// An explicit merge completed.
    Merge {
        /// Ids passed to the merge.
        merged_ids: Vec<ChunkId>,
        /// The resulting chunk.
        item: ChunkItem,
    },
    /// A split completed.
    Split {
        /// Id of the chunk that was split.
        original_id: ChunkId,
        /// Ids of the pieces, in time order.
        new_ids: Vec<ChunkId>,
        /// Split times, sorted.
        split_times: Vec<f64>,
    },
    /// A cleanup pass ran.
    Cleanup {
        /// Number of chunks evicted.
        removed_count: usize,
    },
    /// An operation was rejected.
    Error {
        /// The rejected operation.
        operation: ChunkOperation,
        /// Why it was rejected.
        error: ChunkError,
    },
}

/// A store event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEvent {
    /// What happened.
    pub kind: ChunkEventKind,
    /// When it happened.
    pub timestamp: Instant,
}

impl ChunkEvent {
    /// Creates an event stamped with the current instant.
    pub fn new(kind: ChunkEventKind) -> Self {
        Self {
            kind,
            timestamp: Instant::now(),
        }
    }

    /// Returns true for error events.
    pub fn is_error(&self) -> bool {
        matches!(self.kind, ChunkEventKind::Error { .. })
    }
}

type Listener = Arc<dyn Fn(&ChunkEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Ordered list of event listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<Listeners>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. It stays registered until the returned
    /// [`Subscription`] is explicitly unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChunkEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.inner.write().unwrap_or_else(|err| err.into_inner());
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every listener in subscription order.
    pub fn emit(&self, event: &ChunkEvent) {
        // Snapshot so listeners may subscribe or unsubscribe while being notified.
        let snapshot: Vec<Listener> = {
            let listeners = self.inner.read().unwrap_or_else(|err| err.into_inner());
            listeners.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in snapshot {
            listener(event);
        }
    }

    /// Builds an event from `kind` and delivers it.
    pub fn publish(&self, kind: ChunkEventKind) {
        self.emit(&ChunkEvent::new(kind));
    }

    /// Number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .entries
            .len()
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe() to remove it"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<RwLock<Listeners>>,
}

impl Subscription {
    /// Removes the listener. Returns false if the bus is gone or the
    /// listener was already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.listeners.upgrade() else {
            return false;
        };
        let mut listeners = inner.write().unwrap_or_else(|err| err.into_inner());
        let before = listeners.entries.len();
        listeners.entries.retain(|(id, _)| *id != self.id);
        listeners.entries.len() != before
    }
}
