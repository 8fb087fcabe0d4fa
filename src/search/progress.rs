//! Progress events for long-running searches.
//!
//! Searches stay plain request/response. Anyone interested in progress
//! subscribes to a [`SearchEvents`] broadcaster instead of passing callbacks.

use tokio::sync::broadcast;

use crate::types::{CollectionId, NodeId};

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    CollectionStarted {
        collection: CollectionId,
    },
    CollectionFinished {
        collection: CollectionId,
        hits: usize,
        best: Option<NodeId>,
    },
    CollectionFailed {
        collection: CollectionId,
        reason: String,
    },
    CollectionTimedOut {
        collection: CollectionId,
    },
    /// Federation finished merging
    Completed {
        hits: usize,
        responded: usize,
        failed: usize,
        timed_out: usize,
    },
}

/// Broadcasts search progress to any number of subscribers.
#[derive(Debug, Clone)]
pub struct SearchEvents {
    sender: broadcast::Sender<SearchEvent>,
}

impl SearchEvents {
    /// Create a new broadcaster with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends an event; having no subscribers is fine.
    pub fn send(&self, event: SearchEvent) {
        match self.sender.send(event) {
            Ok(count) => tracing::trace!("[search] event delivered to {count} subscribers"),
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!("[search] no subscribers for {event:?}")
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
        self.sender.subscribe()
    }
}

impl Default for SearchEvents {
    fn default() -> Self {
        Self::new(256)
    }
}
