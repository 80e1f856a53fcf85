//! Typed completion events for feed refreshes.
//!
//! Every refresh terminates in exactly one [`FeedEvent`]: either the parsed
//! items were committed (`ItemsAdded`) or the refresh failed. The bus is a
//! tokio broadcast channel, so any component may subscribe; publishing with
//! no subscribers is not an error.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::storage::FeedItem;

/// Broadcast channel capacity. Refresh events are rare (one per fetch), so a
/// small buffer only matters for subscribers that stop polling entirely.
const CHANNEL_CAPACITY: usize = 32;

/// Terminal signal of a feed refresh.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The parse task committed its items. Published strictly after the
    /// store transaction commits, so a query issued on receipt already sees
    /// these rows.
    ItemsAdded {
        /// Rows as committed (inserted first, then updated-in-place).
        items: Arc<Vec<FeedItem>>,
        /// Entries dropped during parsing (e.g. missing title).
        skipped: usize,
    },
    /// The feed bytes could not be decoded, or the commit failed. No rows
    /// were written.
    ParseFailed(String),
    /// The network fetch itself failed; the parse task never ran.
    FetchFailed(String),
}

/// Shared handle for publishing and subscribing to [`FeedEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: FeedEvent) {
        // A send error just means nobody is listening right now.
        if let Err(e) = self.tx.send(event) {
            tracing::debug!(error = %e, "Feed event dropped (no subscribers)");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(FeedEvent::ParseFailed("bad xml".into()));

        match rx.recv().await.unwrap() {
            FeedEvent::ParseFailed(msg) => assert_eq!(msg, "bad xml"),
            other => panic!("Expected ParseFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(FeedEvent::FetchFailed("timeout".into()));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(FeedEvent::ParseFailed("oops".into()));

        assert!(matches!(a.recv().await.unwrap(), FeedEvent::ParseFailed(_)));
        assert!(matches!(b.recv().await.unwrap(), FeedEvent::ParseFailed(_)));
    }
}
