//! The background parse task and the single-flight refresh coordinator.
//!
//! A refresh is fire-and-forget: fetch the feed bytes, run one
//! [`ParseFeedTask`] on the runtime, and let the task's terminal event on the
//! [`EventBus`] carry the outcome back to whoever cares. The task owns its
//! input buffer and a store handle; nothing is shared with the interactive
//! loop except the typed channels.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::events::{EventBus, FeedEvent};
use crate::feed::fetcher::{self, FetchError};
use crate::feed::parser;
use crate::storage::{FeedItem, Store};

/// Failure modes of one parse task execution.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The payload could not be decoded as RSS or Atom
    #[error("Feed could not be parsed: {0}")]
    Decode(String),
    /// The commit transaction failed; nothing was written
    #[error("Failed to store items: {0}")]
    Store(String),
}

/// One unit of background work: decode a feed payload and commit the result.
///
/// Created per fetch, run once, discarded. Exactly one [`FeedEvent`] is
/// published per execution: `ItemsAdded` after the commit transaction
/// returns, or `ParseFailed` with zero rows written.
pub struct ParseFeedTask {
    bytes: Vec<u8>,
    store: Store,
    events: EventBus,
}

impl ParseFeedTask {
    pub fn new(bytes: Vec<u8>, store: Store, events: EventBus) -> Self {
        Self {
            bytes,
            store,
            events,
        }
    }

    /// Run to completion and publish the terminal event.
    pub async fn run(self) {
        match self.execute().await {
            Ok((items, skipped)) => {
                tracing::info!(
                    committed = items.len(),
                    skipped = skipped,
                    "Feed parse committed"
                );
                self.events.publish(FeedEvent::ItemsAdded {
                    items: Arc::new(items),
                    skipped,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Feed parse failed");
                self.events.publish(FeedEvent::ParseFailed(e.to_string()));
            }
        }
    }

    /// Decode and commit. All-or-nothing: a decode error commits nothing,
    /// and the store's own transaction guarantees the same for write errors.
    async fn execute(&self) -> Result<(Vec<FeedItem>, usize), TaskError> {
        let outcome =
            parser::parse_items(&self.bytes).map_err(|e| TaskError::Decode(e.to_string()))?;

        if outcome.skipped > 0 {
            tracing::warn!(skipped = outcome.skipped, "Entries without titles skipped");
        }

        let committed = self
            .store
            .commit_items(&outcome.items)
            .await
            .map_err(|e| TaskError::Store(e.to_string()))?;

        let mut items = committed.inserted;
        items.extend(committed.updated);
        Ok((items, outcome.skipped))
    }
}

/// Spawns refreshes, enforcing that at most one is in flight.
///
/// A refresh requested while another is running is dropped (not queued); the
/// caller learns this from the return value of [`Refresher::spawn_refresh`].
#[derive(Clone)]
pub struct Refresher {
    client: reqwest::Client,
    feed_url: String,
    store: Store,
    events: EventBus,
    inflight: Arc<Semaphore>,
}

impl Refresher {
    pub fn new(client: reqwest::Client, feed_url: String, store: Store, events: EventBus) -> Self {
        Self {
            client,
            feed_url,
            store,
            events,
            inflight: Arc::new(Semaphore::new(1)),
        }
    }

    /// Kick off a background refresh. Returns false if one is already
    /// running.
    pub fn spawn_refresh(&self) -> bool {
        let Ok(permit) = Arc::clone(&self.inflight).try_acquire_owned() else {
            tracing::warn!("Refresh already in flight, ignoring request");
            return false;
        };

        let client = self.client.clone();
        let url = self.feed_url.clone();
        let store = self.store.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            // Held for the whole fetch+parse+commit so a second refresh
            // cannot race the first one's commit.
            let _permit = permit;

            match fetcher::fetch_bytes(&client, &url).await {
                Ok(bytes) => {
                    ParseFeedTask::new(bytes, store, events).run().await;
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Feed fetch failed");
                    events.publish(FeedEvent::FetchFailed(fetch_error_message(&e)));
                }
            }
        });

        true
    }
}

fn fetch_error_message(e: &FetchError) -> String {
    match e {
        FetchError::Timeout => "Feed request timed out".to_string(),
        FetchError::HttpStatus(code) => format!("Feed server returned HTTP {}", code),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>One</title><link>https://example.com/1</link>
        <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
</channel></rss>"#;

    async fn test_store() -> Store {
        Store::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_task_commits_then_signals() {
        let store = test_store().await;
        let events = EventBus::new();
        let mut rx = events.subscribe();

        ParseFeedTask::new(VALID_RSS.as_bytes().to_vec(), store.clone(), events)
            .run()
            .await;

        match rx.recv().await.unwrap() {
            FeedEvent::ItemsAdded { items, skipped } => {
                assert_eq!(items.len(), 1);
                assert_eq!(skipped, 0);
                // Commit must already be visible.
                assert_eq!(store.item_count().await.unwrap(), 1);
            }
            other => panic!("Expected ItemsAdded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_signals_error_commits_nothing() {
        let store = test_store().await;
        let events = EventBus::new();
        let mut rx = events.subscribe();

        // Keep `events` alive so try_recv below distinguishes an empty
        // channel from a closed one.
        ParseFeedTask::new(b"this is not a feed".to_vec(), store.clone(), events.clone())
            .run()
            .await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            FeedEvent::ParseFailed(_)
        ));
        assert_eq!(store.item_count().await.unwrap(), 0);
        // Exactly one signal per execution.
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_refresher_fetches_and_commits() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let store = test_store().await;
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let refresher = Refresher::new(
            reqwest::Client::new(),
            format!("{}/feed", mock_server.uri()),
            store.clone(),
            events,
        );

        assert!(refresher.spawn_refresh());

        match rx.recv().await.unwrap() {
            FeedEvent::ItemsAdded { items, .. } => assert_eq!(items.len(), 1),
            other => panic!("Expected ItemsAdded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresher_reports_fetch_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let store = test_store().await;
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let refresher = Refresher::new(
            reqwest::Client::new(),
            format!("{}/feed", mock_server.uri()),
            store.clone(),
            events,
        );

        refresher.spawn_refresh();

        match rx.recv().await.unwrap() {
            FeedEvent::FetchFailed(msg) => assert!(msg.contains("404")),
            other => panic!("Expected FetchFailed, got {:?}", other),
        }
        assert_eq!(store.item_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_dropped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .mount(&mock_server)
            .await;

        let store = test_store().await;
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let refresher = Refresher::new(
            reqwest::Client::new(),
            format!("{}/feed", mock_server.uri()),
            store,
            events,
        );

        assert!(refresher.spawn_refresh());
        // Second request while the first is still fetching is dropped.
        assert!(!refresher.spawn_refresh());

        // Only the first refresh completes.
        assert!(matches!(
            rx.recv().await.unwrap(),
            FeedEvent::ItemsAdded { .. }
        ));
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));

        // Once it finished, a new refresh may start. The permit is freed a
        // moment after the event is published, so poll briefly.
        let mut restarted = false;
        for _ in 0..100 {
            if refresher.spawn_refresh() {
                restarted = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(restarted);
    }
}
