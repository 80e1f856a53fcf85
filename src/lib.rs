//! catchup: a terminal feed reader for a single RSS/Atom feed.
//!
//! The pipeline: fetch feed bytes ([`feed::fetcher`]) → parse them off the
//! interactive thread and commit all-or-nothing into the SQLite store
//! ([`feed::task`]) → the store republishes a typed change event
//! ([`storage::StoreChange`]) → the live item query reconciles its row set
//! incrementally ([`query::ItemQuery`]) → the TUI list applies the discrete
//! row changes. Completion signaling between the parse task and its
//! observers goes over a broadcast [`events::EventBus`] instead of any
//! process-global notification mechanism.

pub mod app;
pub mod config;
pub mod events;
pub mod feed;
pub mod query;
pub mod storage;
pub mod ui;
