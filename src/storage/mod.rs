mod items;
mod schema;
mod types;

pub use schema::Store;
pub use types::{CommitOutcome, FeedItem, ParsedItem, StoreChange, StoreError};
