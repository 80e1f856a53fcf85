pub mod fetcher;
pub mod parser;
pub mod task;

pub use fetcher::{fetch_bytes, FetchError};
pub use parser::{parse_items, ParseOutcome};
pub use task::{ParseFeedTask, Refresher, TaskError};
