use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another instance of the application has locked the database
    #[error("Another instance of catchup appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Store migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Store error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::InstanceLocked;
        }

        StoreError::Other(err)
    }
}

// ============================================================================
// Parsed Input
// ============================================================================

/// One feed entry as produced by the parser, before it has a row identity.
#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub title: String,
    /// Publication date exactly as the feed carried it (may be empty).
    pub pub_date: String,
    pub author: String,
    /// Entry body, treated as markup by the detail view.
    pub content: String,
    /// Permalink; the store's dedup key.
    pub more_info: String,
    /// Epoch seconds derived from the entry's published/updated field, or the
    /// fetch time when the feed gave no usable date. Sort and cutoff key.
    pub published_at: i64,
}

// ============================================================================
// Persisted Rows
// ============================================================================

/// Internal row type for item queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemDbRow {
    pub id: i64,
    pub title: String,
    pub pub_date: String,
    pub author: String,
    pub content: String,
    pub more_info: String,
    pub published_at: i64,
    pub fetched_at: i64,
}

impl ItemDbRow {
    pub(crate) fn into_item(self) -> FeedItem {
        FeedItem {
            id: self.id,
            title: Arc::from(self.title),
            pub_date: self.pub_date,
            author: self.author,
            content: Arc::from(self.content),
            more_info: self.more_info,
            published_at: self.published_at,
            fetched_at: self.fetched_at,
        }
    }
}

/// A persisted feed entry.
///
/// `title` and `content` use `Arc<str>` for cheap cloning: committed rows
/// travel through the event bus and the live query's row set.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub id: i64,
    pub title: Arc<str>,
    pub pub_date: String,
    pub author: String,
    pub content: Arc<str>,
    pub more_info: String,
    pub published_at: i64,
    /// First-seen timestamp; preserved across metadata updates.
    pub fetched_at: i64,
}

// ============================================================================
// Commit Outcome & Change Events
// ============================================================================

/// Result of committing one parse batch.
#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    /// Rows that did not exist before this commit.
    pub inserted: Vec<FeedItem>,
    /// Existing rows whose metadata changed. Unchanged rows are not listed.
    pub updated: Vec<FeedItem>,
}

impl CommitOutcome {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty()
    }
}

/// Change event republished by the store after a commit transaction.
///
/// Published strictly after the transaction commits; a query executed on
/// receipt observes a store state that already includes these rows.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub inserted: Arc<Vec<FeedItem>>,
    pub updated: Arc<Vec<FeedItem>>,
    /// Ids removed by retention pruning.
    pub removed: Arc<Vec<i64>>,
}

impl StoreChange {
    pub(crate) fn from_commit(outcome: &CommitOutcome) -> Self {
        Self {
            inserted: Arc::new(outcome.inserted.clone()),
            updated: Arc::new(outcome.updated.clone()),
            removed: Arc::new(Vec::new()),
        }
    }

    pub(crate) fn from_removal(ids: Vec<i64>) -> Self {
        Self {
            inserted: Arc::new(Vec::new()),
            updated: Arc::new(Vec::new()),
            removed: Arc::new(ids),
        }
    }
}
