use anyhow::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::schema::Store;
use super::types::{CommitOutcome, FeedItem, ItemDbRow, ParsedItem, StoreChange};

/// Maximum number of items to return from any single query (OOM protection)
const MAX_ITEMS: i64 = 2000;

const ITEM_COLUMNS: &str =
    "id, title, pub_date, author, content, more_info, published_at, fetched_at";

impl Store {
    // ========================================================================
    // Commit
    // ========================================================================

    /// Commit a parse batch all-or-nothing, then publish the change.
    ///
    /// Every item is upserted (keyed by `more_info`) inside one transaction,
    /// with duplicate permalinks within the batch collapsed to the last entry;
    /// if any statement fails the transaction rolls back and zero rows are
    /// written. Existing rows keep their `fetched_at` (first-seen semantics)
    /// and are reported as updated only when their metadata actually changed,
    /// so re-committing an unchanged feed is a no-op that publishes nothing.
    ///
    /// The change event is sent strictly after the transaction commits: any
    /// observer reacting to it sees a store state that already contains
    /// these rows.
    pub async fn commit_items(&self, items: &[ParsedItem]) -> Result<CommitOutcome> {
        if items.is_empty() {
            return Ok(CommitOutcome::default());
        }

        // A feed can repeat a permalink within one payload. Upsert each key
        // at most once (last entry wins) so a row never lands in both the
        // inserted and updated sets of the published change.
        let mut batch: Vec<&ParsedItem> = Vec::with_capacity(items.len());
        let mut index_by_key: HashMap<&str, usize> = HashMap::with_capacity(items.len());
        for item in items {
            match index_by_key.entry(item.more_info.as_str()) {
                Entry::Occupied(slot) => batch[*slot.get()] = item,
                Entry::Vacant(slot) => {
                    slot.insert(batch.len());
                    batch.push(item);
                }
            }
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut outcome = CommitOutcome::default();

        for item in batch {
            let existing = sqlx::query_as::<_, ItemDbRow>(&format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE more_info = ?"
            ))
            .bind(&item.more_info)
            .fetch_optional(&mut *tx)
            .await?;

            match existing {
                None => {
                    let row = sqlx::query_as::<_, ItemDbRow>(&format!(
                        r#"
                        INSERT INTO items (title, pub_date, author, content, more_info, published_at, fetched_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?)
                        RETURNING {ITEM_COLUMNS}
                    "#
                    ))
                    .bind(&item.title)
                    .bind(&item.pub_date)
                    .bind(&item.author)
                    .bind(&item.content)
                    .bind(&item.more_info)
                    .bind(item.published_at)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await?;
                    outcome.inserted.push(row.into_item());
                }
                Some(row) => {
                    let unchanged = row.title == item.title
                        && row.pub_date == item.pub_date
                        && row.author == item.author
                        && row.content == item.content
                        && row.published_at == item.published_at;
                    if unchanged {
                        continue;
                    }

                    let row = sqlx::query_as::<_, ItemDbRow>(&format!(
                        r#"
                        UPDATE items
                        SET title = ?, pub_date = ?, author = ?, content = ?, published_at = ?
                        WHERE more_info = ?
                        RETURNING {ITEM_COLUMNS}
                    "#
                    ))
                    .bind(&item.title)
                    .bind(&item.pub_date)
                    .bind(&item.author)
                    .bind(&item.content)
                    .bind(item.published_at)
                    .bind(&item.more_info)
                    .fetch_one(&mut *tx)
                    .await?;
                    outcome.updated.push(row.into_item());
                }
            }
        }

        tx.commit().await?;

        if !outcome.is_empty() {
            self.publish(StoreChange::from_commit(&outcome));
        }

        Ok(outcome)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Items inside the rolling window, newest first.
    ///
    /// Sort order is `published_at DESC, fetched_at DESC, id DESC`, the
    /// live query reproduces exactly this ordering in memory.
    pub async fn items_newer_than(&self, cutoff: i64) -> Result<Vec<FeedItem>> {
        let rows = sqlx::query_as::<_, ItemDbRow>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM items
            WHERE published_at >= ?
            ORDER BY published_at DESC, fetched_at DESC, id DESC
            LIMIT ?
        "#
        ))
        .bind(cutoff)
        .bind(MAX_ITEMS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ItemDbRow::into_item).collect())
    }

    /// Fetch a single item by id.
    pub async fn item_by_id(&self, id: i64) -> Result<Option<FeedItem>> {
        let row = sqlx::query_as::<_, ItemDbRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ItemDbRow::into_item))
    }

    /// Total row count (diagnostics and tests).
    pub async fn item_count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Delete items older than the cutoff, publishing their ids as a removal
    /// change. Returns the number of rows deleted.
    pub async fn prune_older_than(&self, cutoff: i64) -> Result<u64> {
        let removed: Vec<(i64,)> =
            sqlx::query_as("DELETE FROM items WHERE published_at < ? RETURNING id")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;

        let count = removed.len() as u64;
        if count > 0 {
            tracing::info!(removed = count, "Pruned items outside retention window");
            self.publish(StoreChange::from_removal(
                removed.into_iter().map(|(id,)| id).collect(),
            ));
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_store() -> Store {
        Store::open(":memory:").await.unwrap()
    }

    fn parsed(link: &str, title: &str, published_at: i64) -> ParsedItem {
        ParsedItem {
            title: title.to_string(),
            pub_date: "Mon, 01 Jan 2024 00:00:00 GMT".to_string(),
            author: "Author".to_string(),
            content: format!("Body of {title}"),
            more_info: format!("https://example.com/{link}"),
            published_at,
        }
    }

    #[tokio::test]
    async fn test_commit_inserts_all_items() {
        let store = test_store().await;
        let batch = vec![parsed("a", "A", 100), parsed("b", "B", 200)];

        let outcome = store.commit_items(&batch).await.unwrap();
        assert_eq!(outcome.inserted.len(), 2);
        assert_eq!(outcome.updated.len(), 0);
        assert_eq!(store.item_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_permalink_in_batch_commits_once() {
        let store = test_store().await;
        let batch = vec![parsed("a", "First", 100), parsed("a", "Second", 100)];

        let outcome = store.commit_items(&batch).await.unwrap();
        // Last entry wins, and the row appears in exactly one result set.
        assert_eq!(outcome.inserted.len(), 1);
        assert_eq!(outcome.updated.len(), 0);
        assert_eq!(&*outcome.inserted[0].title, "Second");
        assert_eq!(store.item_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recommit_same_batch_is_noop() {
        let store = test_store().await;
        let batch = vec![parsed("a", "A", 100)];

        store.commit_items(&batch).await.unwrap();
        let second = store.commit_items(&batch).await.unwrap();

        assert!(second.is_empty(), "Unchanged batch should publish nothing");
        assert_eq!(store.item_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recommit_changed_title_updates_in_place() {
        let store = test_store().await;
        store.commit_items(&[parsed("a", "Old", 100)]).await.unwrap();

        let outcome = store.commit_items(&[parsed("a", "New", 100)]).await.unwrap();
        assert_eq!(outcome.inserted.len(), 0);
        assert_eq!(outcome.updated.len(), 1);
        assert_eq!(&*outcome.updated[0].title, "New");
        assert_eq!(store.item_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_preserves_fetched_at() {
        let store = test_store().await;
        let first = store.commit_items(&[parsed("a", "Old", 100)]).await.unwrap();
        let original = first.inserted[0].fetched_at;

        let second = store.commit_items(&[parsed("a", "New", 100)]).await.unwrap();
        assert_eq!(second.updated[0].fetched_at, original);
    }

    #[tokio::test]
    async fn test_items_newer_than_filters_and_sorts() {
        let store = test_store().await;
        store
            .commit_items(&[
                parsed("old", "Old", 50),
                parsed("mid", "Mid", 150),
                parsed("new", "New", 250),
            ])
            .await
            .unwrap();

        let rows = store.items_newer_than(100).await.unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| &*r.title).collect();
        assert_eq!(titles, vec!["New", "Mid"]);
    }

    #[tokio::test]
    async fn test_change_published_after_commit_is_visible() {
        let store = test_store().await;
        let mut rx = store.subscribe();

        store.commit_items(&[parsed("a", "A", 100)]).await.unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.inserted.len(), 1);
        // The signal must never fire before the commit is visible to a query.
        let rows = store.items_newer_than(0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, change.inserted[0].id);
    }

    #[tokio::test]
    async fn test_prune_publishes_removed_ids() {
        let store = test_store().await;
        let outcome = store
            .commit_items(&[parsed("old", "Old", 50), parsed("new", "New", 250)])
            .await
            .unwrap();
        let old_id = outcome
            .inserted
            .iter()
            .find(|i| &*i.title == "Old")
            .unwrap()
            .id;

        let mut rx = store.subscribe();
        let count = store.prune_older_than(100).await.unwrap();
        assert_eq!(count, 1);

        let change = rx.recv().await.unwrap();
        assert_eq!(&*change.removed, &vec![old_id]);
        assert_eq!(store.item_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_item_by_id_roundtrip() {
        let store = test_store().await;
        let outcome = store.commit_items(&[parsed("a", "A", 100)]).await.unwrap();
        let id = outcome.inserted[0].id;

        let item = store.item_by_id(id).await.unwrap().unwrap();
        assert_eq!(&*item.title, "A");
        assert!(store.item_by_id(id + 999).await.unwrap().is_none());
    }
}
