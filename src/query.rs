//! Live, sorted, cutoff-filtered view over the item store.
//!
//! [`ItemQuery`] executes one initial fetch, then reconciles every
//! [`StoreChange`] incrementally, surfacing each affected row as a discrete
//! [`RowChange`] instead of a full reload. The contract: replaying the
//! emitted changes in order against any copy of the previous row set yields
//! exactly the rows a full re-fetch would return at that moment, with no
//! duplicate, missing, or misordered rows.

use anyhow::{Context, Result};
use std::cmp::Reverse;

use crate::storage::{FeedItem, Store, StoreChange};

/// One incremental change to the presented row set.
///
/// Indices refer to the row set as it stands when the change is applied,
/// mid-sequence: a `Removed { index: 2 }` followed by `Inserted { index: 0 }`
/// must be applied in that order.
#[derive(Debug, Clone)]
pub enum RowChange {
    Inserted { index: usize, item: FeedItem },
    /// Row changed in place without moving.
    Updated { index: usize, item: FeedItem },
    /// Row changed and its sort position moved. `from` is the index before
    /// removal; `to` is the index after reinsertion.
    Moved {
        from: usize,
        to: usize,
        item: FeedItem,
    },
    Removed { index: usize },
}

/// Apply a change sequence to a detached copy of the row set.
///
/// This is what the list presenter does with its display rows; tests use it
/// to verify the replay-equals-refetch invariant.
pub fn replay(rows: &mut Vec<FeedItem>, changes: &[RowChange]) {
    for change in changes {
        match change {
            RowChange::Inserted { index, item } => rows.insert(*index, item.clone()),
            RowChange::Updated { index, item } => rows[*index] = item.clone(),
            RowChange::Moved { from, to, item } => {
                rows.remove(*from);
                rows.insert(*to, item.clone());
            }
            RowChange::Removed { index } => {
                rows.remove(*index);
            }
        }
    }
}

/// Sort key mirroring the store's `ORDER BY published_at DESC,
/// fetched_at DESC, id DESC`.
fn sort_key(item: &FeedItem) -> (Reverse<i64>, Reverse<i64>, Reverse<i64>) {
    (
        Reverse(item.published_at),
        Reverse(item.fetched_at),
        Reverse(item.id),
    )
}

/// A live query over [`FeedItem`] rows newer than a fixed cutoff.
pub struct ItemQuery {
    rows: Vec<FeedItem>,
    cutoff: i64,
}

impl ItemQuery {
    /// Execute the initial fetch. Fails (reported, not fatal) if the store
    /// cannot be queried.
    pub async fn new(store: &Store, cutoff: i64) -> Result<Self> {
        let rows = store
            .items_newer_than(cutoff)
            .await
            .context("Initial item fetch failed")?;
        Ok(Self { rows, cutoff })
    }

    /// Re-execute the fetch from scratch, replacing the row set. Used when
    /// the change stream lagged and incremental reconciliation is no longer
    /// sound.
    pub async fn refresh(&mut self, store: &Store) -> Result<()> {
        self.rows = store
            .items_newer_than(self.cutoff)
            .await
            .context("Item re-fetch failed")?;
        Ok(())
    }

    /// Build a query from an already-fetched row set (tests).
    pub fn from_rows(mut rows: Vec<FeedItem>, cutoff: i64) -> Self {
        rows.retain(|r| r.published_at >= cutoff);
        rows.sort_by_key(sort_key);
        Self { rows, cutoff }
    }

    pub fn rows(&self) -> &[FeedItem] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cutoff(&self) -> i64 {
        self.cutoff
    }

    /// Reconcile one committed store change into the row set.
    ///
    /// Inserted rows older than the cutoff are ignored; an update that moves
    /// a row across the cutoff boundary surfaces as a removal or insertion.
    pub fn apply(&mut self, change: &StoreChange) -> Vec<RowChange> {
        let mut out = Vec::new();

        for &id in change.removed.iter() {
            if let Some(index) = self.position_of(id) {
                self.rows.remove(index);
                out.push(RowChange::Removed { index });
            }
        }

        for item in change.updated.iter() {
            match (self.position_of(item.id), self.admits(item)) {
                (Some(from), true) => {
                    self.rows.remove(from);
                    let to = self.insertion_index(item);
                    self.rows.insert(to, item.clone());
                    if to == from {
                        out.push(RowChange::Updated {
                            index: to,
                            item: item.clone(),
                        });
                    } else {
                        out.push(RowChange::Moved {
                            from,
                            to,
                            item: item.clone(),
                        });
                    }
                }
                (Some(from), false) => {
                    // Update pushed the row out of the window
                    self.rows.remove(from);
                    out.push(RowChange::Removed { index: from });
                }
                (None, true) => {
                    // Row previously outside the window (or the query's
                    // lifetime) moved into it
                    let index = self.insertion_index(item);
                    self.rows.insert(index, item.clone());
                    out.push(RowChange::Inserted {
                        index,
                        item: item.clone(),
                    });
                }
                (None, false) => {}
            }
        }

        for item in change.inserted.iter() {
            if !self.admits(item) {
                continue;
            }
            let index = self.insertion_index(item);
            self.rows.insert(index, item.clone());
            out.push(RowChange::Inserted {
                index,
                item: item.clone(),
            });
        }

        out
    }

    fn admits(&self, item: &FeedItem) -> bool {
        item.published_at >= self.cutoff
    }

    fn position_of(&self, id: i64) -> Option<usize> {
        self.rows.iter().position(|r| r.id == id)
    }

    fn insertion_index(&self, item: &FeedItem) -> usize {
        let key = sort_key(item);
        self.rows.partition_point(|r| sort_key(r) < key)
    }
}
