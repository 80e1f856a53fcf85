use ratatui::text::Line;

use crate::query::{replay, RowChange};
use crate::storage::FeedItem;

// ============================================================================
// View and Content State
// ============================================================================

/// Current view mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// The item list
    List,
    /// Full-screen detail for one item
    Detail,
}

/// Rendering state of the detail view.
///
/// Entering the detail view starts in `Loading` so one frame shows the
/// indicator; the event loop converts the item's markup and flips to
/// `Loaded`.
pub enum ContentState {
    Idle,
    Loading { item_id: i64 },
    Loaded { item_id: i64, lines: Vec<Line<'static>> },
}

/// One-line status surfaced under the list (refresh outcome or error).
#[derive(Debug, Clone)]
pub struct Status {
    pub message: String,
    pub is_error: bool,
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: true,
        }
    }
}

// ============================================================================
// App State
// ============================================================================

/// All mutable UI state.
///
/// `rows` is the list presenter's own copy of the live query's row set,
/// maintained purely by replaying the discrete [`RowChange`] events the
/// query emits; it is never re-fetched wholesale.
pub struct App {
    pub rows: Vec<FeedItem>,
    pub selected: usize,
    pub view: View,
    pub content: ContentState,
    pub status: Option<Status>,
    pub scroll_offset: usize,
    pub detail_visible_lines: usize,
    pub refreshing: bool,
    pub should_quit: bool,
}

impl App {
    pub fn new(initial_rows: Vec<FeedItem>) -> Self {
        Self {
            rows: initial_rows,
            selected: 0,
            view: View::List,
            content: ContentState::Idle,
            status: None,
            scroll_offset: 0,
            detail_visible_lines: 0,
            refreshing: false,
            should_quit: false,
        }
    }

    pub fn selected_item(&self) -> Option<&FeedItem> {
        self.rows.get(self.selected)
    }

    /// Apply a reconciliation batch to the display rows, keeping the
    /// selection on the same item where possible.
    pub fn apply_row_changes(&mut self, changes: &[RowChange]) {
        let selected_id = self.selected_item().map(|i| i.id);

        replay(&mut self.rows, changes);

        if let Some(id) = selected_id {
            if let Some(index) = self.rows.iter().position(|r| r.id == id) {
                self.selected = index;
                return;
            }
        }
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    pub fn select_next(&mut self) {
        if !self.rows.is_empty() {
            self.selected = (self.selected + 1).min(self.rows.len() - 1);
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.rows.len().saturating_sub(1);
    }

    /// Enter the detail view for the selected item.
    pub fn open_detail(&mut self) {
        if let Some(item) = self.selected_item() {
            self.content = ContentState::Loading { item_id: item.id };
            self.scroll_offset = 0;
            self.view = View::Detail;
        }
    }

    pub fn close_detail(&mut self) {
        self.view = View::List;
        self.content = ContentState::Idle;
        self.scroll_offset = 0;
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
        self.clamp_detail_scroll();
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Keep the scroll offset within the rendered content.
    pub fn clamp_detail_scroll(&mut self) {
        if let ContentState::Loaded { lines, .. } = &self.content {
            let max = lines.len().saturating_sub(self.detail_visible_lines.max(1));
            self.scroll_offset = self.scroll_offset.min(max);
        }
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = Some(status);
    }
}
