//! Terminal UI: event loop, list presenter, detail presenter.
//!
//! The loop multiplexes three inputs: terminal key events, feed refresh
//! events from the [`EventBus`], and committed [`StoreChange`]s from the
//! store. Store changes flow through the live query's incremental
//! reconciliation; the list only ever applies the resulting discrete row
//! changes.

pub mod detail;
pub mod list;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Frame, Terminal};
use std::io;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::app::{App, ContentState, Status, View};
use crate::config::Config;
use crate::events::{EventBus, FeedEvent};
use crate::feed::Refresher;
use crate::query::ItemQuery;
use crate::storage::Store;

// ----------------------------------------------------------------------------
// RAII terminal guard that restores the terminal even on panic
// ----------------------------------------------------------------------------

/// Manages terminal raw-mode and alternate-screen lifetime via [`Drop`].
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Install a panic hook that restores the terminal before printing the
/// panic message. Without this, a panic inside the event loop would leave
/// raw mode enabled and the alternate screen active.
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(info);
    }));
}

// ----------------------------------------------------------------------------
// Event loop
// ----------------------------------------------------------------------------

/// Run the TUI until the user quits.
pub async fn run(
    app: &mut App,
    store: &Store,
    query: &mut ItemQuery,
    refresher: &Refresher,
    events: &EventBus,
    config: &Config,
) -> Result<()> {
    let mut guard = TerminalGuard::new()?;
    let mut term_events = EventStream::new();
    let mut feed_rx = events.subscribe();
    let mut change_rx = store.subscribe();

    // When auto-refresh is off the interval still exists (select! needs a
    // future to hold) but its branch is disabled by the guard below.
    let auto_refresh_enabled = config.refresh_interval_minutes > 0;
    let period = if auto_refresh_enabled {
        Duration::from_secs(config.refresh_interval_minutes * 60)
    } else {
        Duration::from_secs(3600)
    };
    let mut auto_refresh = tokio::time::interval(period);
    auto_refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    auto_refresh.tick().await; // first tick fires immediately; skip it

    loop {
        guard.terminal.draw(|f| draw(f, app))?;

        // The detail view shows its loading frame once; convert the markup
        // now and redraw as loaded.
        if let ContentState::Loading { item_id } = app.content {
            let lines = app
                .selected_item()
                .filter(|i| i.id == item_id)
                .map(|i| detail::render_markup(&i.content))
                .unwrap_or_default();
            app.content = ContentState::Loaded { item_id, lines };
            app.clamp_detail_scroll();
            guard.terminal.draw(|f| draw(f, app))?;
        }

        tokio::select! {
            maybe_event = term_events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        handle_key(app, refresher, key);
                    }
                    Some(Ok(_)) => {} // resize etc., redrawn on next loop
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Terminal event error");
                    }
                    None => break,
                }
            }

            change = change_rx.recv() => {
                match change {
                    Ok(change) => {
                        let row_changes = query.apply(&change);
                        app.apply_row_changes(&row_changes);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Missed changes cannot be reconciled incrementally;
                        // fall back to a full re-fetch.
                        tracing::warn!(missed = missed, "Store change stream lagged, re-fetching");
                        query.refresh(store).await?;
                        app.rows = query.rows().to_vec();
                        app.selected = app.selected.min(app.rows.len().saturating_sub(1));
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            event = feed_rx.recv() => {
                match event {
                    Ok(event) => handle_feed_event(app, event),
                    Err(RecvError::Lagged(_)) => handle_feed_lag(app),
                    Err(RecvError::Closed) => break,
                }
            }

            _ = auto_refresh.tick(), if auto_refresh_enabled => {
                if refresher.spawn_refresh() {
                    app.refreshing = true;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn draw(f: &mut Frame, app: &mut App) {
    let area = f.area();
    match app.view {
        View::List => list::render(f, app, area),
        View::Detail => detail::render(f, app, area),
    }
}

fn handle_feed_event(app: &mut App, event: FeedEvent) {
    app.refreshing = false;
    match event {
        FeedEvent::ItemsAdded { items, skipped } => {
            let mut message = if items.is_empty() {
                "Refreshed: no changes".to_string()
            } else {
                format!("Refreshed: {} items", items.len())
            };
            if skipped > 0 {
                message.push_str(&format!(" ({} entries skipped)", skipped));
            }
            app.set_status(Status::info(message));
        }
        FeedEvent::ParseFailed(msg) | FeedEvent::FetchFailed(msg) => {
            app.set_status(Status::error(msg));
        }
    }
}

/// A lagged feed channel may have dropped the completion event; clear the
/// refresh indicator so the "refreshing" title cannot stick.
fn handle_feed_lag(app: &mut App) {
    app.refreshing = false;
}

fn handle_key(app: &mut App, refresher: &Refresher, key: KeyEvent) {
    // Ctrl+C always quits
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }

    match app.view {
        View::List => match key.code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => app.select_next(),
            KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
            KeyCode::Char('g') | KeyCode::Home => app.select_first(),
            KeyCode::Char('G') | KeyCode::End => app.select_last(),
            KeyCode::Enter => app.open_detail(),
            KeyCode::Char('r') => {
                if refresher.spawn_refresh() {
                    app.refreshing = true;
                    app.set_status(Status::info("Refreshing…"));
                } else {
                    app.set_status(Status::info("Refresh already running"));
                }
            }
            KeyCode::Char('o') => open_selected_link(app),
            _ => {}
        },
        View::Detail => match key.code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Esc | KeyCode::Char('h') | KeyCode::Backspace => app.close_detail(),
            KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
            KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
            KeyCode::PageDown | KeyCode::Char(' ') => {
                app.scroll_down(app.detail_visible_lines.max(1))
            }
            KeyCode::PageUp => app.scroll_up(app.detail_visible_lines.max(1)),
            KeyCode::Char('o') => open_selected_link(app),
            _ => {}
        },
    }
}

fn open_selected_link(app: &mut App) {
    let Some(link) = app.selected_item().map(|i| i.more_info.clone()) else {
        return;
    };
    if !link.starts_with("http") {
        app.set_status(Status::info("Item has no web link"));
        return;
    }
    match open::that(&link) {
        Ok(()) => app.set_status(Status::info(format!("Opened {}", link))),
        Err(e) => app.set_status(Status::error(format!("Failed to open link: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn app_with_rows() -> App {
        App::new(vec![crate::storage::FeedItem {
            id: 1,
            title: Arc::from("Item"),
            pub_date: String::new(),
            author: String::new(),
            content: Arc::from("body"),
            more_info: "https://example.com/1".to_string(),
            published_at: 100,
            fetched_at: 100,
        }])
    }

    #[test]
    fn test_feed_lag_clears_refresh_indicator() {
        let mut app = app_with_rows();
        app.refreshing = true;

        handle_feed_lag(&mut app);
        assert!(!app.refreshing);
    }

    #[test]
    fn test_feed_event_clears_refresh_indicator() {
        let mut app = app_with_rows();
        app.refreshing = true;

        handle_feed_event(&mut app, FeedEvent::FetchFailed("timeout".to_string()));
        assert!(!app.refreshing);
        assert!(app.status.as_ref().unwrap().is_error);
    }
}
