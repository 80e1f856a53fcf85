use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::App;

/// Render the item list with the status line underneath.
pub fn render(f: &mut Frame, app: &mut App, area: Rect) {
    if area.width < 3 || area.height < 3 {
        return;
    }

    let [list_area, status_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(area);

    let width = list_area.width.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .rows
        .iter()
        .map(|item| {
            let time = format_relative_time(item.published_at);
            let meta = if item.author.is_empty() {
                time
            } else {
                format!("{} · {}", item.author, time)
            };
            let title = truncate_to_width(&item.title, width.saturating_sub(meta.width() + 1));
            ListItem::new(Line::from(vec![
                Span::raw(title),
                Span::raw(" "),
                Span::styled(meta, Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let title = if app.refreshing {
        "Items (refreshing…)"
    } else {
        "Items"
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    if !app.rows.is_empty() {
        state.select(Some(app.selected));
    }
    f.render_stateful_widget(list, list_area, &mut state);

    render_status(f, app, status_area);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let line = match &app.status {
        Some(status) => {
            let style = if status.is_error {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            Line::from(Span::styled(status.message.clone(), style))
        }
        None => Line::from(Span::styled(
            "r refresh · Enter open · o link · q quit",
            Style::default().fg(Color::DarkGray),
        )),
    };
    f.render_widget(Paragraph::new(line), area);
}

/// Truncate to a display width, appending an ellipsis when cut.
fn truncate_to_width(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for c in s.chars() {
        let cw = c.width().unwrap_or(0);
        if width + cw + 1 > max_width {
            break;
        }
        width += cw;
        out.push(c);
    }
    out.push('…');
    out
}

/// Human-readable age of an item ("3h ago", "2d ago").
pub fn format_relative_time(published_at: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now.saturating_sub(published_at);

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        format!("{}m ago", delta / 60)
    } else if delta < 86400 {
        format!("{}h ago", delta / 3600)
    } else if delta < 86400 * 365 {
        format!("{}d ago", delta / 86400)
    } else {
        format!("{}y ago", delta / (86400 * 365))
    }
}
