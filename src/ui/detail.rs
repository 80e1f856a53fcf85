use crate::app::{App, ContentState};
use crate::ui::list::format_relative_time;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use std::borrow::Cow;

/// Render the item detail view
pub fn render(f: &mut Frame, app: &mut App, area: Rect) {
    // Layout may produce zero-sized rects during extreme terminal resizes
    if area.width < 3 || area.height < 3 {
        return;
    }

    // Visible lines for scroll clamping (area height minus 2 for borders)
    app.detail_visible_lines = area.height.saturating_sub(2) as usize;
    app.clamp_detail_scroll();

    let Some(item) = app.selected_item() else {
        let paragraph = Paragraph::new("No item selected")
            .block(Block::default().borders(Borders::ALL).title("Detail"));
        f.render_widget(paragraph, area);
        return;
    };

    let byline = if item.author.is_empty() {
        format_relative_time(item.published_at)
    } else {
        format!(
            "{} · {}",
            item.author,
            format_relative_time(item.published_at)
        )
    };
    let header = vec![
        Line::from(Span::styled(
            item.title.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(byline, Style::default().fg(Color::DarkGray))),
        Line::from(""),
    ];

    // Until the markup conversion has run, show the loading indicator.
    let content_lines: Cow<'_, [Line<'static>]> = match &app.content {
        ContentState::Idle | ContentState::Loading { .. } => {
            Cow::Owned(vec![Line::from("Loading…")])
        }
        ContentState::Loaded { lines, .. } => Cow::Borrowed(lines),
    };

    let text = Text::from_iter(header.into_iter().chain(content_lines.iter().cloned()));

    // ratatui's scroll offset is u16; content beyond line 65535 is not
    // reachable by scrolling, which is fine for feed entries.
    const MAX_SCROLL: usize = u16::MAX as usize;
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Item"))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll_offset.min(MAX_SCROLL) as u16, 0));

    f.render_widget(paragraph, area);
}

/// Convert item markup to styled ratatui lines.
///
/// Feed bodies are markup of varying discipline; pulldown-cmark handles the
/// markdown-ish structure and raw inline HTML events are passed through as
/// plain text rather than dropped.
pub fn render_markup(src: &str) -> Vec<Line<'static>> {
    let parser = Parser::new(src);
    let mut lines: Vec<Line<'static>> = Vec::with_capacity(src.lines().count());
    let mut current_spans: Vec<Span<'static>> = Vec::with_capacity(4);
    let mut in_code_block = false;
    let mut in_heading = false;
    let mut in_emphasis = false;
    let mut in_strong = false;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                in_heading = true;
            }
            Event::End(TagEnd::Heading(_)) => {
                if !current_spans.is_empty() {
                    lines.push(Line::from(std::mem::take(&mut current_spans)));
                }
                in_heading = false;
            }
            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => {
                if !current_spans.is_empty() {
                    lines.push(Line::from(std::mem::take(&mut current_spans)));
                }
                lines.push(Line::from("")); // Blank line after paragraph
            }
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                lines.push(Line::from(""));
            }
            Event::Start(Tag::Emphasis) => {
                in_emphasis = true;
            }
            Event::End(TagEnd::Emphasis) => {
                in_emphasis = false;
            }
            Event::Start(Tag::Strong) => {
                in_strong = true;
            }
            Event::End(TagEnd::Strong) => {
                in_strong = false;
            }
            Event::Start(Tag::Link { .. }) => {}
            Event::End(TagEnd::Link) => {}
            Event::Start(Tag::Image { dest_url, .. }) => {
                current_spans.push(Span::styled(
                    format!("[Image: {}]", dest_url),
                    Style::default().fg(Color::Blue),
                ));
            }
            Event::Text(text) => {
                let style = if in_code_block {
                    Style::default().fg(Color::Yellow)
                } else if in_heading {
                    Style::default()
                        .add_modifier(Modifier::BOLD)
                        .fg(Color::Cyan)
                } else if in_strong {
                    Style::default().add_modifier(Modifier::BOLD)
                } else if in_emphasis {
                    Style::default().add_modifier(Modifier::ITALIC)
                } else {
                    Style::default()
                };
                current_spans.push(Span::styled(text.into_string(), style));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                // Feed bodies are frequently HTML; show the text content
                // between tags instead of losing it.
                let stripped = strip_tags(&html);
                if !stripped.trim().is_empty() {
                    current_spans.push(Span::raw(stripped));
                }
            }
            Event::Code(code) => {
                current_spans.push(Span::styled(
                    format!("`{}`", code),
                    Style::default().fg(Color::Yellow),
                ));
            }
            Event::SoftBreak => {
                current_spans.push(Span::raw(" "));
            }
            Event::HardBreak => {
                if !current_spans.is_empty() {
                    lines.push(Line::from(std::mem::take(&mut current_spans)));
                }
            }
            _ => {}
        }
    }

    // Flush remaining spans
    if !current_spans.is_empty() {
        lines.push(Line::from(current_spans));
    }

    lines
}

/// Drop `<...>` tag spans, keeping text content.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
