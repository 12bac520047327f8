//! Conversation history display component

use crate::api::{Conversation, Message, Role};
use crate::streaming::StreamingState;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Scrollbar, ScrollbarOrientation, ScrollbarState, StatefulWidget, Widget},
};

/// Conversation history display component
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    /// Lines scrolled up from the bottom; zero follows new output
    scroll_offset: usize,
}

/// Borrowed view of everything the history pane draws
pub struct HistoryView<'a> {
    pub history: &'a ConversationHistory,
    pub conversation: Option<&'a Conversation>,
    pub streaming: &'a StreamingState,
    pub focused: bool,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scroll up
    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    /// Scroll down
    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Scroll to bottom
    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }
}

impl Widget for HistoryView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = match self.conversation {
            Some(conversation) => format!("💬 {}", conversation.title),
            None => "💬 New conversation".to_string(),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(if self.focused { Color::Cyan } else { Color::Gray }));

        let inner_area = block.inner(area);
        block.render(area, buf);

        let messages = self.conversation.map(|c| c.messages.as_slice()).unwrap_or_default();
        if messages.is_empty() && !self.streaming.is_generating() {
            for (i, line) in welcome_lines().iter().enumerate() {
                if i < inner_area.height as usize {
                    buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
                }
            }
            return;
        }

        let width = inner_area.width.saturating_sub(2) as usize;
        let mut all_lines: Vec<Line> = Vec::new();
        for message in messages {
            all_lines.extend(render_message(message, width));
            all_lines.push(Line::from(""));
        }
        if self.streaming.is_generating() {
            all_lines.extend(render_streaming(self.streaming, width));
        }

        // Display from the bottom, shifted up by the scroll offset
        let height = inner_area.height as usize;
        let total = all_lines.len();
        let max_offset = total.saturating_sub(height);
        let offset = self.history.scroll_offset.min(max_offset);
        let start = max_offset - offset;

        for (i, line) in all_lines.iter().skip(start).take(height).enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }

        if total > height {
            let mut state = ScrollbarState::new(max_offset).position(start);
            Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .render(area, buf, &mut state);
        }
    }
}

fn welcome_lines() -> Vec<Line<'static>> {
    vec![
        Line::from(vec![Span::styled("Welcome to LocalAI chat! 🚀", Style::default().fg(Color::Green))]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Type a message below to start a new conversation.",
            Style::default().fg(Color::Gray),
        )]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Enter to send, Shift+Enter for new line, /help for commands.",
            Style::default().fg(Color::DarkGray),
        )]),
    ]
}

/// Render a single message into lines
fn render_message(message: &Message, width: usize) -> Vec<Line<'static>> {
    let role_icon = match message.role {
        Role::User => "👤",
        Role::Assistant => "🤖",
        Role::System => "⚙️",
    };

    let mut header = format!("{} {}", role_icon, message.created_at.format("%H:%M:%S"));
    if let Some(model) = &message.model {
        header.push_str(&format!(" · {model}"));
    }
    if message.tokens > 0 {
        header.push_str(&format!(" · {} tokens", message.tokens));
    }
    if let Some(seconds) = message.generation_time {
        header.push_str(&format!(" · {seconds:.1}s"));
    }
    if message.is_edited {
        header.push_str(" · edited");
    }

    let mut lines = vec![Line::from(vec![Span::styled(header, Style::default().fg(Color::DarkGray))])];
    for content_line in wrap_text(&message.content, width) {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(content_line, content_style(message.role)),
        ]));
    }
    lines
}

/// Render the reply being generated with a typing cursor
fn render_streaming(streaming: &StreamingState, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![Span::styled(
        "🤖 generating ─────",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )])];

    let content_lines = wrap_text(streaming.text(), width);
    let last = content_lines.len().saturating_sub(1);
    for (i, content_line) in content_lines.into_iter().enumerate() {
        let cursor = if i == last { "▋" } else { "" };
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(content_line, Style::default().fg(Color::Green)),
            Span::styled(cursor, Style::default().fg(Color::Yellow)),
        ]));
    }
    lines
}

/// Get content style based on role
fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Blue),
        Role::Assistant => Style::default().fg(Color::Green),
        Role::System => Style::default().fg(Color::Yellow),
    }
}

/// Wrap text to fit within the given width, keeping explicit line breaks
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            let word_width = word.chars().count();
            if current_width > 0 && current_width + word_width + 1 > width {
                lines.push(std::mem::take(&mut current_line));
                current_width = 0;
            }
            if current_width > 0 {
                current_line.push(' ');
                current_width += 1;
            }
            current_line.push_str(word);
            current_width += word_width;
        }

        lines.push(current_line);
    }

    lines
}
