//! Conversation list shown on the left of the chat view

use crate::store::AppStore;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

pub struct ConversationSidebar<'a> {
    store: &'a AppStore,
    focused: bool,
}

impl<'a> ConversationSidebar<'a> {
    pub fn new(store: &'a AppStore, focused: bool) -> Self {
        Self { store, focused }
    }

    fn title(&self) -> String {
        match self.store.search_query() {
            Some(query) => format!("🔎 \"{query}\""),
            None => format!("📚 Conversations ({})", self.store.conversations().len()),
        }
    }
}

impl Widget for ConversationSidebar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title())
            .border_style(Style::default().fg(if self.focused { Color::Cyan } else { Color::Gray }));
        let inner = block.inner(area);
        block.render(area, buf);

        let conversations = self.store.visible_conversations();
        if conversations.is_empty() {
            let empty = if self.store.search_query().is_some() {
                "No matches"
            } else {
                "No conversations yet"
            };
            let line = Line::from(Span::styled(empty, Style::default().fg(Color::DarkGray)));
            buf.set_line(inner.x, inner.y, &line, inner.width);
            return;
        }

        // Keep the selected row visible
        let height = inner.height as usize;
        let selected = self.store.selected_index();
        let offset = selected.saturating_sub(height.saturating_sub(1));
        let active_id = self.store.active_id();

        for (row, (index, conversation)) in conversations
            .iter()
            .enumerate()
            .skip(offset)
            .take(height)
            .enumerate()
        {
            let marker = if conversation.is_pinned { "📌 " } else { "   " };
            let mut style = Style::default().fg(Color::White);
            if active_id == Some(conversation.uuid.as_str()) {
                style = style.fg(Color::Green).add_modifier(Modifier::BOLD);
            }
            if index == selected && self.focused {
                style = style.bg(Color::DarkGray);
            }

            let line = Line::from(vec![
                Span::raw(marker),
                Span::styled(conversation.title.as_str(), style),
                Span::styled(
                    format!(" {}", conversation.updated_at.format("%m-%d")),
                    Style::default().fg(Color::DarkGray),
                ),
            ]);
            buf.set_line(inner.x, inner.y + row as u16, &line, inner.width);
        }
    }
}
