use crate::events::{NotificationLevel, View};
use crate::store::AppStore;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

/// Bottom status bar: view tabs, model, streaming flag and the latest notification
pub struct StatusBar<'a> {
    store: &'a AppStore,
}

impl<'a> StatusBar<'a> {
    pub fn new(store: &'a AppStore) -> Self {
        Self { store }
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut spans = Vec::new();
        for (key, view) in [("F1", View::Chat), ("F2", View::Dashboard), ("F3", View::Settings)] {
            let style = if self.store.view() == view {
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            spans.push(Span::styled(format!(" {key} {} ", view.display_name()), style));
        }

        let settings = self.store.settings();
        spans.push(Span::styled(
            format!(" │ {} ", settings.default_model),
            Style::default().fg(Color::Magenta),
        ));
        spans.push(Span::styled(
            if settings.stream_responses { "stream " } else { "blocking " },
            Style::default().fg(Color::DarkGray),
        ));
        if self.store.streaming().is_generating() {
            spans.push(Span::styled("● generating ", Style::default().fg(Color::Yellow)));
        }

        if let Some(notification) = self.store.latest_notification() {
            let (icon, color) = match notification.level {
                NotificationLevel::Info => ("ℹ️ ", Color::Cyan),
                NotificationLevel::Success => ("✅", Color::Green),
                NotificationLevel::Error => ("❌", Color::Red),
            };
            spans.push(Span::styled(
                format!("│ {icon} {}", notification.text),
                Style::default().fg(color),
            ));
        }

        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}
