use crate::streaming::StreamingState;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Widget,
};

/// One-line indicator shown while a reply is being generated
pub struct GeneratingIndicator<'a> {
    state: &'a StreamingState,
    model: &'a str,
}

impl<'a> GeneratingIndicator<'a> {
    pub fn new(state: &'a StreamingState, model: &'a str) -> Self {
        Self { state, model }
    }
}

fn animated_dots() -> &'static str {
    let tick = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        / 300;
    match tick % 4 {
        0 => ".",
        1 => "..",
        2 => "...",
        _ => "   ",
    }
}

impl Widget for GeneratingIndicator<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if !self.state.is_generating() || area.height == 0 {
            return;
        }

        let progress = if self.state.has_content() {
            format!(" ({} chunks)", self.state.chunk_count())
        } else {
            String::new()
        };

        let indicator = Line::from(vec![
            Span::styled("🤖 ", Style::default().fg(Color::Green)),
            Span::styled(format!("{} is thinking", self.model), Style::default().fg(Color::Green)),
            Span::styled(animated_dots(), Style::default().fg(Color::Yellow)),
            Span::styled(progress, Style::default().fg(Color::DarkGray)),
            Span::styled("  Esc to stop", Style::default().fg(Color::DarkGray)),
        ]);
        buf.set_line(area.x, area.y, &indicator, area.width);
    }
}
