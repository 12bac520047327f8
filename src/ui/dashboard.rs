//! Analytics dashboard: aggregate counters, installed models and prompts

use crate::store::AppStore;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

pub struct Dashboard<'a> {
    store: &'a AppStore,
}

impl<'a> Dashboard<'a> {
    pub fn new(store: &'a AppStore) -> Self {
        Self { store }
    }
}

fn stat_line(label: &str, total: String, today: Option<u64>) -> Line<'static> {
    let mut spans = vec![
        Span::styled(format!("{label:<22}"), Style::default().fg(Color::Gray)),
        Span::styled(total, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
    ];
    if let Some(today) = today {
        spans.push(Span::styled(format!("  (+{today} today)"), Style::default().fg(Color::Green)));
    }
    Line::from(spans)
}

impl Widget for Dashboard<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(9), Constraint::Min(3)])
            .split(area);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);

        let stats_block = Block::default().borders(Borders::ALL).title("📊 Usage");
        let stats_lines = match self.store.stats() {
            Some(stats) => vec![
                stat_line(
                    "Conversations",
                    stats.total_conversations.to_string(),
                    Some(stats.conversations_today),
                ),
                stat_line("Messages", stats.total_messages.to_string(), Some(stats.messages_today)),
                stat_line("Tokens", stats.total_tokens.to_string(), Some(stats.tokens_today)),
                stat_line("Avg response time", format!("{:.2}s", stats.avg_response_time), None),
                stat_line("Active model", stats.active_model.clone(), None),
            ],
            None => vec![Line::from(Span::styled(
                "Loading statistics...",
                Style::default().fg(Color::DarkGray),
            ))],
        };
        Paragraph::new(stats_lines).block(stats_block).render(rows[0], buf);

        let default_model = self.store.settings().default_model.as_str();
        let model_lines: Vec<Line> = if self.store.models().is_empty() {
            vec![Line::from(Span::styled("No models reported", Style::default().fg(Color::DarkGray)))]
        } else {
            self.store
                .models()
                .iter()
                .map(|model| {
                    let (marker, style) = if model.name == default_model {
                        ("● ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
                    } else {
                        ("  ", Style::default().fg(Color::White))
                    };
                    Line::from(vec![Span::raw(marker), Span::styled(model.name.clone(), style)])
                })
                .collect()
        };
        Paragraph::new(model_lines)
            .block(Block::default().borders(Borders::ALL).title("🧠 Models"))
            .render(columns[0], buf);

        let prompt_lines: Vec<Line> = if self.store.prompts().is_empty() {
            vec![Line::from(Span::styled("No system prompts", Style::default().fg(Color::DarkGray)))]
        } else {
            self.store
                .prompts()
                .iter()
                .map(|prompt| {
                    let mut spans = vec![Span::styled(
                        prompt.name.clone(),
                        Style::default().fg(Color::Cyan),
                    )];
                    if prompt.is_default {
                        spans.push(Span::styled(" (default)", Style::default().fg(Color::Green)));
                    }
                    if let Some(description) = &prompt.description {
                        spans.push(Span::styled(format!(" - {description}"), Style::default().fg(Color::Gray)));
                    }
                    Line::from(spans)
                })
                .collect()
        };
        Paragraph::new(prompt_lines)
            .block(Block::default().borders(Borders::ALL).title("📝 System prompts"))
            .wrap(Wrap { trim: true })
            .render(columns[1], buf);
    }
}
