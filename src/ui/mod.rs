//! Terminal widgets and the frame layout

pub mod conversation;
pub mod dashboard;
pub mod settings;
pub mod status;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::events::View;
use crate::store::{AppStore, Focus};
use conversation::{
    get_help_text, ConversationComposer, ConversationHistory, ConversationSidebar, GeneratingIndicator, HistoryView,
};
use dashboard::Dashboard;
use settings::SettingsPanel;
use status::StatusBar;

/// Widget state that lives only in the terminal front end
#[derive(Debug, Clone)]
pub struct UiState {
    pub composer: ConversationComposer,
    pub history: ConversationHistory,
    pub settings: SettingsPanel,
    pub show_help: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            composer: ConversationComposer::new("Type a message, or / for commands"),
            history: ConversationHistory::new(),
            settings: SettingsPanel::new(),
            show_help: false,
        }
    }
}

pub fn render(frame: &mut Frame, store: &AppStore, ui: &mut UiState) {
    let area = frame.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    match store.view() {
        View::Chat => render_chat(frame, chunks[0], store, ui),
        View::Dashboard => frame.render_widget(Dashboard::new(store), chunks[0]),
        View::Settings => frame.render_widget(ui.settings.view(store.settings()), chunks[0]),
    }
    frame.render_widget(StatusBar::new(store), chunks[1]);

    if ui.show_help {
        render_help(frame, area);
    }
}

fn render_chat(frame: &mut Frame, area: Rect, store: &AppStore, ui: &mut UiState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(32), Constraint::Min(20)])
        .split(area);

    let generating = store.streaming().is_generating();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(if generating { 1 } else { 0 }),
            Constraint::Length(5),
        ])
        .split(columns[1]);

    let sidebar_focused = store.focus() == Focus::Sidebar;
    frame.render_widget(ConversationSidebar::new(store, sidebar_focused), columns[0]);
    frame.render_widget(
        HistoryView {
            history: &ui.history,
            conversation: store.active_conversation(),
            streaming: store.streaming(),
            focused: false,
        },
        rows[0],
    );
    frame.render_widget(
        GeneratingIndicator::new(store.streaming(), &store.settings().default_model),
        rows[1],
    );

    ui.composer.set_focus(!sidebar_focused);
    ui.composer.set_generating(generating);
    frame.render_widget(&ui.composer, rows[2]);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let popup = centered(area, 70, 70);
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(get_help_text())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("❓ Help (Esc to close)")
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false }),
        popup,
    );
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let width = (u32::from(area.width) * u32::from(percent_x) / 100) as u16;
    let height = (u32::from(area.height) * u32::from(percent_y) / 100) as u16;
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
