//! Settings panel: a list of fields adjusted with the arrow keys

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::api::ModelInfo;
use crate::config::Settings;
use crate::store::AppStore;

const THEMES: [&str; 2] = ["dark", "light"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCount)]
pub enum SettingsField {
    Model,
    Temperature,
    TopP,
    TopK,
    MaxTokens,
    Stream,
    Theme,
    AutoSave,
}

impl SettingsField {
    pub fn label(self) -> &'static str {
        match self {
            SettingsField::Model => "Default model",
            SettingsField::Temperature => "Temperature",
            SettingsField::TopP => "Top P",
            SettingsField::TopK => "Top K",
            SettingsField::MaxTokens => "Max tokens",
            SettingsField::Stream => "Stream responses",
            SettingsField::Theme => "Theme",
            SettingsField::AutoSave => "Auto save",
        }
    }

    fn value(self, settings: &Settings) -> String {
        match self {
            SettingsField::Model => settings.default_model.clone(),
            SettingsField::Temperature => format!("{:.1}", settings.temperature),
            SettingsField::TopP => format!("{:.2}", settings.top_p),
            SettingsField::TopK => settings.top_k.to_string(),
            SettingsField::MaxTokens => settings.max_tokens.to_string(),
            SettingsField::Stream => on_off(settings.stream_responses).to_string(),
            SettingsField::Theme => settings.theme.clone(),
            SettingsField::AutoSave => on_off(settings.auto_save).to_string(),
        }
    }

    /// Step the field one notch in `direction` (-1 or 1); clamping happens in the store
    fn adjust(self, settings: &mut Settings, direction: i32, models: &[ModelInfo]) {
        match self {
            SettingsField::Model => {
                let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                if let Some(next) = cycle(&names, &settings.default_model, direction) {
                    settings.default_model = next.to_string();
                }
            }
            SettingsField::Temperature => {
                settings.temperature = round_to(settings.temperature + 0.1 * direction as f32, 10.0);
            }
            SettingsField::TopP => {
                settings.top_p = round_to(settings.top_p + 0.05 * direction as f32, 100.0);
            }
            SettingsField::TopK => {
                settings.top_k = settings.top_k.saturating_add_signed(direction);
            }
            SettingsField::MaxTokens => {
                settings.max_tokens = settings.max_tokens.saturating_add_signed(256 * direction);
            }
            SettingsField::Stream => settings.stream_responses = !settings.stream_responses,
            SettingsField::Theme => {
                if let Some(next) = cycle(&THEMES, &settings.theme, direction) {
                    settings.theme = next.to_string();
                }
            }
            SettingsField::AutoSave => settings.auto_save = !settings.auto_save,
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn round_to(value: f32, scale: f32) -> f32 {
    (value * scale).round() / scale
}

/// Next entry after `current` in `options`, wrapping; the first entry if `current` is unknown
fn cycle<'a>(options: &[&'a str], current: &str, direction: i32) -> Option<&'a str> {
    if options.is_empty() {
        return None;
    }
    let len = options.len() as i32;
    let next = match options.iter().position(|o| *o == current) {
        Some(index) => (index as i32 + direction).rem_euclid(len),
        None => 0,
    };
    Some(options[next as usize])
}

#[derive(Debug, Clone, Default)]
pub struct SettingsPanel {
    selected: usize,
}

impl SettingsPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_field(&self) -> SettingsField {
        SettingsField::iter().nth(self.selected).unwrap_or(SettingsField::Model)
    }

    /// Handle a key; returns true if it changed a setting
    pub fn handle_key(&mut self, store: &mut AppStore, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        let direction = match key.code {
            KeyCode::Up => {
                self.selected = (self.selected + SettingsField::COUNT - 1) % SettingsField::COUNT;
                return false;
            }
            KeyCode::Down => {
                self.selected = (self.selected + 1) % SettingsField::COUNT;
                return false;
            }
            KeyCode::Left | KeyCode::Char('-') => -1,
            KeyCode::Right | KeyCode::Char('+') | KeyCode::Enter | KeyCode::Char(' ') => 1,
            _ => return false,
        };

        let field = self.selected_field();
        let models = store.models().to_vec();
        store.update_settings(|settings| field.adjust(settings, direction, &models));
        tracing::debug!(field = field.label(), "setting changed");
        true
    }

    pub fn view<'a>(&'a self, settings: &'a Settings) -> SettingsView<'a> {
        SettingsView { panel: self, settings }
    }
}

pub struct SettingsView<'a> {
    panel: &'a SettingsPanel,
    settings: &'a Settings,
}

impl Widget for SettingsView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("⚙️  Settings (↑/↓ select, ←/→ change)");
        let inner = block.inner(area);
        block.render(area, buf);

        for (row, field) in SettingsField::iter().enumerate() {
            if row >= inner.height as usize {
                break;
            }
            let selected = row == self.panel.selected;
            let label_style = if selected {
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            let line = Line::from(vec![
                Span::styled(format!(" {:<18}", field.label()), label_style),
                Span::raw("  "),
                Span::styled(field.value(self.settings), Style::default().fg(Color::White)),
            ]);
            buf.set_line(inner.x, inner.y + row as u16, &line, inner.width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn temperature_steps_and_clamps() {
        let mut store = AppStore::new(Settings::default());
        let mut panel = SettingsPanel::new();
        panel.handle_key(&mut store, press(KeyCode::Down));
        assert_eq!(panel.selected_field(), SettingsField::Temperature);

        assert!(panel.handle_key(&mut store, press(KeyCode::Right)));
        assert!((store.settings().temperature - 0.8).abs() < f32::EPSILON);

        for _ in 0..30 {
            panel.handle_key(&mut store, press(KeyCode::Right));
        }
        assert_eq!(store.settings().temperature, 2.0);
        assert!(store.take_settings_dirty());
    }

    #[test]
    fn selection_wraps_upwards() {
        let mut store = AppStore::new(Settings::default());
        let mut panel = SettingsPanel::new();
        panel.handle_key(&mut store, press(KeyCode::Up));
        assert_eq!(panel.selected_field(), SettingsField::AutoSave);
    }

    #[test]
    fn model_cycles_through_known_models() {
        let mut store = AppStore::new(Settings::default());
        store.set_models(vec![
            ModelInfo { name: "dolphin-mistral".into() },
            ModelInfo { name: "llama3".into() },
        ]);
        let mut panel = SettingsPanel::new();
        panel.handle_key(&mut store, press(KeyCode::Right));
        assert_eq!(store.settings().default_model, "llama3");
        panel.handle_key(&mut store, press(KeyCode::Right));
        assert_eq!(store.settings().default_model, "dolphin-mistral");
    }

    #[test]
    fn top_k_never_drops_below_one() {
        let mut store = AppStore::new(Settings::default());
        store.update_settings(|s| s.top_k = 1);
        let mut panel = SettingsPanel::new();
        for _ in 0..3 {
            panel.handle_key(&mut store, press(KeyCode::Down));
        }
        assert_eq!(panel.selected_field(), SettingsField::TopK);
        panel.handle_key(&mut store, press(KeyCode::Left));
        assert_eq!(store.settings().top_k, 1);
    }

    #[test]
    fn toggles_flip_booleans() {
        let mut store = AppStore::new(Settings::default());
        let mut panel = SettingsPanel::new();
        for _ in 0..5 {
            panel.handle_key(&mut store, press(KeyCode::Down));
        }
        assert_eq!(panel.selected_field(), SettingsField::Stream);
        panel.handle_key(&mut store, press(KeyCode::Enter));
        assert!(!store.settings().stream_responses);
    }
}
