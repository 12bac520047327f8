use crate::ui::conversation::commands::{command_entries, parse_slash_command, CommandEntry, ParsedCommand};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Widget},
};

/// Result returned when the user interacts with the conversation composer
#[derive(Debug, PartialEq)]
pub enum ConversationResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// State for the text area within the composer
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    /// Byte offset of the cursor, always on a char boundary
    pub cursor_position: usize,
}

/// Conversation composer for user input
#[derive(Debug, Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    has_focus: bool,
    generating: bool,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            has_focus: true,
            generating: false,
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationResult {
        if key.kind != KeyEventKind::Press {
            return ConversationResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                } else {
                    // With the palette open, an incomplete command is completed instead of sent.
                    let completing = self.show_command_palette
                        && parse_slash_command(&self.state.content).is_none()
                        && self.apply_selected_command();
                    if !completing {
                        return self.submit();
                    }
                }
            }
            KeyCode::Up if self.show_command_palette => self.move_command_selection(-1),
            KeyCode::Down if self.show_command_palette => self.move_command_selection(1),
            KeyCode::Esc if self.show_command_palette => self.close_command_palette(),
            KeyCode::Tab if self.show_command_palette => {
                self.apply_selected_command();
            }
            KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if c == 'u' {
                    self.clear();
                }
            }
            KeyCode::Char(c) => {
                self.insert_char(c);
                self.sync_command_palette(c.is_whitespace());
            }
            KeyCode::Backspace => {
                if self.backspace() {
                    self.sync_command_palette(false);
                }
            }
            KeyCode::Delete => {
                if self.delete() {
                    self.sync_command_palette(false);
                }
            }
            KeyCode::Left => {
                if let Some((index, _)) = self.state.content[..self.state.cursor_position].char_indices().next_back() {
                    self.state.cursor_position = index;
                }
            }
            KeyCode::Right => {
                if let Some(c) = self.state.content[self.state.cursor_position..].chars().next() {
                    self.state.cursor_position += c.len_utf8();
                }
            }
            KeyCode::Home => {
                self.state.cursor_position = 0;
            }
            KeyCode::End => {
                self.state.cursor_position = self.state.content.len();
            }
            _ => {}
        }

        ConversationResult::None
    }

    /// Insert pasted text at the cursor
    pub fn insert_str(&mut self, text: &str) {
        let text = text.replace("\r\n", "\n");
        self.state.content.insert_str(self.state.cursor_position, &text);
        self.state.cursor_position += text.len();
    }

    /// Whether the palette is consuming navigation keys
    pub fn palette_open(&self) -> bool {
        self.show_command_palette
    }

    fn submit(&mut self) -> ConversationResult {
        if self.state.content.trim().is_empty() {
            return ConversationResult::None;
        }
        let content = std::mem::take(&mut self.state.content);
        self.state.cursor_position = 0;
        self.close_command_palette();

        match parse_slash_command(&content) {
            Some(command) => ConversationResult::Command(command),
            None => ConversationResult::Submitted(content),
        }
    }

    /// Insert a character at the cursor position
    fn insert_char(&mut self, c: char) {
        self.state.content.insert(self.state.cursor_position, c);
        self.state.cursor_position += c.len_utf8();
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        let before = &self.state.content[..self.state.cursor_position];
        match before.char_indices().next_back() {
            Some((index, _)) => {
                self.state.content.remove(index);
                self.state.cursor_position = index;
                true
            }
            None => false,
        }
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.state.cursor_position < self.state.content.len() {
            self.state.content.remove(self.state.cursor_position);
            true
        } else {
            false
        }
    }

    fn sync_command_palette(&mut self, typed_whitespace: bool) {
        let is_command = self.state.content.starts_with('/');
        if !is_command || typed_whitespace {
            self.close_command_palette();
        } else if self.show_command_palette {
            self.refresh_command_palette();
        } else if self.state.content == "/" {
            self.open_command_palette();
        }
    }

    fn open_command_palette(&mut self) {
        self.show_command_palette = true;
        self.selected_command = Some(0);
        self.refresh_command_palette();
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = command_entries()
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        if self.filtered_commands.is_empty() {
            self.selected_command = None;
        } else {
            let index = self.selected_command.unwrap_or(0);
            self.selected_command = Some(index.min(self.filtered_commands.len() - 1));
        }
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let len = self.filtered_commands.len() as isize;
        let current = self.selected_command.unwrap_or(0) as isize;
        self.selected_command = Some((current + delta).rem_euclid(len) as usize);
    }

    fn apply_selected_command(&mut self) -> bool {
        let Some(entry) = self
            .selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .copied()
        else {
            return false;
        };

        self.state.content = format!("/{} ", entry.keyword);
        self.state.cursor_position = self.state.content.len();
        self.close_command_palette();
        true
    }

    /// Set focus state
    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Reflect whether a reply is being generated in the title
    pub fn set_generating(&mut self, generating: bool) {
        self.generating = generating;
    }

    /// Get current content
    pub fn content(&self) -> &str {
        &self.state.content
    }

    /// Clear content
    pub fn clear(&mut self) {
        self.state.content.clear();
        self.state.cursor_position = 0;
        self.close_command_palette();
    }

    fn title(&self) -> &'static str {
        if self.generating {
            "✍️  Message (Esc to stop)"
        } else {
            "✍️  Message"
        }
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let state = &self.state;

        // Create the input block
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title())
            .style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        // Render content or placeholder
        if state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
        } else {
            // Render content with cursor indicator
            let mut content = state.content.clone();
            if self.has_focus {
                content.insert(state.cursor_position.min(content.len()), '▌');
            }

            let lines: Vec<&str> = content.split('\n').collect();
            let skip = lines.len().saturating_sub(inner_area.height as usize);
            for (i, line_text) in lines.iter().skip(skip).enumerate() {
                let line = Line::from(vec![Span::raw(*line_text)]);
                buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
            }
        }

        // Render command palette above the composer
        if self.show_command_palette && !self.filtered_commands.is_empty() {
            let palette_height = (self.filtered_commands.len().min(6) + 2) as u16;
            let palette_area = Rect {
                x: area.x,
                y: area.y.saturating_sub(palette_height),
                width: area.width,
                height: palette_height.min(area.y),
            };
            if palette_area.height < 3 {
                return;
            }

            Clear.render(palette_area, buf);
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Commands")
                .style(Style::default().fg(Color::Blue));
            let inner = block.inner(palette_area);
            block.render(palette_area, buf);

            // Keep the selected entry visible
            let visible = inner.height as usize;
            let selected = self.selected_command.unwrap_or(0);
            let offset = selected.saturating_sub(visible.saturating_sub(1));

            for (row, (index, entry)) in self
                .filtered_commands
                .iter()
                .enumerate()
                .skip(offset)
                .take(visible)
                .enumerate()
            {
                let style = if self.selected_command == Some(index) {
                    Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled(" — ", Style::default().fg(Color::DarkGray)),
                    Span::styled(entry.description, Style::default().fg(Color::Gray)),
                ]);

                buf.set_line(inner.x, inner.y + row as u16, &line, inner.width);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::conversation::commands::SlashCommand;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(composer: &mut ConversationComposer, text: &str) {
        for c in text.chars() {
            composer.handle_key(press(KeyCode::Char(c)));
        }
    }

    #[test]
    fn enter_submits_and_clears() {
        let mut composer = ConversationComposer::new("Ask anything");
        type_text(&mut composer, "héllo");
        assert_eq!(
            composer.handle_key(press(KeyCode::Enter)),
            ConversationResult::Submitted("héllo".to_string())
        );
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn whitespace_only_is_not_submitted() {
        let mut composer = ConversationComposer::new("Ask anything");
        type_text(&mut composer, "   ");
        assert_eq!(composer.handle_key(press(KeyCode::Enter)), ConversationResult::None);
    }

    #[test]
    fn shift_enter_inserts_newline() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "a");
        composer.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT));
        type_text(&mut composer, "b");
        assert_eq!(composer.content(), "a\nb");
    }

    #[test]
    fn cursor_moves_over_multibyte_chars() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "añb");
        composer.handle_key(press(KeyCode::Left));
        composer.handle_key(press(KeyCode::Backspace));
        assert_eq!(composer.content(), "ab");
        composer.handle_key(press(KeyCode::Home));
        composer.handle_key(press(KeyCode::Delete));
        assert_eq!(composer.content(), "b");
    }

    #[test]
    fn palette_completes_command() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "/ren");
        assert!(composer.palette_open());
        composer.handle_key(press(KeyCode::Tab));
        assert_eq!(composer.content(), "/rename ");
        assert!(!composer.palette_open());
        type_text(&mut composer, "Notes");
        match composer.handle_key(press(KeyCode::Enter)) {
            ConversationResult::Command(parsed) => {
                assert_eq!(parsed.command, SlashCommand::Rename);
                assert_eq!(parsed.argument(), Some("Notes"));
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn enter_submits_complete_command_with_palette_open() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "/stop");
        assert!(composer.palette_open());
        match composer.handle_key(press(KeyCode::Enter)) {
            ConversationResult::Command(parsed) => assert_eq!(parsed.command, SlashCommand::Stop),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn enter_completes_partial_command_or_sends_unmatched_text() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "/ren");
        assert_eq!(composer.handle_key(press(KeyCode::Enter)), ConversationResult::None);
        assert_eq!(composer.content(), "/rename ");

        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "/zz");
        assert!(composer.palette_open());
        assert_eq!(
            composer.handle_key(press(KeyCode::Enter)),
            ConversationResult::Submitted("/zz".to_string())
        );
    }

    #[test]
    fn esc_closes_palette_without_clearing() {
        let mut composer = ConversationComposer::new("");
        type_text(&mut composer, "/");
        composer.handle_key(press(KeyCode::Esc));
        assert!(!composer.palette_open());
        assert_eq!(composer.content(), "/");
    }
}
