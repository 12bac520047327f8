//! Terminal runtime: owns the store and orchestrator and routes input.

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;

use crate::api::{ApiClient, ChatBackend, Conversation, ConversationUpdate, Role};
use crate::config::{Config, Settings};
use crate::events::{NotificationLevel, TuiEvent, View};
use crate::orchestrator::{Orchestrator, SendOutcome};
use crate::store::{AppStore, Focus};
use crate::ui::conversation::{ConversationResult, ParsedCommand, SlashCommand};
use crate::ui::{self, UiState};

type Tui = Terminal<CrosstermBackend<Stdout>>;

const TICK: Duration = Duration::from_millis(250);
const NOTIFICATION_TTL: Duration = Duration::from_secs(6);
const SCROLL_STEP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Continue,
    Quit,
}

/// Run the TUI until the user quits
pub async fn run(config: Config) -> Result<()> {
    let backend = Arc::new(ApiClient::new(&config).context("Failed to build HTTP client")?);
    tracing::info!(base_url = backend.base_url(), "starting TUI");

    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, &config, backend).await;
    let restored = restore_terminal(&mut terminal);

    result.and(restored)
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).context("Failed to enter alternate screen")?;

    // Leave the alternate screen before a panic message is printed
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableBracketedPaste);
        default_hook(info);
    }));

    Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableBracketedPaste)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Forward terminal input from a blocking thread
fn spawn_input_thread(tx: mpsc::UnboundedSender<TuiEvent>) {
    std::thread::spawn(move || loop {
        let event = match event::read() {
            Ok(Event::Key(key)) => TuiEvent::Key(key),
            Ok(Event::Paste(text)) => TuiEvent::Paste(text),
            Ok(Event::Resize(width, height)) => TuiEvent::Resize(width, height),
            Ok(_) => continue,
            Err(error) => {
                tracing::error!("terminal input failed: {error}");
                break;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    });
}

async fn run_loop<B: ChatBackend>(terminal: &mut Tui, config: &Config, backend: Arc<B>) -> Result<()> {
    let (app_tx, mut app_rx) = mpsc::unbounded_channel();
    let (tui_tx, mut tui_rx) = mpsc::unbounded_channel();
    spawn_input_thread(tui_tx);

    let mut orchestrator = Orchestrator::new(backend, app_tx);
    let mut store = AppStore::new(config.settings.clone());
    let mut ui = UiState::default();
    let mut saved_settings = config.settings.clone();

    orchestrator.refresh_index();
    orchestrator.refresh_stats(true);
    orchestrator.refresh_models();
    orchestrator.refresh_prompts();

    let mut poll = tokio::time::interval(config.poll_interval());
    poll.tick().await;
    let mut tick = tokio::time::interval(TICK);

    loop {
        terminal
            .draw(|frame| ui::render(frame, &store, &mut ui))
            .context("Failed to draw frame")?;

        let control = tokio::select! {
            Some(event) = app_rx.recv() => {
                orchestrator.apply(&mut store, event);
                Control::Continue
            }
            Some(event) = tui_rx.recv() => handle_tui_event(event, &mut store, &mut ui, &mut orchestrator),
            _ = poll.tick() => {
                tracing::debug!("polling conversations and stats");
                orchestrator.poll();
                Control::Continue
            }
            _ = tick.tick() => {
                store.expire_notifications(NOTIFICATION_TTL);
                Control::Continue
            }
        };

        if store.take_settings_dirty() {
            persist_settings(config, &mut saved_settings, &mut store);
        }
        if control == Control::Quit {
            tracing::info!("quitting");
            orchestrator.stop(&mut store);
            return Ok(());
        }
    }
}

/// Save settings when autosave is on, or when autosave was just switched off
fn persist_settings(config: &Config, saved: &mut Settings, store: &mut AppStore) {
    let settings = store.settings().clone();
    if !settings.auto_save && !saved.auto_save {
        return;
    }
    match config.save_settings(&settings) {
        Ok(()) => {
            tracing::debug!("settings saved");
            *saved = settings;
        }
        Err(error) => {
            tracing::warn!("failed to save settings: {error:#}");
            store.notify(NotificationLevel::Error, "Could not save settings.");
        }
    }
}

fn handle_tui_event<B: ChatBackend>(
    event: TuiEvent,
    store: &mut AppStore,
    ui: &mut UiState,
    orchestrator: &mut Orchestrator<B>,
) -> Control {
    match event {
        TuiEvent::Key(key) => handle_key(key, store, ui, orchestrator),
        TuiEvent::Paste(text) => {
            if store.view() == View::Chat && store.focus() == Focus::Composer {
                ui.composer.insert_str(&text);
            }
            Control::Continue
        }
        TuiEvent::Resize(..) => Control::Continue,
    }
}

fn handle_key<B: ChatBackend>(
    key: KeyEvent,
    store: &mut AppStore,
    ui: &mut UiState,
    orchestrator: &mut Orchestrator<B>,
) -> Control {
    if key.kind != KeyEventKind::Press {
        return Control::Continue;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Control::Quit;
    }
    if ui.show_help {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
            ui.show_help = false;
        }
        return Control::Continue;
    }

    match key.code {
        KeyCode::F(1) => return switch_view(View::Chat, store, orchestrator),
        KeyCode::F(2) => return switch_view(View::Dashboard, store, orchestrator),
        KeyCode::F(3) => return switch_view(View::Settings, store, orchestrator),
        KeyCode::Esc if !ui.composer.palette_open() => {
            if orchestrator.stop(store) {
                return Control::Continue;
            }
            if store.view() != View::Chat {
                return switch_view(View::Chat, store, orchestrator);
            }
            return Control::Continue;
        }
        _ => {}
    }

    match store.view() {
        View::Settings => {
            ui.settings.handle_key(store, key);
            Control::Continue
        }
        View::Dashboard => {
            if key.code == KeyCode::Char('r') {
                orchestrator.refresh_stats(false);
                orchestrator.refresh_models();
                orchestrator.refresh_prompts();
            }
            Control::Continue
        }
        View::Chat => handle_chat_key(key, store, ui, orchestrator),
    }
}

fn handle_chat_key<B: ChatBackend>(
    key: KeyEvent,
    store: &mut AppStore,
    ui: &mut UiState,
    orchestrator: &mut Orchestrator<B>,
) -> Control {
    match key.code {
        KeyCode::Tab if !ui.composer.palette_open() => {
            store.toggle_focus();
            return Control::Continue;
        }
        KeyCode::PageUp => {
            ui.history.scroll_up(SCROLL_STEP);
            return Control::Continue;
        }
        KeyCode::PageDown => {
            ui.history.scroll_down(SCROLL_STEP);
            return Control::Continue;
        }
        _ => {}
    }

    if store.focus() == Focus::Sidebar {
        match key.code {
            KeyCode::Up => store.move_selection(-1),
            KeyCode::Down => store.move_selection(1),
            KeyCode::Enter => {
                if let Some(id) = store.selected_conversation().map(|c| c.uuid.clone()) {
                    if orchestrator.open_conversation(store, &id) {
                        ui.history.scroll_to_bottom();
                        store.toggle_focus();
                    }
                }
            }
            _ => {}
        }
        return Control::Continue;
    }

    match ui.composer.handle_key(key) {
        ConversationResult::Submitted(text) => {
            match orchestrator.send_message(store, &text) {
                SendOutcome::Started => ui.history.scroll_to_bottom(),
                SendOutcome::Busy => ui.composer.insert_str(&text),
                SendOutcome::Empty => {}
            }
            Control::Continue
        }
        ConversationResult::Command(parsed) => handle_command(parsed, store, ui, orchestrator),
        ConversationResult::None => Control::Continue,
    }
}

fn switch_view<B: ChatBackend>(view: View, store: &mut AppStore, orchestrator: &Orchestrator<B>) -> Control {
    if view == View::Dashboard && store.view() != View::Dashboard {
        orchestrator.refresh_stats(false);
    }
    store.set_view(view);
    Control::Continue
}

/// Metadata of the active conversation, from the loaded copy or the index
fn active_summary(store: &AppStore) -> Option<Conversation> {
    let id = store.active_id()?;
    store
        .active_conversation()
        .or_else(|| store.conversations().iter().find(|c| c.uuid == id))
        .cloned()
}

fn handle_command<B: ChatBackend>(
    parsed: ParsedCommand,
    store: &mut AppStore,
    ui: &mut UiState,
    orchestrator: &mut Orchestrator<B>,
) -> Control {
    let command = parsed.command;
    tracing::debug!(command = command.command(), "slash command");

    if store.streaming().is_generating() && !command.available_during_generation() {
        store.notify(
            NotificationLevel::Info,
            format!("/{} is not available while a reply is being generated.", command.command()),
        );
        return Control::Continue;
    }

    let needs_active = matches!(
        command,
        SlashCommand::Delete
            | SlashCommand::Pin
            | SlashCommand::Archive
            | SlashCommand::Rename
            | SlashCommand::System
            | SlashCommand::Sampling
            | SlashCommand::Edit
            | SlashCommand::Undo
    );
    let active = active_summary(store);
    if needs_active && active.is_none() {
        store.notify(NotificationLevel::Info, "No conversation is open.");
        return Control::Continue;
    }

    match (command, active) {
        (SlashCommand::New, _) => {
            orchestrator.start_fresh(store);
            ui.history.scroll_to_bottom();
            match parsed.argument() {
                Some(title) => orchestrator.create_conversation(store, title),
                None => store.notify(NotificationLevel::Info, "New conversation. Type a message to start."),
            }
        }
        (SlashCommand::Delete, Some(active)) => orchestrator.delete_conversation(&active.uuid),
        (SlashCommand::Pin, Some(active)) => orchestrator.set_pinned(&active.uuid, !active.is_pinned),
        (SlashCommand::Archive, Some(active)) => orchestrator.set_archived(&active.uuid, !active.is_archived),
        (SlashCommand::Rename, Some(active)) => match parsed.argument() {
            Some(title) => orchestrator.rename(&active.uuid, title),
            None => store.notify(NotificationLevel::Info, "Usage: /rename <title>"),
        },
        (SlashCommand::Search, _) => {
            orchestrator.search(store, parsed.argument().unwrap_or_default());
        }
        (SlashCommand::Model, active) => {
            if let Some(name) = select_model(store, parsed.argument()) {
                if let Some(active) = active {
                    orchestrator.update_conversation(&active.uuid, ConversationUpdate::model(name));
                }
            }
        }
        (SlashCommand::System, Some(active)) => {
            let prompt = resolve_system_prompt(store, parsed.argument());
            orchestrator.update_conversation(&active.uuid, ConversationUpdate::system_prompt(prompt));
        }
        (SlashCommand::Sampling, Some(active)) => {
            orchestrator.update_conversation(&active.uuid, ConversationUpdate::sampling(store.settings()));
        }
        (SlashCommand::Edit, Some(active)) => edit_last_message(store, orchestrator, &active.uuid, parsed.argument()),
        (SlashCommand::Undo, Some(active)) => delete_last_message(store, orchestrator, &active.uuid),
        (SlashCommand::Stream, _) => {
            store.update_settings(|settings| settings.stream_responses = !settings.stream_responses);
            let mode = if store.settings().stream_responses { "on" } else { "off" };
            store.notify(NotificationLevel::Info, format!("Streaming {mode}"));
        }
        (SlashCommand::Stop, _) => {
            if !orchestrator.stop(store) {
                store.notify(NotificationLevel::Info, "Nothing to stop.");
            }
        }
        (SlashCommand::Chat, _) => return switch_view(View::Chat, store, orchestrator),
        (SlashCommand::Dashboard, _) => return switch_view(View::Dashboard, store, orchestrator),
        (SlashCommand::Settings, _) => return switch_view(View::Settings, store, orchestrator),
        (SlashCommand::Help, _) => ui.show_help = true,
        (SlashCommand::Quit, _) => return Control::Quit,
        (
            SlashCommand::Delete
            | SlashCommand::Pin
            | SlashCommand::Archive
            | SlashCommand::Rename
            | SlashCommand::System
            | SlashCommand::Sampling
            | SlashCommand::Edit
            | SlashCommand::Undo,
            None,
        ) => {}
    }

    Control::Continue
}

/// Switch the default model; returns the name when the switch happened
fn select_model<'a>(store: &mut AppStore, name: Option<&'a str>) -> Option<&'a str> {
    let known: Vec<String> = store.models().iter().map(|m| m.name.clone()).collect();
    let Some(name) = name else {
        let listing = if known.is_empty() { "none reported".to_string() } else { known.join(", ") };
        store.notify(NotificationLevel::Info, format!("Models: {listing}"));
        return None;
    };

    if !known.is_empty() && !known.iter().any(|m| m == name) {
        store.notify(NotificationLevel::Error, format!("Unknown model '{name}'"));
        return None;
    }
    store.update_settings(|settings| settings.default_model = name.to_string());
    store.notify(NotificationLevel::Success, format!("Model set to {name}"));
    Some(name)
}

/// A saved prompt's content when `argument` names one, otherwise the text itself
fn resolve_system_prompt(store: &AppStore, argument: Option<&str>) -> String {
    let Some(argument) = argument else {
        return String::new();
    };
    store
        .prompts()
        .iter()
        .find(|prompt| prompt.name.eq_ignore_ascii_case(argument))
        .map(|prompt| prompt.content.clone())
        .unwrap_or_else(|| argument.to_string())
}

fn edit_last_message<B: ChatBackend>(
    store: &mut AppStore,
    orchestrator: &Orchestrator<B>,
    conversation_id: &str,
    text: Option<&str>,
) {
    let Some(text) = text else {
        store.notify(NotificationLevel::Info, "Usage: /edit <new text>");
        return;
    };
    let last_sent = store
        .active_conversation()
        .and_then(|c| c.messages.iter().rev().find(|m| m.role == Role::User))
        .map(|m| m.uuid.clone());
    match last_sent {
        Some(uuid) => orchestrator.edit_message(conversation_id, &uuid, text),
        None => store.notify(NotificationLevel::Info, "No message of yours to edit."),
    }
}

fn delete_last_message<B: ChatBackend>(store: &mut AppStore, orchestrator: &Orchestrator<B>, conversation_id: &str) {
    let last = store
        .active_conversation()
        .and_then(|c| c.messages.last())
        .map(|m| m.uuid.clone());
    match last {
        Some(uuid) => orchestrator.delete_message(conversation_id, &uuid),
        None => store.notify(NotificationLevel::Info, "No message to delete."),
    }
}
