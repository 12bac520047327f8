use crate::api::{Conversation, DashboardStats, ModelInfo, SystemPrompt};
use crate::error::ApiError;

/// Messages sent from background tasks back to the UI loop.
///
/// Every state change caused by network work is delivered as one of these and
/// applied by the loop that owns the store.
#[derive(Debug)]
pub enum AppEvent {
    /// A streamed text increment for the generation tagged `generation`
    Chunk { generation: u64, text: String },

    /// The generation finished; `Ok` carries the conversation id the backend used
    GenerationFinished {
        generation: u64,
        result: Result<String, ApiError>,
    },

    /// Conversation index refreshed
    ConversationsLoaded(Vec<Conversation>),

    /// Title search results
    SearchResults { query: String, results: Vec<Conversation> },

    /// Full conversation with messages
    ConversationLoaded(Conversation),

    /// A conversation was created; it becomes active unless a reply is in flight
    ConversationCreated(Conversation),

    /// A conversation was removed on the backend
    ConversationDeleted(String),

    /// A conversation's metadata changed (pin, archive, title, prompt, model, sampling)
    ConversationUpdated(Conversation),

    /// A message in `conversation_id` was edited or deleted
    MessageChanged {
        conversation_id: String,
        notice: &'static str,
    },

    StatsLoaded(DashboardStats),

    ModelsLoaded(Vec<ModelInfo>),

    PromptsLoaded(Vec<SystemPrompt>),

    /// A background request failed; `quiet` failures are only logged
    RequestFailed {
        action: &'static str,
        error: ApiError,
        quiet: bool,
    },
}

/// TUI-specific events (keyboard, mouse, etc.)
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Paste event
    Paste(String),

    /// Terminal resize
    Resize(u16, u16),
}

/// Top-level views of the TUI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Chat,
    Dashboard,
    Settings,
}

impl View {
    pub fn display_name(&self) -> &'static str {
        match self {
            View::Chat => "Chat",
            View::Dashboard => "Dashboard",
            View::Settings => "Settings",
        }
    }
}

/// Severity of a status-bar notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}
