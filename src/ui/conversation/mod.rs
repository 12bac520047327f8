//! Conversation UI components for the chat view

pub mod commands;
pub mod composer;
pub mod history;
pub mod sidebar;
pub mod streaming;

pub use commands::{get_help_text, parse_slash_command, ParsedCommand, SlashCommand};
pub use composer::{ConversationComposer, ConversationResult};
pub use history::{ConversationHistory, HistoryView};
pub use sidebar::ConversationSidebar;
pub use streaming::GeneratingIndicator;
