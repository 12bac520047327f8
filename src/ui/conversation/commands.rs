use std::str::FromStr;

use once_cell::sync::Lazy;
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Create a new conversation on the backend
    New,
    /// Delete the active conversation
    Delete,
    /// Pin or unpin the active conversation
    Pin,
    /// Archive the active conversation
    Archive,
    /// Rename the active conversation
    Rename,
    /// Search conversation titles
    Search,
    /// Switch the model for new replies and the active conversation
    Model,
    /// Set the active conversation's system prompt
    System,
    /// Apply the current sampling settings to the active conversation
    Sampling,
    /// Replace the last message you sent
    Edit,
    /// Delete the last message of the active conversation
    Undo,
    /// Toggle streaming responses
    Stream,
    /// Stop the reply being generated
    Stop,
    /// Show the chat view
    Chat,
    /// Show the analytics dashboard
    Dashboard,
    /// Show the settings panel
    Settings,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

static COMMAND_ENTRIES: Lazy<Vec<CommandEntry>> = Lazy::new(|| {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
});

pub fn command_entries() -> &'static [CommandEntry] {
    &COMMAND_ENTRIES
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "start a new conversation (optional title)",
            SlashCommand::Delete => "delete the active conversation",
            SlashCommand::Pin => "pin or unpin the active conversation",
            SlashCommand::Archive => "archive the active conversation",
            SlashCommand::Rename => "rename the active conversation",
            SlashCommand::Search => "search conversation titles (empty clears)",
            SlashCommand::Model => "switch the model (and the open conversation's)",
            SlashCommand::System => "set the system prompt by name or text (empty clears)",
            SlashCommand::Sampling => "apply the current sampling settings to the conversation",
            SlashCommand::Edit => "replace your last message",
            SlashCommand::Undo => "delete the last message of the conversation",
            SlashCommand::Stream => "toggle streaming responses",
            SlashCommand::Stop => "stop the reply being generated",
            SlashCommand::Chat => "show the chat view",
            SlashCommand::Dashboard => "show the analytics dashboard",
            SlashCommand::Settings => "show the settings panel",
            SlashCommand::Help => "show available commands",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can be run while a reply is being generated.
    pub fn available_during_generation(self) -> bool {
        !matches!(
            self,
            SlashCommand::New
                | SlashCommand::Delete
                | SlashCommand::Archive
                | SlashCommand::Edit
                | SlashCommand::Undo
        )
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let head = parts.next()?.to_lowercase();
    let argument = parts
        .next()
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(str::to_string);

    let command = SlashCommand::from_str(&head).ok().or_else(|| match head.as_str() {
        "q" | "exit" | "bye" => Some(SlashCommand::Quit),
        "n" => Some(SlashCommand::New),
        "rm" => Some(SlashCommand::Delete),
        "find" => Some(SlashCommand::Search),
        "models" => Some(SlashCommand::Model),
        "h" | "?" => Some(SlashCommand::Help),
        "stats" => Some(SlashCommand::Dashboard),
        "prompt" => Some(SlashCommand::System),
        _ => None,
    })?;

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for entry in command_entries() {
        help.push_str(&format!("/{} - {}\n", entry.keyword, entry.description));
    }

    help.push_str("\nAliases: /q for /quit, /n for /new, /rm for /delete, /find for /search, /stats for /dashboard, /prompt for /system");
    help.push_str("\nKeys: Enter send, Shift+Enter newline, Esc stop, Tab switch pane, F1-F3 views, Ctrl+C quit");

    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_argument() {
        let parsed = parse_slash_command("/rename   Trip planning  ").unwrap();
        assert_eq!(parsed.command, SlashCommand::Rename);
        assert_eq!(parsed.argument(), Some("Trip planning"));
    }

    #[test]
    fn parses_aliases_and_case() {
        assert_eq!(parse_slash_command("/Q").unwrap().command, SlashCommand::Quit);
        assert_eq!(parse_slash_command("/models").unwrap().command, SlashCommand::Model);
        assert_eq!(parse_slash_command("/stats").unwrap().command, SlashCommand::Dashboard);
        assert_eq!(parse_slash_command("/prompt Coder").unwrap().command, SlashCommand::System);
    }

    #[test]
    fn message_commands_wait_for_the_reply() {
        assert!(!SlashCommand::Edit.available_during_generation());
        assert!(!SlashCommand::Undo.available_during_generation());
        assert!(SlashCommand::System.available_during_generation());

        let parsed = parse_slash_command("/edit  what about Rust?").unwrap();
        assert_eq!(parsed.command, SlashCommand::Edit);
        assert_eq!(parsed.argument(), Some("what about Rust?"));
        assert!(parse_slash_command("/undo").unwrap().argument().is_none());
    }

    #[test]
    fn rejects_plain_text_and_unknown_commands() {
        assert!(parse_slash_command("hello /new").is_none());
        assert!(parse_slash_command("/frobnicate").is_none());
        assert!(parse_slash_command("/").is_none());
    }

    #[test]
    fn help_lists_every_command() {
        let help = get_help_text();
        for entry in command_entries() {
            assert!(help.contains(&format!("/{}", entry.keyword)));
        }
    }
}
