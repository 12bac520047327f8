use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use localai_chat::api::{NewSystemPrompt, SystemPromptUpdate};
use localai_chat::config::{Config, API_URL_ENV};
use localai_chat::{app, commands};

/// Environment variable holding the tracing filter
const LOG_ENV: &str = "LOCALAI_LOG";

#[derive(Parser)]
#[command(name = "localai")]
#[command(version)]
#[command(about = "Terminal chat client for a local LLM backend", long_about = None)]
struct Cli {
    /// Backend base URL, e.g. http://localhost:8000/api
    #[arg(long, global = true, env = API_URL_ENV)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List conversations
    List {
        /// Include archived conversations
        #[arg(long)]
        archived: bool,
    },
    /// Print a conversation with its messages
    Show { id: String },
    /// Send a message and print the reply
    Send {
        message: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Model to use instead of the configured default
        #[arg(long)]
        model: Option<String>,
        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Delete a conversation
    Delete { id: String },
    /// List models installed on the backend
    Models,
    /// List or manage system prompts
    Prompts {
        #[command(subcommand)]
        action: Option<PromptAction>,
    },
    /// Replace the content of a message
    EditMessage { uuid: String, content: String },
    /// Delete a message
    DeleteMessage { uuid: String },
    /// Print dashboard statistics
    Stats,
    /// Print the config file location and effective settings
    Config,
}

#[derive(Subcommand)]
enum PromptAction {
    /// Save a new system prompt
    Add {
        name: String,
        content: String,
        #[arg(long)]
        description: Option<String>,
        /// Make this the default prompt
        #[arg(long)]
        default: bool,
    },
    /// Change fields of a saved prompt
    Edit {
        id: i64,
        #[command(flatten)]
        fields: PromptFields,
    },
    /// Delete a saved prompt
    Delete { id: i64 },
}

#[derive(Args)]
struct PromptFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    content: Option<String>,
    #[arg(long)]
    default: Option<bool>,
}

impl From<PromptFields> for SystemPromptUpdate {
    fn from(fields: PromptFields) -> Self {
        Self {
            name: fields.name,
            description: fields.description,
            content: fields.content,
            is_default: fields.default,
        }
    }
}

/// TUI mode logs to a file so the alternate screen stays clean
fn init_tracing(config: &Config, tui: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    if tui {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.log_path())
            .with_context(|| format!("Failed to open log file {}", config.log_path().display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    init_tracing(&config, cli.command.is_none())?;
    tracing::debug!(base_url = %config.api_base_url, "configuration loaded");

    match cli.command {
        None => app::run(config).await,
        Some(Commands::List { archived }) => commands::list_conversations(&config, archived).await,
        Some(Commands::Show { id }) => commands::show_conversation(&config, &id).await,
        Some(Commands::Send {
            message,
            conversation,
            model,
            no_stream,
        }) => {
            let stream = config.settings.stream_responses && !no_stream;
            commands::send_message(&config, &message, conversation, model, stream).await
        }
        Some(Commands::Delete { id }) => commands::delete_conversation(&config, &id).await,
        Some(Commands::Models) => commands::list_models(&config).await,
        Some(Commands::Prompts { action: None }) => commands::list_prompts(&config).await,
        Some(Commands::Prompts {
            action: Some(PromptAction::Add {
                name,
                content,
                description,
                default,
            }),
        }) => {
            let prompt = NewSystemPrompt {
                name,
                description,
                content,
                is_default: default,
            };
            commands::add_prompt(&config, prompt).await
        }
        Some(Commands::Prompts {
            action: Some(PromptAction::Edit { id, fields }),
        }) => commands::edit_prompt(&config, id, fields.into()).await,
        Some(Commands::Prompts {
            action: Some(PromptAction::Delete { id }),
        }) => commands::delete_prompt(&config, id).await,
        Some(Commands::EditMessage { uuid, content }) => commands::edit_message(&config, &uuid, &content).await,
        Some(Commands::DeleteMessage { uuid }) => commands::delete_message(&config, &uuid).await,
        Some(Commands::Stats) => commands::show_stats(&config).await,
        Some(Commands::Config) => commands::show_config(&config),
    }
}
