use anyhow::{Context, Result};
use std::io::{self, Write};

use crate::api::{ApiClient, ChatBackend, ChatRequest, Conversation, NewSystemPrompt, Role, SystemPromptUpdate};
use crate::config::Config;

fn client(config: &Config) -> Result<ApiClient> {
    ApiClient::new(config).context("Failed to build HTTP client")
}

fn print_conversation_line(conversation: &Conversation) {
    let pin = if conversation.is_pinned { "📌" } else { "💬" };
    let archived = if conversation.is_archived { " (archived)" } else { "" };
    println!("{} {}{}", pin, conversation.title, archived);
    println!("   🆔 {}", conversation.uuid);
    println!(
        "   🧠 {} · {} messages · {} tokens · updated {}",
        conversation.model,
        conversation.message_count,
        conversation.total_tokens,
        conversation.updated_at.format("%Y-%m-%d %H:%M"),
    );
}

pub async fn list_conversations(config: &Config, include_archived: bool) -> Result<()> {
    let mut conversations = client(config)?
        .list_conversations(include_archived)
        .await
        .context("Failed to list conversations")?;

    if conversations.is_empty() {
        println!("📭 No conversations yet. Run 'localai' to start chatting!");
        return Ok(());
    }

    conversations.sort_by(|a, b| b.is_pinned.cmp(&a.is_pinned).then_with(|| b.updated_at.cmp(&a.updated_at)));

    println!("📚 Conversations:");
    println!("{}", "=".repeat(50));
    for conversation in &conversations {
        print_conversation_line(conversation);
        println!();
    }

    Ok(())
}

pub async fn show_conversation(config: &Config, id: &str) -> Result<()> {
    let conversation = client(config)?
        .get_conversation(id)
        .await
        .with_context(|| format!("Failed to load conversation {id}"))?;

    print_conversation_line(&conversation);
    println!("{}", "=".repeat(50));

    for message in &conversation.messages {
        let icon = match message.role {
            Role::User => "👤",
            Role::Assistant => "🤖",
            Role::System => "⚙️",
        };
        let mut meta = message.created_at.format("%H:%M:%S").to_string();
        if message.tokens > 0 {
            meta.push_str(&format!(" · {} tokens", message.tokens));
        }
        if let Some(seconds) = message.generation_time {
            meta.push_str(&format!(" · {seconds:.1}s"));
        }
        if message.is_edited {
            meta.push_str(" · edited");
        }
        println!("{} {} [{}] {}", icon, message.role, meta, message.uuid);
        println!("{}", message.content);
        println!();
    }

    Ok(())
}

pub async fn send_message(
    config: &Config,
    message: &str,
    conversation_id: Option<String>,
    model: Option<String>,
    stream: bool,
) -> Result<()> {
    let message = message.trim();
    if message.is_empty() {
        println!("❌ Message is empty.");
        return Ok(());
    }

    let mut settings = config.settings.clone();
    if let Some(model) = model {
        settings.default_model = model;
    }
    let request = ChatRequest::new(conversation_id, message, &settings);
    let client = client(config)?;
    tracing::info!(stream, model = %request.model, "sending message from CLI");

    let conversation_id = if stream {
        let mut stdout = io::stdout();
        let mut on_chunk = |text: &str, is_final: bool| {
            if is_final {
                let _ = writeln!(stdout);
            } else {
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            }
        };
        client
            .complete_stream(&request, &mut on_chunk)
            .await
            .context("Streaming request failed")?
    } else {
        let response = client.complete(&request).await.context("Request failed")?;
        println!("{}", response.message.content);
        response.conversation_id
    };

    if !conversation_id.is_empty() {
        eprintln!("🆔 conversation: {conversation_id}");
    }
    Ok(())
}

pub async fn delete_conversation(config: &Config, id: &str) -> Result<()> {
    client(config)?
        .delete_conversation(id)
        .await
        .with_context(|| format!("Failed to delete conversation {id}"))?;
    println!("🗑️  Deleted conversation {id}");
    Ok(())
}

pub async fn list_models(config: &Config) -> Result<()> {
    let models = client(config)?.list_models().await.context("Failed to list models")?;
    if models.is_empty() {
        println!("📭 The backend reported no models.");
        return Ok(());
    }

    println!("🧠 Available models:");
    for model in models {
        let marker = if model.name == config.settings.default_model { " (default)" } else { "" };
        println!("  • {}{}", model.name, marker);
    }
    Ok(())
}

pub async fn list_prompts(config: &Config) -> Result<()> {
    let prompts = client(config)?.list_prompts().await.context("Failed to list prompts")?;
    if prompts.is_empty() {
        println!("📭 No system prompts defined.");
        return Ok(());
    }

    println!("📝 System prompts:");
    println!("{}", "=".repeat(50));
    for prompt in prompts {
        let marker = if prompt.is_default { " ⭐" } else { "" };
        println!("📋 {}{} (#{})", prompt.name, marker, prompt.id);
        if let Some(description) = &prompt.description {
            println!("   {description}");
        }
        println!();
    }
    Ok(())
}

pub async fn add_prompt(config: &Config, prompt: NewSystemPrompt) -> Result<()> {
    let created = client(config)?
        .create_prompt(&prompt)
        .await
        .context("Failed to create prompt")?;
    println!("✅ Created prompt '{}' (#{})", created.name, created.id);
    Ok(())
}

pub async fn edit_prompt(config: &Config, id: i64, update: SystemPromptUpdate) -> Result<()> {
    if update == SystemPromptUpdate::default() {
        anyhow::bail!("Nothing to change. Pass --name, --description, --content or --default.");
    }
    let updated = client(config)?
        .update_prompt(id, &update)
        .await
        .with_context(|| format!("Failed to update prompt #{id}"))?;
    println!("✅ Updated prompt '{}' (#{})", updated.name, updated.id);
    Ok(())
}

pub async fn delete_prompt(config: &Config, id: i64) -> Result<()> {
    client(config)?
        .delete_prompt(id)
        .await
        .with_context(|| format!("Failed to delete prompt #{id}"))?;
    println!("🗑️  Deleted prompt #{id}");
    Ok(())
}

pub async fn edit_message(config: &Config, uuid: &str, content: &str) -> Result<()> {
    client(config)?
        .update_message(uuid, content)
        .await
        .with_context(|| format!("Failed to edit message {uuid}"))?;
    println!("✅ Message {uuid} updated");
    Ok(())
}

pub async fn delete_message(config: &Config, uuid: &str) -> Result<()> {
    client(config)?
        .delete_message(uuid)
        .await
        .with_context(|| format!("Failed to delete message {uuid}"))?;
    println!("🗑️  Deleted message {uuid}");
    Ok(())
}

pub async fn show_stats(config: &Config) -> Result<()> {
    let stats = client(config)?
        .dashboard_stats()
        .await
        .context("Failed to load dashboard stats")?;

    println!("📊 Usage");
    println!("{}", "=".repeat(50));
    println!("💬 Conversations: {} (+{} today)", stats.total_conversations, stats.conversations_today);
    println!("✉️  Messages:      {} (+{} today)", stats.total_messages, stats.messages_today);
    println!("🔢 Tokens:        {} (+{} today)", stats.total_tokens, stats.tokens_today);
    println!("⏱️  Avg response:  {:.2}s", stats.avg_response_time);
    println!("🧠 Active model:  {}", stats.active_model);
    Ok(())
}

pub fn show_config(config: &Config) -> Result<()> {
    println!("⚙️  Config file: {}", config.config_path().display());
    println!("📄 Log file:    {}", config.log_path().display());
    println!();
    let rendered = toml::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{rendered}");
    Ok(())
}
