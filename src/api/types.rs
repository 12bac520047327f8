//! Wire types for the LocalAI backend.
//!
//! Shapes that vary on the wire (bare arrays vs wrapped lists, model entries
//! as strings or objects, timestamps with or without an offset) are
//! normalized here, right after deserialization.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: i64,
    pub uuid: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub tokens: u32,
    #[serde(default)]
    pub generation_time: Option<f64>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(deserialize_with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `PATCH /conversations/messages/{uuid}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageUpdate {
    pub content: String,
}

/// A conversation; `messages` is only populated by the single-conversation endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Conversation {
    pub uuid: String,
    pub title: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub message_count: u32,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(deserialize_with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// `GET /conversations/` answers either a wrapped or a bare list
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum ConversationList {
    Wrapped { conversations: Vec<Conversation> },
    Bare(Vec<Conversation>),
}

impl From<ConversationList> for Vec<Conversation> {
    fn from(list: ConversationList) -> Self {
        match list {
            ConversationList::Wrapped { conversations } => conversations,
            ConversationList::Bare(conversations) => conversations,
        }
    }
}

/// Body of `POST /conversations/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewConversation {
    pub title: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
}

impl NewConversation {
    pub fn from_settings(title: impl Into<String>, settings: &Settings) -> Self {
        Self {
            title: title.into(),
            model: settings.default_model.clone(),
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Body of `PATCH /conversations/{id}`; only the fields that are set are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ConversationUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// An empty prompt clears the conversation's system prompt
    pub fn system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Copy the sampling parameters from the current settings
    pub fn sampling(settings: &Settings) -> Self {
        Self {
            temperature: Some(settings.temperature),
            top_p: Some(settings.top_p),
            top_k: Some(settings.top_k),
            max_tokens: Some(settings.max_tokens),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Body of both chat completion endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub message: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(conversation_id: Option<String>, message: impl Into<String>, settings: &Settings) -> Self {
        Self {
            conversation_id,
            message: message.into(),
            model: settings.default_model.clone(),
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Response of `POST /chat/completions`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub message: Message,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens: Option<u32>,
    #[serde(default)]
    pub generation_time: Option<f64>,
}

/// One `data: ` payload of the streaming endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamPayload {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A model available on the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelEntry {
    Name(String),
    Described { name: String },
}

#[derive(Deserialize)]
pub(crate) struct ModelList {
    models: Vec<ModelEntry>,
}

impl From<ModelList> for Vec<ModelInfo> {
    fn from(list: ModelList) -> Self {
        list.models
            .into_iter()
            .map(|entry| match entry {
                ModelEntry::Name(name) | ModelEntry::Described { name } => ModelInfo { name },
            })
            .collect()
    }
}

/// A reusable system prompt
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SystemPrompt {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub content: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Body of `POST /prompts/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSystemPrompt {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: String,
    pub is_default: bool,
}

/// Body of `PATCH /prompts/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemPromptUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum PromptList {
    Wrapped { prompts: Vec<SystemPrompt> },
    Bare(Vec<SystemPrompt>),
}

impl From<PromptList> for Vec<SystemPrompt> {
    fn from(list: PromptList) -> Self {
        match list {
            PromptList::Wrapped { prompts } => prompts,
            PromptList::Bare(prompts) => prompts,
        }
    }
}

/// Aggregate counters shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    pub total_conversations: u64,
    pub total_messages: u64,
    pub total_tokens: u64,
    pub active_model: String,
    pub avg_response_time: f64,
    pub conversations_today: u64,
    pub messages_today: u64,
    pub tokens_today: u64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts RFC 3339 timestamps and offset-less ISO timestamps (taken as UTC)
fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        None => Ok(None),
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}
