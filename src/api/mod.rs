//! HTTP access to the LocalAI backend

pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::ApiError;
use crate::streaming::StreamConsumer;
pub use types::{
    ChatRequest, ChatResponse, Conversation, ConversationUpdate, DashboardStats, Message, MessageUpdate,
    ModelInfo, NewConversation, NewSystemPrompt, Role, SystemPrompt, SystemPromptUpdate,
};
use types::{ConversationList, ModelList, PromptList};

/// The backend's HTTP contract, as consumed by the client
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn list_conversations(&self, include_archived: bool) -> Result<Vec<Conversation>, ApiError>;

    async fn search_conversations(&self, query: &str) -> Result<Vec<Conversation>, ApiError>;

    async fn get_conversation(&self, id: &str) -> Result<Conversation, ApiError>;

    async fn create_conversation(&self, body: &NewConversation) -> Result<Conversation, ApiError>;

    async fn update_conversation(&self, id: &str, update: &ConversationUpdate) -> Result<Conversation, ApiError>;

    async fn set_pinned(&self, id: &str, pinned: bool) -> Result<Conversation, ApiError>;

    async fn set_archived(&self, id: &str, archived: bool) -> Result<Conversation, ApiError>;

    async fn delete_conversation(&self, id: &str) -> Result<(), ApiError>;

    /// Replace a message's content; the backend marks it edited
    async fn update_message(&self, uuid: &str, content: &str) -> Result<Message, ApiError>;

    async fn delete_message(&self, uuid: &str) -> Result<(), ApiError>;

    /// Blocking completion; the reply arrives as one response
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError>;

    /// Streaming completion. `on_chunk(text, false)` fires per increment and
    /// `on_chunk("", true)` once at the end; returns the conversation id.
    async fn complete_stream(
        &self,
        request: &ChatRequest,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str, bool) + Send),
    ) -> Result<String, ApiError>;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ApiError>;

    async fn list_prompts(&self) -> Result<Vec<SystemPrompt>, ApiError>;

    async fn create_prompt(&self, prompt: &NewSystemPrompt) -> Result<SystemPrompt, ApiError>;

    async fn update_prompt(&self, id: i64, update: &SystemPromptUpdate) -> Result<SystemPrompt, ApiError>;

    async fn delete_prompt(&self, id: i64) -> Result<(), ApiError>;

    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError>;
}

/// reqwest-backed client for the LocalAI REST/SSE API
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
            request_timeout: config.request_timeout(),
            idle_timeout: config.stream_idle_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success status into [`ApiError::Status`]
    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%status, "backend request failed: {body}");
        Err(ApiError::Status { status, body })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.timeout(self.request_timeout).send().await?;
        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send a request whose success carries no body (204)
    async fn execute(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let response = request.timeout(self.request_timeout).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn list_conversations(&self, include_archived: bool) -> Result<Vec<Conversation>, ApiError> {
        tracing::debug!(include_archived, "listing conversations");
        let mut request = self.client.get(self.url("/conversations/"));
        if include_archived {
            request = request.query(&[("include_archived", "true")]);
        }
        let list: ConversationList = self.fetch(request).await?;
        Ok(list.into())
    }

    async fn search_conversations(&self, query: &str) -> Result<Vec<Conversation>, ApiError> {
        let request = self.client.get(self.url("/conversations/search")).query(&[("q", query)]);
        self.fetch(request).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation, ApiError> {
        tracing::debug!(conversation = id, "fetching conversation");
        self.fetch(self.client.get(self.url(&format!("/conversations/{id}")))).await
    }

    async fn create_conversation(&self, body: &NewConversation) -> Result<Conversation, ApiError> {
        let conversation: Conversation = self
            .fetch(self.client.post(self.url("/conversations/")).json(body))
            .await?;
        tracing::info!(conversation = %conversation.uuid, model = %conversation.model, "created conversation");
        Ok(conversation)
    }

    async fn update_conversation(&self, id: &str, update: &ConversationUpdate) -> Result<Conversation, ApiError> {
        self.fetch(self.client.patch(self.url(&format!("/conversations/{id}"))).json(update))
            .await
    }

    async fn set_pinned(&self, id: &str, pinned: bool) -> Result<Conversation, ApiError> {
        let action = if pinned { "pin" } else { "unpin" };
        self.fetch(self.client.post(self.url(&format!("/conversations/{id}/{action}"))))
            .await
    }

    async fn set_archived(&self, id: &str, archived: bool) -> Result<Conversation, ApiError> {
        let action = if archived { "archive" } else { "unarchive" };
        self.fetch(self.client.post(self.url(&format!("/conversations/{id}/{action}"))))
            .await
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        self.execute(self.client.delete(self.url(&format!("/conversations/{id}"))))
            .await?;
        tracing::info!(conversation = id, "deleted conversation");
        Ok(())
    }

    async fn update_message(&self, uuid: &str, content: &str) -> Result<Message, ApiError> {
        let body = MessageUpdate {
            content: content.to_string(),
        };
        let message: Message = self
            .fetch(self.client.patch(self.url(&format!("/conversations/messages/{uuid}"))).json(&body))
            .await?;
        tracing::info!(message = uuid, "edited message");
        Ok(message)
    }

    async fn delete_message(&self, uuid: &str) -> Result<(), ApiError> {
        self.execute(self.client.delete(self.url(&format!("/conversations/messages/{uuid}"))))
            .await?;
        tracing::info!(message = uuid, "deleted message");
        Ok(())
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        tracing::debug!(model = %request.model, "requesting completion");
        self.fetch(self.client.post(self.url("/chat/completions")).json(request))
            .await
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str, bool) + Send),
    ) -> Result<String, ApiError> {
        tracing::debug!(model = %request.model, "opening completion stream");
        let response = self
            .client
            .post(self.url("/chat/completions/stream"))
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let conversation_id = StreamConsumer::new()
            .with_idle_timeout(self.idle_timeout)
            .consume(Box::pin(response.bytes_stream()), on_chunk)
            .await?;
        tracing::debug!(conversation = %conversation_id, "completion stream closed");
        Ok(conversation_id)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ApiError> {
        let list: ModelList = self.fetch(self.client.get(self.url("/models/"))).await?;
        Ok(list.into())
    }

    async fn list_prompts(&self) -> Result<Vec<SystemPrompt>, ApiError> {
        let list: PromptList = self.fetch(self.client.get(self.url("/prompts/"))).await?;
        Ok(list.into())
    }

    async fn create_prompt(&self, prompt: &NewSystemPrompt) -> Result<SystemPrompt, ApiError> {
        let created: SystemPrompt = self
            .fetch(self.client.post(self.url("/prompts/")).json(prompt))
            .await?;
        tracing::info!(prompt = created.id, name = %created.name, "created system prompt");
        Ok(created)
    }

    async fn update_prompt(&self, id: i64, update: &SystemPromptUpdate) -> Result<SystemPrompt, ApiError> {
        self.fetch(self.client.patch(self.url(&format!("/prompts/{id}"))).json(update))
            .await
    }

    async fn delete_prompt(&self, id: i64) -> Result<(), ApiError> {
        self.execute(self.client.delete(self.url(&format!("/prompts/{id}"))))
            .await?;
        tracing::info!(prompt = id, "deleted system prompt");
        Ok(())
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.fetch(self.client.get(self.url("/conversations/stats"))).await
    }
}
