//! Coordinates sending messages and keeping the store in sync with the backend.
//!
//! Network calls run in spawned tasks and report back through [`AppEvent`]s;
//! [`Orchestrator::apply`] is the only place their results touch the store.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{ChatBackend, ChatRequest, Conversation, ConversationUpdate, NewConversation};
use crate::error::ApiError;
use crate::events::{AppEvent, NotificationLevel};
use crate::store::AppStore;

/// Result of a send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The request was issued
    Started,
    /// Nothing to send after trimming
    Empty,
    /// A generation is already in flight
    Busy,
}

pub struct Orchestrator<B: ChatBackend> {
    backend: Arc<B>,
    events: mpsc::UnboundedSender<AppEvent>,
    /// Tag of the current generation; events carrying an older tag are stale
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl<B: ChatBackend> Orchestrator<B> {
    pub fn new(backend: Arc<B>, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            backend,
            events,
            generation: 0,
            in_flight: None,
        }
    }

    /// Send `text` to the active conversation (or a new one if none is active).
    ///
    /// Rejected without any request when the trimmed text is empty or a
    /// generation is already running.
    pub fn send_message(&mut self, store: &mut AppStore, text: &str) -> SendOutcome {
        let message = text.trim();
        if message.is_empty() {
            return SendOutcome::Empty;
        }
        if store.streaming().is_generating() {
            tracing::debug!("send rejected: generation in progress");
            return SendOutcome::Busy;
        }

        store.begin_generation();
        self.generation += 1;
        let generation = self.generation;

        let request = ChatRequest::new(store.active_id().map(str::to_string), message, store.settings());
        let stream = store.settings().stream_responses;
        tracing::info!(
            generation,
            stream,
            conversation = ?request.conversation_id,
            model = %request.model,
            "sending message"
        );

        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = if stream {
                let chunk_events = events.clone();
                let mut on_chunk = move |text: &str, is_final: bool| {
                    if !is_final {
                        let _ = chunk_events.send(AppEvent::Chunk {
                            generation,
                            text: text.to_string(),
                        });
                    }
                };
                backend.complete_stream(&request, &mut on_chunk).await
            } else {
                backend
                    .complete(&request)
                    .await
                    .map(|response| response.conversation_id)
            };
            let _ = events.send(AppEvent::GenerationFinished { generation, result });
        }));

        SendOutcome::Started
    }

    /// Abort the in-flight generation. Returns false if nothing was running.
    pub fn stop(&mut self, store: &mut AppStore) -> bool {
        if !store.streaming().is_generating() {
            return false;
        }
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        tracing::info!(generation = self.generation, "generation stopped by user");
        self.generation += 1;
        self.finish_generation(store, Err(ApiError::Cancelled));
        true
    }

    /// Apply one background result to the store
    pub fn apply(&mut self, store: &mut AppStore, event: AppEvent) {
        match event {
            AppEvent::Chunk { generation, text } => {
                if generation == self.generation {
                    store.append_chunk(&text);
                }
            }
            AppEvent::GenerationFinished { generation, result } => {
                if generation != self.generation || !store.streaming().is_generating() {
                    tracing::debug!(generation, "discarding stale generation result");
                    return;
                }
                self.in_flight = None;
                self.finish_generation(store, result);
            }
            AppEvent::ConversationsLoaded(conversations) => store.set_conversations(conversations),
            AppEvent::SearchResults { query, results } => {
                store.notify(
                    NotificationLevel::Info,
                    format!("{} result(s) for \"{query}\"", results.len()),
                );
                store.set_search_results(query, results);
            }
            AppEvent::ConversationLoaded(conversation) => store.set_active_conversation(conversation),
            AppEvent::ConversationCreated(conversation) => {
                if store.streaming().is_generating() {
                    // The reply in flight still belongs to the conversation it was sent to.
                    tracing::debug!(conversation = %conversation.uuid, "created during generation, not selecting");
                    store.insert_conversation(conversation);
                    store.notify(NotificationLevel::Info, "Conversation created. Open it from the sidebar.");
                } else {
                    store.select_conversation(Some(conversation.uuid.clone()));
                    store.set_active_conversation(conversation);
                }
                self.refresh_index();
            }
            AppEvent::ConversationDeleted(id) => {
                store.remove_conversation(&id);
                store.notify(NotificationLevel::Success, "Conversation deleted");
                self.refresh_index();
            }
            AppEvent::ConversationUpdated(conversation) => {
                if let Some(notice) = store
                    .find_conversation(&conversation.uuid)
                    .and_then(|previous| change_notice(previous, &conversation))
                {
                    store.notify(NotificationLevel::Success, notice);
                }
                store.update_conversation(conversation);
                self.refresh_index();
            }
            AppEvent::MessageChanged { conversation_id, notice } => {
                store.notify(NotificationLevel::Success, notice);
                if store.active_id() == Some(conversation_id.as_str()) {
                    self.refresh_conversation(&conversation_id);
                }
                self.refresh_index();
            }
            AppEvent::StatsLoaded(stats) => store.set_stats(stats),
            AppEvent::ModelsLoaded(models) => store.set_models(models),
            AppEvent::PromptsLoaded(prompts) => store.set_prompts(prompts),
            AppEvent::RequestFailed { action, error, quiet } => {
                if quiet {
                    tracing::warn!("{action} failed: {error}");
                } else {
                    tracing::error!("{action} failed: {error}");
                    store.notify(NotificationLevel::Error, format!("Could not {action}. {}", error.user_message()));
                }
            }
        }
    }

    fn finish_generation(&mut self, store: &mut AppStore, result: Result<String, ApiError>) {
        store.end_generation();
        match result {
            Ok(conversation_id) => {
                if store.adopt_conversation_id(&conversation_id) {
                    tracing::info!(conversation = %conversation_id, "adopted new conversation");
                }
            }
            Err(ApiError::Cancelled) => store.notify(NotificationLevel::Info, "Generation stopped."),
            Err(error) => {
                tracing::error!("generation failed: {error}");
                store.notify(NotificationLevel::Error, error.user_message());
            }
        }

        // The backend owns the final message, token count, and timing.
        self.refresh_index();
        if let Some(id) = store.active_id() {
            self.refresh_conversation(id);
        }
    }

    fn spawn_request<T, Fut, F>(&self, action: &'static str, quiet: bool, request: Fut, on_ok: F)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        F: FnOnce(T) -> AppEvent + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match request.await {
                Ok(value) => on_ok(value),
                Err(error) => AppEvent::RequestFailed { action, error, quiet },
            };
            let _ = events.send(event);
        });
    }

    pub fn refresh_index(&self) {
        let backend = Arc::clone(&self.backend);
        self.spawn_request(
            "load conversations",
            false,
            async move { backend.list_conversations(false).await },
            AppEvent::ConversationsLoaded,
        );
    }

    pub fn refresh_conversation(&self, id: &str) {
        let backend = Arc::clone(&self.backend);
        let id = id.to_string();
        self.spawn_request(
            "load conversation",
            false,
            async move { backend.get_conversation(&id).await },
            AppEvent::ConversationLoaded,
        );
    }

    pub fn refresh_stats(&self, quiet: bool) {
        let backend = Arc::clone(&self.backend);
        self.spawn_request(
            "load dashboard stats",
            quiet,
            async move { backend.dashboard_stats().await },
            AppEvent::StatsLoaded,
        );
    }

    pub fn refresh_models(&self) {
        let backend = Arc::clone(&self.backend);
        self.spawn_request(
            "load models",
            false,
            async move { backend.list_models().await },
            AppEvent::ModelsLoaded,
        );
    }

    pub fn refresh_prompts(&self) {
        let backend = Arc::clone(&self.backend);
        self.spawn_request(
            "load system prompts",
            true,
            async move { backend.list_prompts().await },
            AppEvent::PromptsLoaded,
        );
    }

    /// Periodic refresh of the index and dashboard; failures are only logged
    pub fn poll(&self) {
        let backend = Arc::clone(&self.backend);
        self.spawn_request(
            "poll conversations",
            true,
            async move { backend.list_conversations(false).await },
            AppEvent::ConversationsLoaded,
        );
        self.refresh_stats(true);
    }

    /// Make `id` the active conversation and fetch its messages
    pub fn open_conversation(&mut self, store: &mut AppStore, id: &str) -> bool {
        if store.streaming().is_generating() {
            store.notify(NotificationLevel::Info, "Wait for the reply to finish or press Esc to stop it.");
            return false;
        }
        store.select_conversation(Some(id.to_string()));
        self.refresh_conversation(id);
        true
    }

    /// Leave the active conversation; the next message starts a new one
    pub fn start_fresh(&mut self, store: &mut AppStore) -> bool {
        if store.streaming().is_generating() {
            return false;
        }
        store.select_conversation(None);
        true
    }

    pub fn create_conversation(&self, store: &AppStore, title: &str) {
        let backend = Arc::clone(&self.backend);
        let body = NewConversation::from_settings(title, store.settings());
        self.spawn_request(
            "create conversation",
            false,
            async move { backend.create_conversation(&body).await },
            AppEvent::ConversationCreated,
        );
    }

    pub fn delete_conversation(&self, id: &str) {
        let backend = Arc::clone(&self.backend);
        let id = id.to_string();
        self.spawn_request(
            "delete conversation",
            false,
            async move {
                backend.delete_conversation(&id).await?;
                Ok::<_, ApiError>(id)
            },
            AppEvent::ConversationDeleted,
        );
    }

    pub fn set_pinned(&self, id: &str, pinned: bool) {
        let backend = Arc::clone(&self.backend);
        let id = id.to_string();
        self.spawn_request(
            "update conversation",
            false,
            async move { backend.set_pinned(&id, pinned).await },
            AppEvent::ConversationUpdated,
        );
    }

    pub fn set_archived(&self, id: &str, archived: bool) {
        let backend = Arc::clone(&self.backend);
        let id = id.to_string();
        self.spawn_request(
            "update conversation",
            false,
            async move { backend.set_archived(&id, archived).await },
            AppEvent::ConversationUpdated,
        );
    }

    pub fn rename(&self, id: &str, title: &str) {
        self.update_conversation(id, ConversationUpdate::title(title));
    }

    /// PATCH any subset of a conversation's settings
    pub fn update_conversation(&self, id: &str, update: ConversationUpdate) {
        if update.is_empty() {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let id = id.to_string();
        self.spawn_request(
            "update conversation",
            false,
            async move { backend.update_conversation(&id, &update).await },
            AppEvent::ConversationUpdated,
        );
    }

    /// Replace the content of a message in `conversation_id`
    pub fn edit_message(&self, conversation_id: &str, message_uuid: &str, content: &str) {
        let backend = Arc::clone(&self.backend);
        let conversation_id = conversation_id.to_string();
        let message_uuid = message_uuid.to_string();
        let content = content.to_string();
        self.spawn_request(
            "edit message",
            false,
            async move { backend.update_message(&message_uuid, &content).await },
            move |_| AppEvent::MessageChanged {
                conversation_id,
                notice: "Message updated",
            },
        );
    }

    pub fn delete_message(&self, conversation_id: &str, message_uuid: &str) {
        let backend = Arc::clone(&self.backend);
        let conversation_id = conversation_id.to_string();
        let message_uuid = message_uuid.to_string();
        self.spawn_request(
            "delete message",
            false,
            async move { backend.delete_message(&message_uuid).await },
            move |()| AppEvent::MessageChanged {
                conversation_id,
                notice: "Message deleted",
            },
        );
    }

    /// Search titles; an empty query clears the current search
    pub fn search(&self, store: &mut AppStore, query: &str) {
        let query = query.trim().to_string();
        if query.is_empty() {
            store.clear_search();
            return;
        }
        let backend = Arc::clone(&self.backend);
        let q = query.clone();
        self.spawn_request(
            "search conversations",
            false,
            async move { backend.search_conversations(&q).await },
            move |results| AppEvent::SearchResults { query, results },
        );
    }
}

/// Status message for a metadata change the backend confirmed
fn change_notice(previous: &Conversation, updated: &Conversation) -> Option<String> {
    if previous.is_archived != updated.is_archived {
        let text = if updated.is_archived { "Conversation archived" } else { "Conversation restored" };
        return Some(text.to_string());
    }
    if previous.title != updated.title {
        return Some(format!("Renamed to \"{}\"", updated.title));
    }
    if previous.system_prompt != updated.system_prompt {
        let cleared = updated.system_prompt.as_deref().is_none_or(str::is_empty);
        return Some(if cleared { "System prompt cleared" } else { "System prompt updated" }.to_string());
    }
    if previous.model != updated.model {
        return Some(format!("Conversation model set to {}", updated.model));
    }
    let sampling_changed = previous.temperature != updated.temperature
        || previous.top_p != updated.top_p
        || previous.top_k != updated.top_k
        || previous.max_tokens != updated.max_tokens;
    sampling_changed.then(|| "Sampling parameters updated".to_string())
}
