//! Application state for the TUI.
//!
//! `AppStore` is owned by the UI loop. Fields are only changed through the
//! named actions below; background tasks never touch it directly, they send
//! [`crate::events::AppEvent`]s that the orchestrator applies here.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::api::{Conversation, DashboardStats, ModelInfo, SystemPrompt};
use crate::config::Settings;
use crate::events::{NotificationLevel, View};
use crate::streaming::StreamingState;

const MAX_NOTIFICATIONS: usize = 5;

/// A status-bar message with an expiry
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub text: String,
    pub created: Instant,
}

/// Which pane of the chat view receives keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    Sidebar,
    #[default]
    Composer,
}

#[derive(Debug, Clone)]
pub struct AppStore {
    view: View,
    focus: Focus,
    settings: Settings,
    conversations: Vec<Conversation>,
    selected_index: usize,
    active_id: Option<String>,
    active: Option<Conversation>,
    search: Option<(String, Vec<Conversation>)>,
    stats: Option<DashboardStats>,
    models: Vec<ModelInfo>,
    prompts: Vec<SystemPrompt>,
    notifications: VecDeque<Notification>,
    streaming: StreamingState,
    settings_dirty: bool,
}

impl AppStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            view: View::default(),
            focus: Focus::default(),
            settings,
            conversations: Vec::new(),
            selected_index: 0,
            active_id: None,
            active: None,
            search: None,
            stats: None,
            models: Vec::new(),
            prompts: Vec::new(),
            notifications: VecDeque::new(),
            streaming: StreamingState::new(),
            settings_dirty: false,
        }
    }

    // ---- views and focus ----

    pub fn view(&self) -> View {
        self.view
    }

    pub fn set_view(&mut self, view: View) {
        self.view = view;
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Sidebar => Focus::Composer,
            Focus::Composer => Focus::Sidebar,
        };
    }

    // ---- settings ----

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply an edit to the settings, clamping sampling values
    pub fn update_settings(&mut self, edit: impl FnOnce(&mut Settings)) {
        edit(&mut self.settings);
        self.settings.clamp();
        self.settings_dirty = true;
    }

    /// Returns true once per batch of edits that still needs saving
    pub fn take_settings_dirty(&mut self) -> bool {
        std::mem::take(&mut self.settings_dirty)
    }

    // ---- conversations ----

    /// Conversations shown in the sidebar: search results if a search is active
    pub fn visible_conversations(&self) -> &[Conversation] {
        match &self.search {
            Some((_, results)) => results,
            None => &self.conversations,
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Replace the index, pinned conversations first, newest first
    pub fn set_conversations(&mut self, mut conversations: Vec<Conversation>) {
        conversations.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        self.conversations = conversations;
        self.clamp_selection();
    }

    pub fn set_search_results(&mut self, query: String, results: Vec<Conversation>) {
        self.search = Some((query, results));
        self.selected_index = 0;
    }

    pub fn clear_search(&mut self) {
        self.search = None;
        self.clamp_selection();
    }

    pub fn search_query(&self) -> Option<&str> {
        self.search.as_ref().map(|(q, _)| q.as_str())
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = self.visible_conversations().len();
        if len == 0 {
            self.selected_index = 0;
            return;
        }
        let next = (self.selected_index as isize + delta).rem_euclid(len as isize);
        self.selected_index = next as usize;
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.visible_conversations().get(self.selected_index)
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_conversations().len();
        self.selected_index = self.selected_index.min(len.saturating_sub(1));
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    /// Switch the active conversation; messages arrive later via `set_active_conversation`
    pub fn select_conversation(&mut self, id: Option<String>) {
        if self.active_id != id {
            self.active = None;
        }
        self.active_id = id;
    }

    /// Adopt an id assigned by the backend, but only when nothing was active
    pub fn adopt_conversation_id(&mut self, id: &str) -> bool {
        if self.active_id.is_some() || id.is_empty() {
            return false;
        }
        self.active_id = Some(id.to_string());
        true
    }

    /// Store a freshly fetched conversation if it is still the active one
    pub fn set_active_conversation(&mut self, conversation: Conversation) {
        if self.active_id.as_deref() == Some(conversation.uuid.as_str()) {
            self.active = Some(conversation);
        }
    }

    /// Merge updated metadata into the index and the active conversation
    pub fn update_conversation(&mut self, updated: Conversation) {
        if let Some(active) = self.active.as_mut() {
            if active.uuid == updated.uuid {
                let messages = std::mem::take(&mut active.messages);
                *active = Conversation {
                    messages,
                    ..updated.clone()
                };
            }
        }
        if let Some(entry) = self.conversations.iter_mut().find(|c| c.uuid == updated.uuid) {
            *entry = updated;
        }
    }

    /// Add a conversation to the index without touching the selection
    pub fn insert_conversation(&mut self, conversation: Conversation) {
        let mut conversations = std::mem::take(&mut self.conversations);
        conversations.retain(|c| c.uuid != conversation.uuid);
        conversations.push(conversation);
        self.set_conversations(conversations);
    }

    /// Look up a conversation in the active slot or the index
    pub fn find_conversation(&self, id: &str) -> Option<&Conversation> {
        self.active
            .as_ref()
            .filter(|c| c.uuid == id)
            .or_else(|| self.conversations.iter().find(|c| c.uuid == id))
    }

    pub fn remove_conversation(&mut self, id: &str) {
        self.conversations.retain(|c| c.uuid != id);
        if let Some((_, results)) = self.search.as_mut() {
            results.retain(|c| c.uuid != id);
        }
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
            self.active = None;
        }
        self.clamp_selection();
    }

    // ---- generation ----

    pub fn streaming(&self) -> &StreamingState {
        &self.streaming
    }

    /// Mark a generation as in progress with an empty buffer
    pub fn begin_generation(&mut self) {
        self.streaming.start();
    }

    pub fn append_chunk(&mut self, text: &str) {
        if self.streaming.is_generating() {
            self.streaming.push_delta(text);
        }
    }

    pub fn end_generation(&mut self) {
        self.streaming.clear();
    }

    // ---- dashboard, models, prompts ----

    pub fn stats(&self) -> Option<&DashboardStats> {
        self.stats.as_ref()
    }

    pub fn set_stats(&mut self, stats: DashboardStats) {
        self.stats = Some(stats);
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn set_models(&mut self, models: Vec<ModelInfo>) {
        self.models = models;
    }

    pub fn prompts(&self) -> &[SystemPrompt] {
        &self.prompts
    }

    pub fn set_prompts(&mut self, prompts: Vec<SystemPrompt>) {
        self.prompts = prompts;
    }

    // ---- notifications ----

    pub fn notify(&mut self, level: NotificationLevel, text: impl Into<String>) {
        self.notifications.push_back(Notification {
            level,
            text: text.into(),
            created: Instant::now(),
        });
        while self.notifications.len() > MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn latest_notification(&self) -> Option<&Notification> {
        self.notifications.back()
    }

    /// Drop notifications older than `ttl`
    pub fn expire_notifications(&mut self, ttl: Duration) {
        let now = Instant::now();
        self.notifications.retain(|n| now.duration_since(n.created) < ttl);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    pub(crate) fn conversation(uuid: &str, pinned: bool, minute: u32) -> Conversation {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap();
        Conversation {
            uuid: uuid.to_string(),
            title: format!("Conversation {uuid}"),
            model: "dolphin-mistral".to_string(),
            system_prompt: None,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_tokens: 2048,
            is_pinned: pinned,
            is_archived: false,
            message_count: 0,
            total_tokens: 0,
            created_at: at,
            updated_at: at,
            messages: Vec::new(),
        }
    }

    #[test]
    fn index_sorts_pinned_then_recent() {
        let mut store = AppStore::new(Settings::default());
        store.set_conversations(vec![
            conversation("old", false, 1),
            conversation("pinned", true, 0),
            conversation("new", false, 9),
        ]);
        let order: Vec<_> = store.conversations().iter().map(|c| c.uuid.as_str()).collect();
        assert_eq!(order, ["pinned", "new", "old"]);
    }

    #[test]
    fn adopt_only_when_nothing_active() {
        let mut store = AppStore::new(Settings::default());
        assert!(!store.adopt_conversation_id(""));
        assert!(store.adopt_conversation_id("c-1"));
        assert!(!store.adopt_conversation_id("c-2"));
        assert_eq!(store.active_id(), Some("c-1"));
    }

    #[test]
    fn stale_conversation_is_not_displayed() {
        let mut store = AppStore::new(Settings::default());
        store.select_conversation(Some("a".to_string()));
        store.set_active_conversation(conversation("b", false, 0));
        assert!(store.active_conversation().is_none());
        store.set_active_conversation(conversation("a", false, 0));
        assert_eq!(store.active_conversation().map(|c| c.uuid.as_str()), Some("a"));
    }

    #[test]
    fn removing_active_conversation_clears_selection() {
        let mut store = AppStore::new(Settings::default());
        store.set_conversations(vec![conversation("a", false, 0), conversation("b", false, 1)]);
        store.select_conversation(Some("a".to_string()));
        store.move_selection(1);
        store.remove_conversation("a");
        assert!(store.active_id().is_none());
        assert_eq!(store.selected_index(), 0);
    }

    #[test]
    fn inserted_conversation_keeps_selection() {
        let mut store = AppStore::new(Settings::default());
        store.set_conversations(vec![conversation("a", false, 0)]);
        store.insert_conversation(conversation("b", false, 5));
        assert!(store.active_id().is_none());
        let order: Vec<_> = store.conversations().iter().map(|c| c.uuid.as_str()).collect();
        assert_eq!(order, ["b", "a"]);
        assert_eq!(store.find_conversation("a").map(|c| c.uuid.as_str()), Some("a"));
        assert!(store.find_conversation("zzz").is_none());
    }

    #[test]
    fn chunks_ignored_when_idle() {
        let mut store = AppStore::new(Settings::default());
        store.append_chunk("late");
        assert!(!store.streaming().has_content());
        store.begin_generation();
        store.append_chunk("A");
        store.append_chunk("B");
        assert_eq!(store.streaming().text(), "AB");
        store.end_generation();
        assert!(!store.streaming().is_generating());
        assert_eq!(store.streaming().text(), "");
    }

    #[test]
    fn settings_edits_clamp_and_mark_dirty() {
        let mut store = AppStore::new(Settings::default());
        store.update_settings(|s| s.temperature = 9.0);
        assert_eq!(store.settings().temperature, 2.0);
        assert!(store.take_settings_dirty());
        assert!(!store.take_settings_dirty());
    }

    #[test]
    fn notifications_are_bounded() {
        let mut store = AppStore::new(Settings::default());
        for i in 0..8 {
            store.notify(NotificationLevel::Info, format!("n{i}"));
        }
        assert_eq!(store.notifications().count(), MAX_NOTIFICATIONS);
        assert_eq!(store.latest_notification().unwrap().text, "n7");
        store.expire_notifications(Duration::ZERO);
        assert_eq!(store.notifications().count(), 0);
    }
}
