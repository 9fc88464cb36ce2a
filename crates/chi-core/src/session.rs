//! Conversation History
//!
//! Append-only storage of conversation turns plus a separate log of data
//! returned by tool calls.
//!
//! Conversations are never opened or closed explicitly. Each appended message
//! goes to the *current* conversation as long as that conversation was
//! updated within the session gap; otherwise a fresh conversation is started
//! and becomes current. Which conversation is current is tracked by a
//! [`SessionTracker`] owned by the store, not by global state.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::clock::{Clock, SystemClock};
use crate::config::HistoryConfig;
use crate::error::Result;
use crate::message::{Message, Role};
use crate::persistence;

/// Conversation identifier, assigned by the store and never reused
pub type ConversationId = i64;

/// Preview shown for a conversation that has no user message yet
pub const EMPTY_PREVIEW: &str = "(empty)";

/// A stored conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    fn new(id: ConversationId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// First user message, cut to `max_chars` characters
    pub fn preview(&self, max_chars: usize) -> String {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map_or_else(
                || EMPTY_PREVIEW.to_string(),
                |m| m.content.chars().take(max_chars).collect(),
            )
    }
}

/// Listing entry returned by [`HistoryStore::list_conversations`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub preview: String,
    pub messages: Vec<Message>,
}

/// Data returned by one successful tool call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectedDataRecord {
    pub tool: String,
    pub collected_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Tracks which conversation new messages are appended to
#[derive(Clone, Debug, Default)]
pub struct SessionTracker {
    current: Option<ConversationId>,
}

impl SessionTracker {
    pub fn current(&self) -> Option<ConversationId> {
        self.current
    }

    /// The current conversation, if it is still open at `now`
    fn live<'a>(
        &self,
        conversations: &'a mut [Conversation],
        now: DateTime<Utc>,
        gap: TimeDelta,
    ) -> Option<&'a mut Conversation> {
        let id = self.current?;
        conversations
            .iter_mut()
            .find(|c| c.id == id)
            .filter(|c| now.signed_duration_since(c.updated_at) < gap)
    }

    fn forget(&mut self, id: ConversationId) {
        if self.current == Some(id) {
            self.current = None;
        }
    }
}

/// The full persisted document: both tables plus the id counter
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryState {
    next_conversation_id: ConversationId,
    /// Kept in id (creation) order
    conversations: Vec<Conversation>,
    /// Kept in insertion order
    collected_data: Vec<CollectedDataRecord>,
    #[serde(skip)]
    tracker: SessionTracker,
}

impl Default for HistoryState {
    fn default() -> Self {
        Self {
            next_conversation_id: 1,
            conversations: Vec::new(),
            collected_data: Vec::new(),
            tracker: SessionTracker::default(),
        }
    }
}

impl HistoryState {
    fn append(&mut self, role: Role, content: &str, now: DateTime<Utc>, gap: TimeDelta) -> ConversationId {
        let mut message = Message::new(role, content);
        message.timestamp = now;

        if let Some(conversation) = self.tracker.live(&mut self.conversations, now, gap) {
            conversation.messages.push(message);
            conversation.updated_at = now;
            return conversation.id;
        }

        let id = self.next_conversation_id;
        self.next_conversation_id += 1;
        let mut conversation = Conversation::new(id, now);
        conversation.messages.push(message);
        self.conversations.push(conversation);
        self.tracker.current = Some(id);
        tracing::debug!(conversation_id = id, "Started new conversation");
        id
    }

    fn summaries(&self, limit: usize, preview_chars: usize) -> Vec<ConversationSummary> {
        let mut ordered: Vec<&Conversation> = self.conversations.iter().collect();
        ordered.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        ordered
            .into_iter()
            .take(limit)
            .map(|c| ConversationSummary {
                id: c.id,
                started_at: c.started_at,
                updated_at: c.updated_at,
                message_count: c.messages.len(),
                preview: c.preview(preview_chars),
                messages: c.messages.clone(),
            })
            .collect()
    }

    fn recent_records(&self, limit: usize) -> Vec<CollectedDataRecord> {
        self.collected_data.iter().rev().take(limit).cloned().collect()
    }

    fn delete(&mut self, id: ConversationId) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        self.tracker.forget(id);
        self.conversations.len() != before
    }

    fn clear_all(&mut self) {
        self.conversations.clear();
        self.collected_data.clear();
        self.tracker = SessionTracker::default();
    }
}

/// Storage contract for conversation history and the tool-output log.
///
/// Implementations serialize their own writes; callers may read concurrently
/// with writes and only ever see whole messages.
pub trait HistoryStore: Send + Sync {
    /// Append to the current conversation, starting a new one when the
    /// session gap has elapsed. Returns the conversation the message went to.
    fn append_message(&self, role: Role, content: &str) -> Result<ConversationId>;

    /// Log data returned by a tool
    fn record_tool_output(&self, tool: &str, data: &serde_json::Value) -> Result<()>;

    /// Most recently updated conversations first
    fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>>;

    /// Most recent tool outputs first
    fn list_tool_outputs(&self, limit: usize) -> Result<Vec<CollectedDataRecord>>;

    /// `true` if the conversation existed and was removed
    fn delete_conversation(&self, id: ConversationId) -> Result<bool>;

    /// Remove all conversations and tool outputs
    fn clear_all(&self) -> Result<()>;

    /// Remove tool outputs only
    fn clear_tool_outputs(&self) -> Result<()>;
}

enum Backing {
    Memory,
    JsonFile(PathBuf),
}

/// History store kept in memory, optionally mirrored to a JSON file
pub struct SessionStore {
    state: RwLock<HistoryState>,
    /// Held across a file write so documents land in the order they were encoded
    write_order: Mutex<()>,
    backing: Backing,
    clock: Arc<dyn Clock>,
    config: HistoryConfig,
}

impl SessionStore {
    /// Volatile store (tests, `--memory-history`)
    pub fn in_memory(config: HistoryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Volatile store reading time from `clock`
    pub fn with_clock(config: HistoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(HistoryState::default()),
            write_order: Mutex::new(()),
            backing: Backing::Memory,
            clock,
            config,
        }
    }

    /// Durable store backed by a JSON document at `path`
    pub fn open(path: impl Into<PathBuf>, config: HistoryConfig) -> Result<Self> {
        Self::open_with_clock(path, config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        path: impl Into<PathBuf>,
        config: HistoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.into();
        let state = persistence::load(&path)?;
        tracing::info!(
            path = %path.display(),
            conversations = state.conversations.len(),
            records = state.collected_data.len(),
            "Opened history store"
        );
        Ok(Self {
            state: RwLock::new(state),
            write_order: Mutex::new(()),
            backing: Backing::JsonFile(path),
            clock,
            config,
        })
    }

    /// Conversation new messages currently go to, if any
    pub fn current_conversation(&self) -> Option<ConversationId> {
        self.read().tracker.current()
    }

    fn read(&self) -> RwLockReadGuard<'_, HistoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `op` and persist the result.
    ///
    /// The state lock is released before the file is written, so readers are
    /// never blocked on disk I/O. A failed save keeps the change in memory
    /// and returns the error; the next successful save writes it out.
    /// Blocking: async callers should go through `spawn_blocking`.
    fn update<R>(&self, op: impl FnOnce(&mut HistoryState, DateTime<Utc>) -> R) -> Result<R> {
        let now = self.clock.now();
        let mut guard: RwLockWriteGuard<'_, HistoryState> =
            self.state.write().unwrap_or_else(PoisonError::into_inner);
        let out = op(&mut guard, now);

        let Backing::JsonFile(path) = &self.backing else {
            return Ok(out);
        };
        let doc = persistence::encode(&guard)?;
        let _order = self.write_order.lock().unwrap_or_else(PoisonError::into_inner);
        drop(guard);
        persistence::write(path, &doc)?;
        Ok(out)
    }
}

impl HistoryStore for SessionStore {
    fn append_message(&self, role: Role, content: &str) -> Result<ConversationId> {
        let gap = self.config.session_gap;
        self.update(|state, now| state.append(role, content, now, gap))
    }

    fn record_tool_output(&self, tool: &str, data: &serde_json::Value) -> Result<()> {
        self.update(|state, now| {
            state.collected_data.push(CollectedDataRecord {
                tool: tool.to_string(),
                collected_at: now,
                data: data.clone(),
            });
        })
    }

    fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        Ok(self.read().summaries(limit, self.config.preview_chars))
    }

    fn list_tool_outputs(&self, limit: usize) -> Result<Vec<CollectedDataRecord>> {
        Ok(self.read().recent_records(limit))
    }

    fn delete_conversation(&self, id: ConversationId) -> Result<bool> {
        if !self.read().conversations.iter().any(|c| c.id == id) {
            return Ok(false);
        }
        self.update(|state, _| state.delete(id))
    }

    fn clear_all(&self) -> Result<()> {
        self.update(|state, _| state.clear_all())
    }

    fn clear_tool_outputs(&self) -> Result<()> {
        self.update(|state, _| state.collected_data.clear())
    }
}
