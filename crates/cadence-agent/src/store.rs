//! Persistence collaborator
//!
//! The relay and the built-in tools only talk to storage through
//! [`SessionStore`]. [`MemoryStore`] keeps everything in process; other
//! implementations fold their on-disk records into [`SessionState`].

use async_trait::async_trait;
use cadence_ai::{Message, Role};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Session metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Serialized summary produced when the session was completed
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: None,
            summary: None,
            completed: false,
            started_at,
            ended_at: None,
        }
    }
}

/// One persisted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Something learned about the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A presentation practice exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationRecord {
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Status given to newly created presentations
pub const PRESENTATION_RECORDING: &str = "recording";

/// Storage operations the relay and the tools depend on
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a message, creating the session on first use
    async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<()>;

    /// Ordered message history of a session (empty if unknown)
    async fn read_history(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Session metadata, if the session exists
    async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Sessions with a summary other than `exclude`, newest first
    async fn recent_sessions(&self, exclude: &str, limit: usize) -> Result<Vec<SessionRecord>>;

    /// Stored facts across all sessions, newest first
    async fn facts(&self, limit: usize) -> Result<Vec<FactRecord>>;

    /// Set title and summary and mark the session completed
    async fn complete_session(
        &self,
        session_id: &str,
        title: &str,
        summary: &str,
    ) -> Result<SessionRecord>;

    /// Store facts for a session, returning the session's full fact list
    async fn add_facts(&self, session_id: &str, facts: &[String]) -> Result<Vec<FactRecord>>;

    /// Create a presentation record with status `recording`
    async fn create_presentation(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<PresentationRecord>;

    /// Current scratchpad content, if any has been written
    async fn read_scratchpad(&self, session_id: &str) -> Result<Option<String>>;

    /// Replace the scratchpad content
    async fn replace_scratchpad(&self, session_id: &str, content: &str) -> Result<()>;
}

/// Everything known about one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub record: SessionRecord,
    pub messages: Vec<StoredMessage>,
    pub facts: Vec<FactRecord>,
    pub presentations: Vec<PresentationRecord>,
    pub scratchpad: Option<String>,
}

impl SessionState {
    pub fn new(record: SessionRecord) -> Self {
        Self {
            record,
            messages: Vec::new(),
            facts: Vec::new(),
            presentations: Vec::new(),
            scratchpad: None,
        }
    }

    /// Message history in upstream form
    pub fn history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| Message {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Apply a completion
    pub fn complete(&mut self, title: &str, summary: &str, at: DateTime<Utc>) {
        self.record.title = Some(title.to_string());
        self.record.summary = Some(summary.to_string());
        self.record.completed = true;
        self.record.ended_at = Some(at);
    }
}

/// Newest-first sessions with a summary, excluding one id
pub fn select_recent<'a>(
    states: impl Iterator<Item = &'a SessionState>,
    exclude: &str,
    limit: usize,
) -> Vec<SessionRecord> {
    let mut sessions: Vec<SessionRecord> = states
        .filter(|s| s.record.id != exclude && s.record.summary.is_some())
        .map(|s| s.record.clone())
        .collect();
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    sessions.truncate(limit);
    sessions
}

/// Newest-first facts across sessions
pub fn select_facts<'a>(
    states: impl Iterator<Item = &'a SessionState>,
    limit: usize,
) -> Vec<FactRecord> {
    let mut facts: Vec<FactRecord> = states.flat_map(|s| s.facts.iter().cloned()).collect();
    facts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    facts.truncate(limit);
    facts
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Result<T> {
        let mut sessions = self.sessions.lock();
        let state = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::store(format!("Session not found: {}", session_id)))?;
        Ok(f(state))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        let now = Utc::now();
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(SessionRecord::new(session_id, now)))
            .messages
            .push(StoredMessage {
                role,
                content: content.to_string(),
                created_at: now,
            });
        Ok(())
    }

    async fn read_history(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .sessions
            .lock()
            .get(session_id)
            .map(SessionState::history)
            .unwrap_or_default())
    }

    async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self
            .sessions
            .lock()
            .get(session_id)
            .map(|s| s.record.clone()))
    }

    async fn recent_sessions(&self, exclude: &str, limit: usize) -> Result<Vec<SessionRecord>> {
        Ok(select_recent(self.sessions.lock().values(), exclude, limit))
    }

    async fn facts(&self, limit: usize) -> Result<Vec<FactRecord>> {
        Ok(select_facts(self.sessions.lock().values(), limit))
    }

    async fn complete_session(
        &self,
        session_id: &str,
        title: &str,
        summary: &str,
    ) -> Result<SessionRecord> {
        self.with_session(session_id, |state| {
            state.complete(title, summary, Utc::now());
            state.record.clone()
        })
    }

    async fn add_facts(&self, session_id: &str, facts: &[String]) -> Result<Vec<FactRecord>> {
        self.with_session(session_id, |state| {
            let now = Utc::now();
            state.facts.extend(facts.iter().map(|content| FactRecord {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                content: content.clone(),
                created_at: now,
            }));
            state.facts.clone()
        })
    }

    async fn create_presentation(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<PresentationRecord> {
        self.with_session(session_id, |state| {
            let presentation = PresentationRecord {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                title: title.to_string(),
                status: PRESENTATION_RECORDING.to_string(),
                created_at: Utc::now(),
            };
            state.presentations.push(presentation.clone());
            presentation
        })
    }

    async fn read_scratchpad(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self
            .sessions
            .lock()
            .get(session_id)
            .and_then(|s| s.scratchpad.clone()))
    }

    async fn replace_scratchpad(&self, session_id: &str, content: &str) -> Result<()> {
        self.with_session(session_id, |state| {
            state.scratchpad = Some(content.to_string());
        })
    }
}
