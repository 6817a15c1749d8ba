//! JSONL session store
//!
//! One append-only file per session. The current state of a session is the
//! fold of its entries, so nothing is ever rewritten in place.

use async_trait::async_trait;
use cadence_agent::store::{
    FactRecord, PRESENTATION_RECORDING, PresentationRecord, SessionRecord, SessionState,
    SessionStore, StoredMessage, select_facts, select_recent,
};
use cadence_agent::{Error, Result};
use cadence_ai::{Message, Role};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Session entry types for JSONL format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEntry {
    /// Session metadata, always the first line
    Metadata { id: String, started_at: i64 },
    /// A message in the conversation
    Message {
        role: Role,
        content: String,
        timestamp: i64,
    },
    /// The session was completed
    Completed {
        title: String,
        summary: String,
        timestamp: i64,
    },
    /// A fact learned about the user
    Fact {
        id: String,
        content: String,
        timestamp: i64,
    },
    /// A presentation practice record
    Presentation {
        id: String,
        title: String,
        status: String,
        timestamp: i64,
    },
    /// New scratchpad content
    Scratchpad { content: String, timestamp: i64 },
}

/// Whether a client-supplied session id is safe to use as a file name
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn store_err(e: impl std::fmt::Display) -> Error {
    Error::store(e.to_string())
}

fn at(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// File-backed session store
pub struct JsonlStore {
    dir: PathBuf,
    /// Serializes appends
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the session files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, session_id: &str) -> Result<PathBuf> {
        if !is_valid_session_id(session_id) {
            return Err(Error::store(format!("Invalid session id: {:?}", session_id)));
        }
        Ok(self.dir.join(format!("{}.jsonl", session_id)))
    }

    /// Append entries, writing the metadata line first for a new session
    fn append(&self, session_id: &str, entries: &[SessionEntry]) -> Result<()> {
        let path = self.path(session_id)?;
        let _guard = self.write_lock.lock();

        let is_new = !path.exists();
        let mut file = File::options()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(store_err)?;

        let mut buf = String::new();
        if is_new {
            let metadata = SessionEntry::Metadata {
                id: session_id.to_string(),
                started_at: Utc::now().timestamp_millis(),
            };
            buf.push_str(&serde_json::to_string(&metadata).map_err(store_err)?);
            buf.push('\n');
        }
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry).map_err(store_err)?);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes()).map_err(store_err)?;
        file.flush().map_err(store_err)
    }

    /// Fold a session file into its current state
    fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.path(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::load_path(&path).map(Some)
    }

    fn load_path(path: &Path) -> Result<SessionState> {
        let file = File::open(path).map_err(store_err)?;
        let reader = BufReader::new(file);

        let fallback_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let mut state = SessionState::new(SessionRecord::new(fallback_id, DateTime::default()));

        for line in reader.lines() {
            let line = line.map_err(store_err)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionEntry>(&line) {
                Ok(entry) => apply(&mut state, entry),
                Err(e) => {
                    tracing::warn!("Skipping bad entry in {}: {}", path.display(), e);
                }
            }
        }
        Ok(state)
    }

    fn all_states(&self) -> Result<Vec<SessionState>> {
        let mut states = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(store_err)? {
            let path = entry.map_err(store_err)?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
                match Self::load_path(&path) {
                    Ok(state) => states.push(state),
                    Err(e) => tracing::warn!("Skipping session file {}: {}", path.display(), e),
                }
            }
        }
        Ok(states)
    }

    fn require(&self, session_id: &str) -> Result<SessionState> {
        self.load(session_id)?
            .ok_or_else(|| Error::store(format!("Session not found: {}", session_id)))
    }
}

fn apply(state: &mut SessionState, entry: SessionEntry) {
    let session_id = state.record.id.clone();
    match entry {
        SessionEntry::Metadata { id, started_at } => {
            state.record.id = id;
            state.record.started_at = at(started_at);
        }
        SessionEntry::Message {
            role,
            content,
            timestamp,
        } => state.messages.push(StoredMessage {
            role,
            content,
            created_at: at(timestamp),
        }),
        SessionEntry::Completed {
            title,
            summary,
            timestamp,
        } => state.complete(&title, &summary, at(timestamp)),
        SessionEntry::Fact {
            id,
            content,
            timestamp,
        } => state.facts.push(FactRecord {
            id,
            session_id,
            content,
            created_at: at(timestamp),
        }),
        SessionEntry::Presentation {
            id,
            title,
            status,
            timestamp,
        } => state.presentations.push(PresentationRecord {
            id,
            session_id,
            title,
            status,
            created_at: at(timestamp),
        }),
        SessionEntry::Scratchpad { content, .. } => state.scratchpad = Some(content),
    }
}

#[async_trait]
impl SessionStore for JsonlStore {
    async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        self.append(
            session_id,
            &[SessionEntry::Message {
                role,
                content: content.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            }],
        )
    }

    async fn read_history(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .load(session_id)?
            .map(|s| s.history())
            .unwrap_or_default())
    }

    async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.load(session_id)?.map(|s| s.record))
    }

    async fn recent_sessions(&self, exclude: &str, limit: usize) -> Result<Vec<SessionRecord>> {
        Ok(select_recent(self.all_states()?.iter(), exclude, limit))
    }

    async fn facts(&self, limit: usize) -> Result<Vec<FactRecord>> {
        Ok(select_facts(self.all_states()?.iter(), limit))
    }

    async fn complete_session(
        &self,
        session_id: &str,
        title: &str,
        summary: &str,
    ) -> Result<SessionRecord> {
        self.require(session_id)?;
        self.append(
            session_id,
            &[SessionEntry::Completed {
                title: title.to_string(),
                summary: summary.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            }],
        )?;
        Ok(self.require(session_id)?.record)
    }

    async fn add_facts(&self, session_id: &str, facts: &[String]) -> Result<Vec<FactRecord>> {
        self.require(session_id)?;
        let timestamp = Utc::now().timestamp_millis();
        let entries: Vec<SessionEntry> = facts
            .iter()
            .map(|content| SessionEntry::Fact {
                id: uuid::Uuid::new_v4().to_string(),
                content: content.clone(),
                timestamp,
            })
            .collect();
        if !entries.is_empty() {
            self.append(session_id, &entries)?;
        }
        Ok(self.require(session_id)?.facts)
    }

    async fn create_presentation(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<PresentationRecord> {
        self.require(session_id)?;
        let record = PresentationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            title: title.to_string(),
            status: PRESENTATION_RECORDING.to_string(),
            created_at: Utc::now(),
        };
        self.append(
            session_id,
            &[SessionEntry::Presentation {
                id: record.id.clone(),
                title: record.title.clone(),
                status: record.status.clone(),
                timestamp: record.created_at.timestamp_millis(),
            }],
        )?;
        Ok(record)
    }

    async fn read_scratchpad(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self.load(session_id)?.and_then(|s| s.scratchpad))
    }

    async fn replace_scratchpad(&self, session_id: &str, content: &str) -> Result<()> {
        self.require(session_id)?;
        self.append(
            session_id,
            &[SessionEntry::Scratchpad {
                content: content.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            }],
        )
    }
}
