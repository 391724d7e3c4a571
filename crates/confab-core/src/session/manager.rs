//! Session persistence and caching.
//!
//! File format: JSONL in `~/.confab/sessions/{safe_id}.jsonl`
//! - Line 1: `{"_type":"metadata","id":"...","config":{...},"createdAt":"...","updatedAt":"..."}`
//! - Line 2+: one canonical `Message` per line

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::MessageStore;
use crate::types::{find_tool_call, Message, Role, Session, SessionConfig};
use crate::utils;

// ─────────────────────────────────────────────
// Session metadata (first line of JSONL)
// ─────────────────────────────────────────────

/// Metadata header written as the first line of each JSONL session file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionMetadata {
    #[serde(rename = "_type")]
    record_type: String,
    id: String,
    #[serde(default)]
    config: SessionConfig,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────
// SessionManager
// ─────────────────────────────────────────────

/// Manages conversation sessions with in-memory caching and JSONL persistence.
///
/// Thread-safe via `RwLock` — multiple readers, exclusive writer.
pub struct SessionManager {
    /// Directory where `.jsonl` session files are stored.
    sessions_dir: PathBuf,
    /// In-memory cache of loaded sessions.
    cache: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    /// Create a new session manager.
    ///
    /// `sessions_dir` defaults to `~/.confab/sessions/` if `None`.
    /// The directory is created if it doesn't exist.
    pub fn new(sessions_dir: Option<PathBuf>) -> std::io::Result<Self> {
        let dir = sessions_dir.unwrap_or_else(utils::get_sessions_path);
        std::fs::create_dir_all(&dir)?;

        Ok(SessionManager {
            sessions_dir: dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Get a session from cache or disk.
    pub fn get(&self, id: &str) -> Option<Session> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(session) = cache.get(id) {
                return Some(session.clone());
            }
        }

        let session = self.load_from_disk(id)?;
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(id.to_string(), session.clone());
        Some(session)
    }

    /// Get an existing session or create a new one with `config`.
    pub fn get_or_create(&self, id: &str, config: SessionConfig) -> anyhow::Result<Session> {
        match self.get(id) {
            Some(session) => Ok(session),
            None => self.create_session(id, config),
        }
    }

    /// Delete a session entirely (from cache and disk).
    ///
    /// Returns `true` if the session file existed on disk.
    pub fn delete(&self, id: &str) -> bool {
        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.remove(id);
        }

        let path = self.session_path(id);
        if !path.exists() {
            return false;
        }
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to delete session file: {}", e);
            return false;
        }
        debug!("Deleted session file: {}", path.display());
        true
    }

    /// List all sessions from disk, newest first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();

        let entries = match std::fs::read_dir(&self.sessions_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read sessions directory: {}", e);
                return summaries;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "jsonl") {
                continue;
            }

            let Ok(file) = std::fs::File::open(&path) else {
                continue;
            };
            let reader = std::io::BufReader::new(file);
            let Some(Ok(line)) = reader.lines().next() else {
                continue;
            };
            if let Ok(meta) = serde_json::from_str::<SessionMetadata>(&line) {
                summaries.push(SessionSummary {
                    id: meta.id,
                    model: meta.config.model,
                    created_at: meta.created_at,
                    updated_at: meta.updated_at,
                    path: path.clone(),
                });
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// Get the JSONL file path for a session id.
    fn session_path(&self, id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.jsonl", utils::safe_filename(id)))
    }

    /// Load a session from a JSONL file.
    fn load_from_disk(&self, id: &str) -> Option<Session> {
        let path = self.session_path(id);
        if !path.exists() {
            return None;
        }

        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Failed to open session file {}: {}", path.display(), e);
                return None;
            }
        };

        let reader = std::io::BufReader::new(file);
        let mut session = Session::new(id, SessionConfig::default());

        for line in reader.lines() {
            let Ok(line) = line else { continue };
            if line.trim().is_empty() {
                continue;
            }

            if let Ok(meta) = serde_json::from_str::<SessionMetadata>(&line) {
                if meta.record_type == "metadata" {
                    session.config = meta.config;
                    session.created_at = meta.created_at;
                    session.updated_at = meta.updated_at;
                    continue;
                }
            }

            match serde_json::from_str::<Message>(&line) {
                Ok(msg) => session.messages.push(msg),
                Err(e) => warn!(session = id, error = %e, "skipping unreadable session line"),
            }
        }

        debug!(
            "Loaded session '{}' with {} messages from disk",
            id,
            session.messages.len()
        );
        Some(session)
    }

    /// Save a session to a JSONL file (overwrite).
    fn save_to_disk(&self, session: &Session) -> std::io::Result<()> {
        let path = self.session_path(&session.id);
        let mut file = std::fs::File::create(&path)?;

        let meta = SessionMetadata {
            record_type: "metadata".to_string(),
            id: session.id.clone(),
            config: session.config.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        };
        writeln!(file, "{}", serde_json::to_string(&meta)?)?;

        for msg in &session.messages {
            writeln!(file, "{}", serde_json::to_string(msg)?)?;
        }

        debug!(
            "Saved session '{}' ({} messages) to {}",
            session.id,
            session.messages.len(),
            path.display()
        );
        Ok(())
    }
}

impl MessageStore for SessionManager {
    fn find_session(&self, id: &str) -> Option<Session> {
        self.get(id)
    }

    fn create_session(&self, id: &str, config: SessionConfig) -> anyhow::Result<Session> {
        if id.trim().is_empty() {
            bail!("session id must not be empty");
        }
        if self.get(id).is_some() {
            bail!("session '{id}' already exists");
        }

        let session = Session::new(id, config);
        self.save_to_disk(&session)
            .with_context(|| format!("failed to persist new session {id}"))?;

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(id.to_string(), session.clone());
        Ok(session)
    }

    fn save_message(&self, message: Message) -> anyhow::Result<Message> {
        let session_id = message
            .session_id
            .clone()
            .ok_or_else(|| anyhow!("message has no session_id"))?;
        message.validate()?;

        let mut session = self
            .get(&session_id)
            .ok_or_else(|| anyhow!("session '{session_id}' not found"))?;

        if message.role == Role::Tool {
            let call_id = message.tool_call_id.as_deref().unwrap_or_default();
            if find_tool_call(&session.messages, call_id).is_none() {
                bail!("tool result references unknown tool call '{call_id}'");
            }
        }

        session.messages.push(message.clone());
        session.updated_at = Utc::now();

        self.save_to_disk(&session)
            .with_context(|| format!("failed to persist session {session_id}"))?;

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(session_id, session);
        Ok(message)
    }
}

/// Summary of a session for listing purposes.
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub id: String,
    /// Model the session is configured for.
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Path to the JSONL file.
    pub path: PathBuf,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Arguments, ToolCall};
    use tempfile::tempdir;

    fn make_manager() -> (SessionManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mgr = SessionManager::new(Some(dir.path().to_path_buf())).unwrap();
        (mgr, dir)
    }

    fn config() -> SessionConfig {
        SessionConfig {
            model: "llama3.1".into(),
            engine_id: "ollama".into(),
            ..Default::default()
        }
    }

    fn in_session(mut msg: Message, id: &str) -> Message {
        msg.stamp(id, None, None);
        msg
    }

    #[test]
    fn test_create_and_find() {
        let (mgr, _dir) = make_manager();
        mgr.create_session("s1", config()).unwrap();

        let session = mgr.find_session("s1").unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(session.config.model, "llama3.1");
        assert!(session.messages.is_empty());
        assert!(mgr.find_session("missing").is_none());
    }

    #[test]
    fn test_create_duplicate_fails() {
        let (mgr, _dir) = make_manager();
        mgr.create_session("s1", config()).unwrap();
        assert!(mgr.create_session("s1", config()).is_err());
    }

    #[test]
    fn test_get_or_create_reuses() {
        let (mgr, _dir) = make_manager();
        mgr.create_session("s1", config()).unwrap();
        mgr.save_message(in_session(Message::user("hello"), "s1")).unwrap();

        let session = mgr.get_or_create("s1", SessionConfig::default()).unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.config.engine_id, "ollama");
    }

    #[test]
    fn test_save_message_appends() {
        let (mgr, _dir) = make_manager();
        mgr.create_session("s1", config()).unwrap();
        mgr.save_message(in_session(Message::user("hello"), "s1")).unwrap();
        mgr.save_message(in_session(Message::assistant("hi there!"), "s1")).unwrap();

        let session = mgr.find_session("s1").unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].content, "hi there!");
    }

    #[test]
    fn test_save_message_requires_session() {
        let (mgr, _dir) = make_manager();
        assert!(mgr.save_message(Message::user("orphan")).is_err());
        assert!(mgr.save_message(in_session(Message::user("x"), "nope")).is_err());
    }

    #[test]
    fn test_tool_result_must_reference_prior_call() {
        let (mgr, _dir) = make_manager();
        mgr.create_session("s1", config()).unwrap();

        let orphan = Message::tool_result("call_x", "result").unwrap();
        assert!(mgr.save_message(in_session(orphan, "s1")).is_err());

        let call = ToolCall::new("call_x", "lookup", Arguments::new());
        mgr.save_message(in_session(Message::assistant_tool_calls("", vec![call]), "s1"))
            .unwrap();
        let answer = Message::tool_result("call_x", "result").unwrap();
        assert!(mgr.save_message(in_session(answer, "s1")).is_ok());
    }

    #[test]
    fn test_delete_session() {
        let (mgr, _dir) = make_manager();
        mgr.create_session("s1", config()).unwrap();

        assert!(mgr.delete("s1"));
        assert!(mgr.find_session("s1").is_none());
        assert!(!mgr.delete("s1"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();

        {
            let mgr = SessionManager::new(Some(dir.path().to_path_buf())).unwrap();
            mgr.create_session("cli:default", config()).unwrap();
            mgr.save_message(in_session(Message::system("Be brief."), "cli:default"))
                .unwrap();
            mgr.save_message(in_session(Message::user("Hello"), "cli:default"))
                .unwrap();
        }

        // New manager (empty cache) should load from disk
        {
            let mgr = SessionManager::new(Some(dir.path().to_path_buf())).unwrap();
            let session = mgr.find_session("cli:default").unwrap();
            assert_eq!(session.messages.len(), 2);
            assert_eq!(session.config.engine_id, "ollama");
            assert_eq!(session.messages[0].role, Role::System);
        }
    }

    #[test]
    fn test_session_file_format() {
        let (mgr, dir) = make_manager();
        mgr.create_session("cli:local", config()).unwrap();
        mgr.save_message(in_session(Message::user("test message"), "cli:local"))
            .unwrap();

        let path = dir.path().join("cli_local.jsonl");
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let meta: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(meta["_type"], "metadata");
        assert_eq!(meta["id"], "cli:local");

        let msg: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["sessionId"], "cli:local");
    }

    #[test]
    fn test_list_sessions() {
        let (mgr, _dir) = make_manager();
        mgr.create_session("a:1", config()).unwrap();
        mgr.create_session("b:2", config()).unwrap();

        let sessions = mgr.list_sessions();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(sessions.len(), 2);
        assert!(ids.contains(&"a:1"));
        assert!(ids.contains(&"b:2"));
        assert_eq!(sessions[0].model, "llama3.1");
    }
}
