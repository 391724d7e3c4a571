//! Session persistence.
//!
//! [`MessageStore`] is the seam the dispatch loop talks to; [`SessionManager`]
//! is the JSONL-backed implementation.
//!
//! # Disk format (JSONL)
//!
//! Each session is a `.jsonl` file under `~/.confab/sessions/`.
//! - Line 1: metadata `{"_type": "metadata", "id": "...", "config": {...}, "createdAt": "...", "updatedAt": "..."}`
//! - Lines 2+: messages `{"role": "user", "content": "hello", "createdAt": "..."}`

pub mod manager;

pub use manager::{SessionManager, SessionSummary};

use crate::types::{Message, Session, SessionConfig};

/// Read sessions and append messages to them.
///
/// History is append-only: stored messages are never rewritten.
pub trait MessageStore: Send + Sync {
    /// Load a session with its full history.
    fn find_session(&self, id: &str) -> Option<Session>;

    /// Create a new empty session (fails if `id` already exists).
    fn create_session(&self, id: &str, config: SessionConfig) -> anyhow::Result<Session>;

    /// Append a message to the session named by `message.session_id`.
    ///
    /// Returns the message as stored.
    fn save_message(&self, message: Message) -> anyhow::Result<Message>;
}
