//! Chat sessions.
//!
//! A session is a bounded interaction window between one user and one chat
//! agent. It lives in a [`SessionStore`], expires after a period of
//! inactivity, and is mirrored into the `chat_session` table.

pub mod lifecycle;
pub mod store;

pub use lifecycle::{SessionEndResult, SessionLifecycle, SessionStart, SynthesisResult};
pub use store::{MemorySessionStore, SessionLocks, SessionStore};

use crate::request::Language;
use augury_core::ChatKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A live chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    pub kind: ChatKind,
    pub language: Language,
    /// Base instruction plus the plan active when the session started
    pub system_instruction: String,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turn_count: u64,
}

impl ChatSession {
    /// Idle for longer than `inactivity` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, inactivity: Duration) -> bool {
        now - self.last_active > inactivity
    }
}
