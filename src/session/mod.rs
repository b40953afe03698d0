//! Conversation session history
//!
//! The engine only consumes recent turns passed into a run; where those turns
//! come from is behind the `SessionStore` trait. The in-memory implementation
//! below covers a single process; a durable store can be slotted in without
//! touching the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Who produced a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The orchestrated response
    Assistant,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the turn
    pub role: Role,
    /// Turn text
    pub content: String,
}

impl Turn {
    /// Build a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Storage boundary for conversation history
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a turn to a session
    async fn append(&self, session_id: Uuid, turn: Turn);

    /// Most recent turns for a session, oldest first, capped at `limit`
    async fn recent(&self, session_id: Uuid, limit: usize) -> Vec<Turn>;
}

/// In-memory session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Vec<Turn>>>,
}

impl InMemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session_id: Uuid, turn: Turn) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id).or_default().push(turn);
    }

    async fn recent(&self, session_id: Uuid, limit: usize) -> Vec<Turn> {
        let sessions = self.sessions.read().await;
        match sessions.get(&session_id) {
            Some(turns) => {
                let start = turns.len().saturating_sub(limit);
                turns[start..].to_vec()
            }
            None => Vec::new(),
        }
    }
}
