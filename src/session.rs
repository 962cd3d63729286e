//! Session history storage
//!
//! Append-only turn log keyed by an opaque session id.
//! Entries are created lazily on first append and live for the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Role of a turn in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A single turn in a session's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text)
    }

    fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            text: text.into(),
        }
    }
}

/// In-memory session store. Passed explicitly into the orchestrator;
/// not a process global.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Turn>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Append a turn to a session, creating the session if needed.
    pub async fn append(&self, session_id: &str, turn: Turn) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_default().push(turn);
    }

    /// Ordered history for a session; empty for an unknown session.
    pub async fn history(&self, session_id: &str) -> Vec<Turn> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned().unwrap_or_default()
    }

    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_created_lazily() {
        let store = SessionStore::new();
        assert!(store.history("s1").await.is_empty());
        assert_eq!(store.session_count().await, 0);

        store.append("s1", Turn::user("oi")).await;
        assert_eq!(store.session_count().await, 1);
        assert_eq!(store.history("s1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_history_preserves_append_order() {
        let store = SessionStore::new();
        store.append("s1", Turn::user("primeira")).await;
        store.append("s1", Turn::assistant("resposta")).await;
        store.append("s1", Turn::user("segunda")).await;

        let history = store.history("s1").await;
        let texts: Vec<_> = history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["primeira", "resposta", "segunda"]);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        store.append("a", Turn::user("gasto de mercado")).await;
        store.append("b", Turn::user("reunião amanhã")).await;

        assert_eq!(store.history("a").await.len(), 1);
        assert_eq!(store.history("b").await.len(), 1);
        assert_eq!(store.history("a").await[0].text, "gasto de mercado");
    }
}
