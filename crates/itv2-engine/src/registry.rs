//! Session registry (component C7): a concurrent map of active sessions
//! plus connect/disconnect lifecycle notifications.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::warn;

use crate::error::EngineError;
use crate::session::SessionHandle;

#[derive(Debug, Clone)]
pub enum SessionLifecycleEvent {
    Connected { session_id: String },
    Disconnected { session_id: String },
}

/// Concurrent map `sessionId -> SessionHandle` (§4.7). Registration happens
/// once a session's handshake completes; deregistration on shutdown.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    events: broadcast::Sender<SessionLifecycleEvent>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            sessions: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionLifecycleEvent> {
        self.events.subscribe()
    }

    /// Register a newly handshaken session. Duplicate ids are rejected and
    /// logged rather than overwriting the live handle.
    pub async fn register(&self, handle: SessionHandle) -> Result<(), EngineError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&handle.id) {
            warn!(session = %handle.id, "duplicate session registration rejected");
            return Err(EngineError::SessionNotFound(handle.id));
        }
        let id = handle.id.clone();
        sessions.insert(id.clone(), handle);
        drop(sessions);
        let _ = self.events.send(SessionLifecycleEvent::Connected { session_id: id });
        Ok(())
    }

    pub async fn deregister(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
        let _ = self.events.send(SessionLifecycleEvent::Disconnected {
            session_id: session_id.to_owned(),
        });
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, EngineError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_owned()))
    }

    pub async fn list_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    // SessionHandle is only constructible via Session::accept, so
    // register/duplicate-register/deregister are covered by the
    // end-to-end tests in session.rs; this module checks the lookup path
    // that doesn't need a live session.

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let registry = SessionRegistry::new();
        let err = registry.get("no-such-session").await.unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn list_ids_starts_empty() {
        let registry = SessionRegistry::new();
        assert!(registry.list_ids().await.is_empty());
    }
}
