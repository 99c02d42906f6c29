//! Session store: one `SessionMemory` per conversation, guarded by a lock
//! per session id so concurrent turns on different sessions never block
//! each other.

use std::collections::HashMap;
use std::sync::Arc;

use agentry_core::{AgentMessage, Role, SessionMemory, SessionSummary};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("unknown session: {0}")]
    UnknownSession(Uuid),
}

/// In-process session store. Each session is wrapped in its own lock so
/// a long-running turn on one session doesn't stall reads on another.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<RwLock<SessionMemory>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore { sessions: RwLock::new(HashMap::new()) }
    }

    pub async fn create(&self, user_id: impl Into<String>, role: Role) -> SessionMemory {
        let memory = SessionMemory::new(user_id.into(), role);
        let id = memory.session_id;
        self.sessions.write().await.insert(id, Arc::new(RwLock::new(memory.clone())));
        memory
    }

    /// Returns the existing session for `id` if present, otherwise creates
    /// one. Used by the chat endpoint, where a session id is optional on
    /// the first turn.
    pub async fn get_or_create(
        &self,
        id: Option<Uuid>,
        user_id: impl Into<String>,
        role: Role,
    ) -> SessionMemory {
        if let Some(id) = id {
            if let Some(existing) = self.get(id).await {
                return existing;
            }
        }
        self.create(user_id, role).await
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionMemory> {
        let sessions = self.sessions.read().await;
        let slot = sessions.get(&id)?;
        Some(slot.read().await.clone())
    }

    /// Appends a message. The session's history is append-only: nothing
    /// already pushed is ever rewritten or removed by this call.
    pub async fn push(&self, id: Uuid, message: AgentMessage) -> Result<(), MemoryError> {
        let sessions = self.sessions.read().await;
        let slot = sessions.get(&id).ok_or(MemoryError::UnknownSession(id))?;
        slot.write().await.push(message);
        Ok(())
    }

    pub async fn set_variable(
        &self,
        id: Uuid,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), MemoryError> {
        let sessions = self.sessions.read().await;
        let slot = sessions.get(&id).ok_or(MemoryError::UnknownSession(id))?;
        let mut memory = slot.write().await;
        memory.variables.insert(key.into(), value);
        memory.touch();
        Ok(())
    }

    pub async fn clear(&self, id: Uuid) -> Result<(), MemoryError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(MemoryError::UnknownSession(id))
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries = Vec::with_capacity(sessions.len());
        for slot in sessions.values() {
            let memory = slot.read().await;
            summaries.push(SessionSummary {
                session_id: memory.session_id,
                message_count: memory.messages.len(),
                tool_call_count: memory.tool_call_count(),
                last_activity: memory.last_activity(),
            });
        }
        summaries
    }
}
