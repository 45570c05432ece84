use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// Where a session's run currently stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Completed,
    Failed { task_id: String, reason: String },
}

/// A single pipeline run together with its typed state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session<S> {
    pub id: String,
    pub current_task_id: String,
    pub status: SessionStatus,
    pub status_message: Option<String>,
    pub state: S,
}

impl<S> Session<S> {
    pub fn new_from_task(sid: String, task_name: &str, state: S) -> Self {
        Self {
            id: sid,
            current_task_id: task_name.to_string(),
            status: SessionStatus::Pending,
            status_message: None,
            state,
        }
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage<S>: Send + Sync {
    async fn save(&self, session: Session<S>) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session<S>>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory implementation of SessionStorage. Sessions live as long as the process.
pub struct InMemorySessionStorage<S> {
    sessions: Arc<DashMap<String, Session<S>>>,
}

impl<S> InMemorySessionStorage<S> {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<S> Default for InMemorySessionStorage<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> SessionStorage<S> for InMemorySessionStorage<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn save(&self, session: Session<S>) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session<S>>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}
