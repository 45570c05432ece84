use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of a task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Response to hand back to the caller
    pub response: Option<String>,
    /// Next action to take
    pub next_action: NextAction,
    /// Human readable progress note stored on the session
    pub status_message: Option<String>,
}

impl TaskResult {
    pub fn new(response: Option<String>, next_action: NextAction) -> Self {
        Self {
            response,
            next_action,
            status_message: None,
        }
    }

    pub fn new_with_status(
        response: Option<String>,
        next_action: NextAction,
        status_message: Option<String>,
    ) -> Self {
        Self {
            response,
            next_action,
            status_message,
        }
    }
}

/// Defines what should happen after a task completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    /// Run the next task in pipeline order
    Continue,
    /// Stop here and mark the run completed
    End,
}

/// Core trait that every pipeline step implements.
///
/// `S` is the typed session state the pipeline threads through its tasks.
#[async_trait]
pub trait Task<S: Send>: Send + Sync {
    /// Unique identifier for this task
    fn id(&self) -> &str;

    /// Execute the task against the session state
    async fn run(&self, state: &mut S) -> Result<TaskResult>;
}
