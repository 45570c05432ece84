//! FlowRunner – convenience wrapper that loads a session, runs the pipeline on it, and
//! persists the updated session back to storage.
//!
//! Use [`Pipeline::execute_session`] directly when you already hold the session and want to
//! decide yourself when (or whether) to save it.

use std::sync::Arc;

use crate::{
    error::{FlowError, Result},
    pipeline::{ExecutionResult, Pipeline},
    storage::SessionStorage,
};

/// High-level helper that orchestrates the common _load → execute → save_ pattern.
pub struct FlowRunner<S: Send> {
    pipeline: Arc<Pipeline<S>>,
    storage: Arc<dyn SessionStorage<S>>,
}

impl<S: Send> Clone for FlowRunner<S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: Send> FlowRunner<S> {
    pub fn new(pipeline: Arc<Pipeline<S>>, storage: Arc<dyn SessionStorage<S>>) -> Self {
        Self { pipeline, storage }
    }

    pub fn pipeline(&self) -> &Pipeline<S> {
        &self.pipeline
    }

    /// Run the pipeline for `session_id` and persist the session, whatever the outcome.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

        let result = self.pipeline.execute_session(&mut session).await?;

        self.storage.save(session).await?;

        Ok(result)
    }
}
