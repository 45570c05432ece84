use std::sync::Arc;

use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    error::{FlowError, Result},
    storage::{Session, SessionStatus},
    task::{NextAction, Task},
};

/// An ordered, strictly sequential list of tasks.
///
/// There is no branching: each task hands over to the one registered after it
/// unless it ends the run or fails. A failed task stops the run and no later
/// task is started.
pub struct Pipeline<S: Send> {
    pub id: String,
    tasks: Vec<Arc<dyn Task<S>>>,
}

impl<S: Send> Pipeline<S> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: Vec::new(),
        }
    }

    /// Append a task to the end of the pipeline
    pub fn add_task(&mut self, task: Arc<dyn Task<S>>) -> &mut Self {
        self.tasks.push(task);
        self
    }

    /// Id of the first task, where new sessions start
    pub fn start_task_id(&self) -> Option<&str> {
        self.tasks.first().map(|task| task.id())
    }

    /// Task ids in execution order
    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.id()).collect()
    }

    /// Get a task by ID
    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task<S>>> {
        self.tasks
            .iter()
            .find(|task| task.id() == task_id)
            .cloned()
    }

    fn position(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id() == task_id)
    }

    /// Run the session from its current task to the end of the pipeline.
    ///
    /// Sessions that already completed or failed are returned as they are;
    /// nothing is re-run.
    pub async fn execute_session(&self, session: &mut Session<S>) -> Result<ExecutionResult> {
        match &session.status {
            SessionStatus::Completed => {
                return Ok(ExecutionResult {
                    response: None,
                    status: ExecutionStatus::Completed,
                });
            }
            SessionStatus::Failed { task_id, reason } => {
                return Ok(ExecutionResult {
                    response: None,
                    status: ExecutionStatus::Failed {
                        task_id: task_id.clone(),
                        reason: reason.clone(),
                    },
                });
            }
            SessionStatus::Pending => {}
        }

        if self.tasks.is_empty() {
            return Err(FlowError::EmptyPipeline);
        }

        let mut index = self
            .position(&session.current_task_id)
            .ok_or_else(|| FlowError::TaskNotFound(session.current_task_id.clone()))?;

        loop {
            let task = Arc::clone(&self.tasks[index]);
            let task_id = task.id().to_string();
            session.current_task_id = task_id.clone();

            debug!(session_id = %session.id, task_id = %task_id, "running task");

            // Everything a task logs carries the session and task it ran for.
            let span = info_span!("task", session_id = %session.id, task_id = %task_id);
            let result = match task.run(&mut session.state).instrument(span).await {
                Ok(result) => result,
                Err(e) => {
                    let reason = e.to_string();
                    warn!(
                        session_id = %session.id,
                        task_id = %task_id,
                        error = %reason,
                        "task failed, halting pipeline"
                    );
                    session.status = SessionStatus::Failed {
                        task_id: task_id.clone(),
                        reason: reason.clone(),
                    };
                    session.status_message = Some(format!("{} failed", task_id));
                    return Ok(ExecutionResult {
                        response: None,
                        status: ExecutionStatus::Failed { task_id, reason },
                    });
                }
            };

            if result.status_message.is_some() {
                session.status_message = result.status_message.clone();
            }

            let has_next = index + 1 < self.tasks.len();
            match result.next_action {
                NextAction::Continue if has_next => index += 1,
                _ => {
                    info!(session_id = %session.id, pipeline = %self.id, "pipeline completed");
                    session.status = SessionStatus::Completed;
                    return Ok(ExecutionResult {
                        response: result.response,
                        status: ExecutionStatus::Completed,
                    });
                }
            }
        }
    }
}

/// Builder for creating pipelines
pub struct PipelineBuilder<S: Send> {
    pipeline: Pipeline<S>,
}

impl<S: Send> PipelineBuilder<S> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            pipeline: Pipeline::new(id),
        }
    }

    pub fn add_task(mut self, task: Arc<dyn Task<S>>) -> Self {
        self.pipeline.add_task(task);
        self
    }

    pub fn build(self) -> Pipeline<S> {
        self.pipeline
    }
}

/// Status of a pipeline execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    /// Every task ran, or a task ended the run early
    Completed,
    /// A task failed; the run stopped there
    Failed { task_id: String, reason: String },
}
