use async_trait::async_trait;
use stage_flow::{FlowError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, warn};

use crate::llm::{CompletionBackend, invoke};
use crate::models::{AnalysisSession, HealthIssues, Stage};
use crate::normalizer::{Normalized, Normalizer};
use crate::prompts::health_issue_prompt;

/// Stage 2: map abnormal values to potential health issues
pub struct HealthIssueTask {
    backend: Arc<dyn CompletionBackend>,
    normalizer: Normalizer,
}

impl HealthIssueTask {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            normalizer: Normalizer::for_stage(Stage::HealthIssueIdentification),
        }
    }
}

#[async_trait]
impl Task<AnalysisSession> for HealthIssueTask {
    fn id(&self) -> &str {
        Stage::HealthIssueIdentification.as_str()
    }

    async fn run(&self, state: &mut AnalysisSession) -> Result<TaskResult> {
        info!(
            task_id = %self.id(),
            stage = Stage::HealthIssueIdentification.number(),
            "identifying health issues"
        );

        let analysis = state.blood_test.as_ref().ok_or_else(|| {
            FlowError::MissingPrerequisite("blood test analysis not found".to_string())
        })?;

        let prompt = health_issue_prompt(&analysis.abnormal_values);
        let raw = invoke(self.backend.as_ref(), self.id(), &prompt)
            .await
            .map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?;

        let issues = match self.normalizer.normalize(&raw) {
            Normalized::Json(value) => HealthIssues::from_value(&value),
            Normalized::Items(items) => Some(HealthIssues {
                potential_health_issues: items,
            }),
            other => {
                warn!(task_id = %self.id(), shape = other.kind(), "response is missing potential_health_issues");
                None
            }
        }
        .ok_or_else(|| {
            FlowError::TaskExecutionFailed(
                "Health issue response has no potential_health_issues field".to_string(),
            )
        })?;

        info!(
            task_id = %self.id(),
            issues = issues.potential_health_issues.len(),
            "health issues identified"
        );
        state.health_issues = Some(issues);

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("Potential health issues identified".to_string()),
        ))
    }
}
