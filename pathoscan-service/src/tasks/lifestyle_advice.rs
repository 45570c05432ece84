use async_trait::async_trait;
use stage_flow::{FlowError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Stage3Policy;
use crate::llm::{CompletionBackend, invoke};
use crate::models::{AnalysisSession, LifestyleAdvice, Stage, Stage3Result};
use crate::normalizer::{Normalized, Normalizer};
use crate::prompts::lifestyle_advice_prompt;

/// Stage 3: lifestyle advice and recommended tests. Last stage of the run.
pub struct LifestyleAdviceTask {
    backend: Arc<dyn CompletionBackend>,
    normalizer: Normalizer,
    policy: Stage3Policy,
}

impl LifestyleAdviceTask {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: Stage3Policy) -> Self {
        Self {
            backend,
            normalizer: Normalizer::for_stage(Stage::LifestyleAdvice),
            policy,
        }
    }

    fn interpret(&self, normalized: Normalized) -> Result<Stage3Result> {
        match (normalized, self.policy) {
            (Normalized::Json(value), _) => Ok(LifestyleAdvice::from_value(&value)
                .map(Stage3Result::Structured)
                .unwrap_or_else(|| Stage3Result::Unstructured(value.to_string()))),
            (Normalized::Items(items), _) => Ok(Stage3Result::Items(items)),
            (Normalized::Raw(text), Stage3Policy::Lenient) => {
                warn!(task_id = %self.id(), "no structure found, keeping plain text");
                Ok(Stage3Result::Unstructured(text))
            }
            (Normalized::Empty, Stage3Policy::Lenient) => {
                warn!(task_id = %self.id(), "empty response, keeping empty advice");
                Ok(Stage3Result::Unstructured(String::new()))
            }
            (Normalized::Raw(_), Stage3Policy::Strict) => Err(FlowError::TaskExecutionFailed(
                "Lifestyle advice response could not be parsed".to_string(),
            )),
            (Normalized::Empty, Stage3Policy::Strict) => Err(FlowError::TaskExecutionFailed(
                "Empty response from LLM".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Task<AnalysisSession> for LifestyleAdviceTask {
    fn id(&self) -> &str {
        Stage::LifestyleAdvice.as_str()
    }

    async fn run(&self, state: &mut AnalysisSession) -> Result<TaskResult> {
        info!(task_id = %self.id(), stage = Stage::LifestyleAdvice.number(), "preparing lifestyle advice");

        let issues = state.health_issues.as_ref().ok_or_else(|| {
            FlowError::MissingPrerequisite("potential health issues not found".to_string())
        })?;

        let prompt = lifestyle_advice_prompt(&issues.potential_health_issues);
        let raw = invoke(self.backend.as_ref(), self.id(), &prompt)
            .await
            .map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?;

        let advice = self.interpret(self.normalizer.normalize(&raw))?;
        let status = if advice.is_degraded() {
            "Lifestyle advice ready (unstructured response)"
        } else {
            "Lifestyle advice ready"
        };
        info!(task_id = %self.id(), degraded = advice.is_degraded(), "lifestyle advice completed");

        let rendered = advice.render_markdown();
        state.lifestyle = Some(advice);

        Ok(TaskResult::new_with_status(
            Some(rendered),
            NextAction::End,
            Some(status.to_string()),
        ))
    }
}
