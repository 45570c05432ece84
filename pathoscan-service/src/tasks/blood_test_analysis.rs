use async_trait::async_trait;
use stage_flow::{FlowError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, warn};

use crate::llm::{CompletionBackend, invoke};
use crate::models::{AnalysisSession, BloodTestAnalysis, Stage};
use crate::normalizer::{Normalized, Normalizer};
use crate::prompts::blood_test_analysis_prompt;

/// Stage 1: summarize the report and list abnormal values
pub struct BloodTestAnalysisTask {
    backend: Arc<dyn CompletionBackend>,
    normalizer: Normalizer,
}

impl BloodTestAnalysisTask {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            normalizer: Normalizer::for_stage(Stage::BloodTestAnalysis),
        }
    }
}

#[async_trait]
impl Task<AnalysisSession> for BloodTestAnalysisTask {
    fn id(&self) -> &str {
        Stage::BloodTestAnalysis.as_str()
    }

    async fn run(&self, state: &mut AnalysisSession) -> Result<TaskResult> {
        info!(task_id = %self.id(), stage = Stage::BloodTestAnalysis.number(), "analyzing blood test");

        let report_text = state
            .report_text
            .as_deref()
            .ok_or_else(|| FlowError::MissingPrerequisite("report text not found".to_string()))?;

        let prompt = blood_test_analysis_prompt(report_text);
        let raw = invoke(self.backend.as_ref(), self.id(), &prompt)
            .await
            .map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?;

        let normalized = self.normalizer.normalize(&raw);
        let analysis = match &normalized {
            Normalized::Json(value) => BloodTestAnalysis::from_value(value),
            _ => None,
        }
        .ok_or_else(|| {
            warn!(task_id = %self.id(), shape = normalized.kind(), "response is missing abnormal_values");
            FlowError::TaskExecutionFailed(
                "Blood test analysis response has no abnormal_values field".to_string(),
            )
        })?;

        info!(
            task_id = %self.id(),
            abnormal_values = analysis.abnormal_values.len(),
            "blood test analysis completed"
        );
        state.blood_test = Some(analysis);

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("Blood test analyzed".to_string()),
        ))
    }
}
