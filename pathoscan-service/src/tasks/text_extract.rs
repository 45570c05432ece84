use async_trait::async_trait;
use stage_flow::{FlowError, NextAction, Result, Task, TaskResult};
use tracing::{info, warn};

use crate::extract::extract_text_from_pdf;
use crate::models::{AnalysisSession, Stage};

pub const NO_TEXT_FOUND: &str =
    "No text found in the PDF file. Please check the file and try again.";

/// Turns the uploaded document into report text.
///
/// Text already present on the session (a plain-text report) is used as is.
pub struct TextExtractTask;

#[async_trait]
impl Task<AnalysisSession> for TextExtractTask {
    fn id(&self) -> &str {
        Stage::TextExtract.as_str()
    }

    async fn run(&self, state: &mut AnalysisSession) -> Result<TaskResult> {
        info!(task_id = %self.id(), stage = Stage::TextExtract.number(), "extracting report text");

        let text = match state.report_text.take() {
            Some(text) => text,
            None => extract_text_from_pdf(&state.document_path)
                .await
                .map_err(|e| FlowError::TaskExecutionFailed(e.to_string()))?,
        };

        if text.trim().is_empty() {
            warn!(path = %state.document_path.display(), "document has no extractable text");
            return Err(FlowError::TaskExecutionFailed(NO_TEXT_FOUND.to_string()));
        }

        info!(characters = text.len(), "report text ready");
        state.report_text = Some(text);

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("PDF text extracted".to_string()),
        ))
    }
}
