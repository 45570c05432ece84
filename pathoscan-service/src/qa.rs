use thiserror::Error;
use tracing::info;

use crate::llm::{BackendError, CompletionBackend, invoke};
use crate::models::AnalysisSession;
use crate::prompts::question_prompt;

#[derive(Error, Debug, PartialEq)]
pub enum QaError {
    #[error("Please run the full analysis before asking questions.")]
    PipelineIncomplete,

    #[error("Question cannot be empty")]
    EmptyQuestion,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Answer a free-text question using everything the pipeline produced.
///
/// Makes no remote call unless the report text and all three stage results are present.
/// On success the exchange is appended to the session's conversation history.
pub async fn answer_question(
    backend: &dyn CompletionBackend,
    session: &mut AnalysisSession,
    question: &str,
) -> Result<String, QaError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(QaError::EmptyQuestion);
    }

    let (Some(report_text), Some(blood_test), Some(health_issues), Some(lifestyle)) = (
        session.report_text.as_deref(),
        session.blood_test.as_ref(),
        session.health_issues.as_ref(),
        session.lifestyle.as_ref(),
    ) else {
        return Err(QaError::PipelineIncomplete);
    };

    let prompt = question_prompt(
        report_text,
        blood_test,
        health_issues,
        lifestyle,
        &session.history,
        question,
    );
    let answer = invoke(backend, "question", &prompt).await?.trim().to_string();

    info!(answer_chars = answer.len(), "question answered");
    session.history.record_exchange(question, answer.clone());
    Ok(answer)
}
