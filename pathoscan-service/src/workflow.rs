use stage_flow::{
    FlowRunner, InMemorySessionStorage, Pipeline, PipelineBuilder, Session, SessionStorage,
};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Stage3Policy;
use crate::llm::CompletionBackend;
use crate::models::{AnalysisSession, Stage};
use crate::tasks::*;

/// Extract → blood test analysis → health issues → lifestyle advice
pub fn build_analysis_pipeline(
    backend: Arc<dyn CompletionBackend>,
    policy: Stage3Policy,
) -> Pipeline<AnalysisSession> {
    PipelineBuilder::new("blood_test_analysis")
        .add_task(Arc::new(TextExtractTask))
        .add_task(Arc::new(BloodTestAnalysisTask::new(backend.clone())))
        .add_task(Arc::new(HealthIssueTask::new(backend.clone())))
        .add_task(Arc::new(LifestyleAdviceTask::new(backend, policy)))
        .build()
}

pub fn create_analysis_session(
    session_id: Option<String>,
    state: AnalysisSession,
) -> Session<AnalysisSession> {
    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    Session::new_from_task(session_id, Stage::TextExtract.as_str(), state)
}

/// Session-scoped upload location, so concurrent uploads never share a file
pub fn upload_path(upload_dir: &std::path::Path, session_id: &str) -> PathBuf {
    upload_dir.join(format!("pathoscan-{}.pdf", session_id))
}

pub fn create_session_storage() -> Arc<dyn SessionStorage<AnalysisSession>> {
    Arc::new(InMemorySessionStorage::<AnalysisSession>::new())
}

pub fn create_flow_runner(
    backend: Arc<dyn CompletionBackend>,
    policy: Stage3Policy,
    session_storage: Arc<dyn SessionStorage<AnalysisSession>>,
) -> FlowRunner<AnalysisSession> {
    let pipeline = Arc::new(build_analysis_pipeline(backend, policy));
    FlowRunner::new(pipeline, session_storage)
}
