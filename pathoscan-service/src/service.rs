use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use dashmap::DashMap;
use serde_json::{Value, json};
use stage_flow::{ExecutionStatus, FlowRunner, SessionStorage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    llm::{CompletionBackend, OpenRouterBackend},
    models::{AnalysisSession, QuestionRequest, QuestionResponse, SessionResponse},
    qa::{QaError, answer_question},
    workflow::{create_analysis_session, create_flow_runner, create_session_storage, upload_path},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage<AnalysisSession>>,
    pub flow_runner: FlowRunner<AnalysisSession>,
    pub backend: Arc<dyn CompletionBackend>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Questions on one session are answered one at a time so no exchange is lost.
    question_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(config: &ServiceConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        let session_storage = create_session_storage();
        let flow_runner = create_flow_runner(
            backend.clone(),
            config.stage3_policy,
            session_storage.clone(),
        );
        Self {
            session_storage,
            flow_runner,
            backend,
            upload_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
            question_locks: Arc::new(DashMap::new()),
        }
    }
}

pub fn create_app(config: &ServiceConfig) -> Router {
    let backend = Arc::new(OpenRouterBackend::from_config(config));
    info!(model = %backend.model(), "using OpenRouter backend");
    build_router(AppState::new(config, backend))
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/analysis", post(start_analysis))
        .route("/analysis/{session_id}", get(get_session_status))
        .route("/analysis/{session_id}/questions", post(ask_question))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "PathoScan Blood Test Analysis Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Three-stage blood test report analysis with follow-up questions",
        "endpoints": {
            "POST /analysis": "Upload a PDF report (raw body) and run the analysis",
            "GET /analysis/{session_id}": "Get run status and stage results",
            "POST /analysis/{session_id}/questions": "Ask a question about a completed analysis",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn validate_upload(body: &[u8]) -> Result<(), ApiError> {
    if body.is_empty() {
        return Err(bad_request_error("PDF upload is required"));
    }
    if !body.starts_with(b"%PDF") {
        return Err(bad_request_error("Upload must be a PDF document"));
    }
    Ok(())
}

async fn start_analysis(State(state): State<AppState>, body: Bytes) -> ApiResult<SessionResponse> {
    validate_upload(&body)?;

    let session_id = Uuid::new_v4().to_string();
    let pdf_path = upload_path(&state.upload_dir, &session_id);
    info!(session_id = %session_id, bytes = body.len(), "starting blood test analysis");

    persist_upload(&state, &pdf_path, &body).await?;

    let session = create_analysis_session(
        Some(session_id.clone()),
        AnalysisSession::new(pdf_path.clone()),
    );
    state.session_storage.save(session).await.map_err(|e| {
        error!("Failed to create session: {}", e);
        internal_error("Failed to create analysis session", &e.to_string())
    })?;

    let result = state.flow_runner.run(&session_id).await;

    if let Err(e) = tokio::fs::remove_file(&pdf_path).await {
        warn!(path = %pdf_path.display(), "Failed to remove upload: {}", e);
    }

    match result {
        Ok(result) => {
            match &result.status {
                ExecutionStatus::Completed => {
                    info!(session_id = %session_id, "analysis completed")
                }
                ExecutionStatus::Failed { task_id, reason } => {
                    warn!(session_id = %session_id, task_id = %task_id, "analysis halted: {}", reason)
                }
            }
            load_session_view(&state, &session_id).await
        }
        Err(e) => {
            error!("Failed to run workflow for session {}: {}", session_id, e);
            Err(internal_error("Failed to run analysis workflow", &e.to_string()))
        }
    }
}

async fn persist_upload(state: &AppState, path: &std::path::Path, body: &[u8]) -> Result<(), ApiError> {
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| internal_error("Failed to prepare upload directory", &e.to_string()))?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| internal_error("Failed to store upload", &e.to_string()))
}

async fn load_session_view(state: &AppState, session_id: &str) -> ApiResult<SessionResponse> {
    match state.session_storage.get(session_id).await {
        Ok(Some(session)) => Ok(Json(SessionResponse::from_session(&session))),
        Ok(None) => Err(not_found_error("Session not found", session_id)),
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            Err(internal_error("Failed to load session", &e.to_string()))
        }
    }
}

async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    info!("Getting status for session: {}", session_id);
    load_session_view(&state, &session_id).await
}

fn qa_error(e: &QaError) -> ApiError {
    let status = match e {
        QaError::PipelineIncomplete => StatusCode::CONFLICT,
        QaError::EmptyQuestion => StatusCode::BAD_REQUEST,
        QaError::Backend(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(json!({
            "error": e.to_string(),
        })),
    )
}

async fn ask_question(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<QuestionRequest>,
) -> ApiResult<QuestionResponse> {
    let lock = state
        .question_locks
        .entry(session_id.clone())
        .or_default()
        .clone();
    let _guard = lock.lock().await;

    let mut session = match state.session_storage.get(&session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return Err(not_found_error("Session not found", &session_id)),
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            return Err(internal_error("Failed to load session", &e.to_string()));
        }
    };

    let answer = answer_question(state.backend.as_ref(), &mut session.state, &request.question)
        .await
        .map_err(|e| {
            warn!(session_id = %session_id, "question rejected: {}", e);
            qa_error(&e)
        })?;

    let history = session
        .state
        .history
        .recent_first()
        .into_iter()
        .cloned()
        .collect();

    state.session_storage.save(session).await.map_err(|e| {
        error!("Failed to save session {}: {}", session_id, e);
        internal_error("Failed to save conversation", &e.to_string())
    })?;

    Ok(Json(QuestionResponse {
        session_id,
        answer,
        history,
    }))
}
