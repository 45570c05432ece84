mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use common::ScriptedBackend;
use pathoscan_service::{
    AnalysisSession, AppState, BloodTestAnalysis, HealthIssues, ServiceConfig, Stage3Result,
    build_router, create_analysis_session,
};
use serde_json::{Value, json};
use stage_flow::SessionStatus;
use std::sync::Arc;
use tower::ServiceExt;

fn test_state(backend: Arc<ScriptedBackend>, upload_dir: &std::path::Path) -> AppState {
    let upload_dir = upload_dir.to_string_lossy().to_string();
    let config = ServiceConfig::from_lookup(|key| match key {
        "OPENROUTER_API_KEY" => Some("test-key".to_string()),
        "UPLOAD_DIR" => Some(upload_dir.clone()),
        _ => None,
    })
    .unwrap();
    AppState::new(&config, backend)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn question(session_id: &str, text: &str) -> Request<Body> {
    Request::post(format!("/analysis/{}/questions", session_id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "question": text }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(Arc::new(ScriptedBackend::default()), dir.path()));

    let (status, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let app = build_router(test_state(backend.clone(), dir.path()));

    let (status, body) = send(
        app,
        Request::post("/analysis")
            .body(Body::from("hello, not a pdf"))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Upload must be a PDF document");
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn unreadable_pdf_fails_at_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(&["unused"]));
    let state = test_state(backend.clone(), dir.path());
    let app = build_router(state.clone());

    let (status, body) = send(
        app,
        Request::post("/analysis")
            .body(Body::from("%PDF-1.4\nbroken"))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_status"], "failed-at-stage-0");
    assert_eq!(body["failure"]["stage"], "text_extract");
    assert_eq!(body["ready_for_questions"], false);
    assert_eq!(backend.call_count(), 0);

    // The upload does not outlive the run
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 0);

    let session_id = body["session_id"].as_str().unwrap().to_string();
    let (status, body) = send(build_router(state), question(&session_id, "Am I ok?")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"],
        "Please run the full analysis before asking questions."
    );
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(Arc::new(ScriptedBackend::default()), dir.path()));

    let (status, body) = send(
        app,
        Request::get("/analysis/does-not-exist")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["session_id"], "does-not-exist");
}

async fn seed_completed_session(state: &AppState, dir: &std::path::Path, id: &str) {
    let mut analysis = AnalysisSession::new(dir.join("report.pdf"));
    analysis.report_text = Some("Glucose 130 mg/dL".to_string());
    analysis.blood_test = Some(BloodTestAnalysis::default());
    analysis.health_issues = Some(HealthIssues {
        potential_health_issues: vec!["Prediabetes".to_string()],
    });
    analysis.lifestyle = Some(Stage3Result::Items(vec!["Cut added sugar".to_string()]));
    let mut session = create_analysis_session(Some(id.to_string()), analysis);
    session.status = SessionStatus::Completed;
    state.session_storage.save(session).await.unwrap();
}

#[tokio::test]
async fn questions_on_completed_session_build_history() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(&["First answer.", "Second answer."]));
    let state = test_state(backend.clone(), dir.path());
    seed_completed_session(&state, dir.path(), "done").await;

    let (status, body) = send(build_router(state.clone()), question("done", "Is it bad?")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "First answer.");

    let (status, body) = send(build_router(state.clone()), question("done", "What next?")).await;
    assert_eq!(status, StatusCode::OK);
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0]["message"], "What next?");
    assert_eq!(history[1]["message"], "Second answer.");
    assert_eq!(history[1]["speaker"], "assistant");

    let (status, _) = send(build_router(state.clone()), question("done", "  ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        build_router(state),
        Request::get("/analysis/done").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_status"], "completed");
    assert_eq!(body["history"].as_array().unwrap().len(), 4);
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn concurrent_questions_keep_every_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(
        ScriptedBackend::new(&["Answer one.", "Answer two."])
            .with_delay(std::time::Duration::from_millis(50)),
    );
    let state = test_state(backend.clone(), dir.path());
    seed_completed_session(&state, dir.path(), "busy").await;

    let (first, second) = tokio::join!(
        send(build_router(state.clone()), question("busy", "Is it bad?")),
        send(build_router(state.clone()), question("busy", "What next?")),
    );
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);

    let session = state.session_storage.get("busy").await.unwrap().unwrap();
    let history = &session.state.history;
    assert_eq!(history.len(), 4);
    let questions: Vec<&str> = history
        .turns()
        .iter()
        .step_by(2)
        .map(|turn| turn.message.as_str())
        .collect();
    assert!(questions.contains(&"Is it bad?"));
    assert!(questions.contains(&"What next?"));
    assert_eq!(backend.call_count(), 2);
}
