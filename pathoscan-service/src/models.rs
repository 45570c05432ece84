use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use stage_flow::SessionStatus;
use std::fmt;
use std::path::PathBuf;

/// The fixed steps of an analysis run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TextExtract,
    BloodTestAnalysis,
    HealthIssueIdentification,
    LifestyleAdvice,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::TextExtract,
        Stage::BloodTestAnalysis,
        Stage::HealthIssueIdentification,
        Stage::LifestyleAdvice,
    ];

    /// Task id used by the pipeline
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TextExtract => "text_extract",
            Stage::BloodTestAnalysis => "blood_test_analysis",
            Stage::HealthIssueIdentification => "health_issue_identification",
            Stage::LifestyleAdvice => "lifestyle_advice",
        }
    }

    /// Extraction is stage 0, the three generation stages are 1..=3
    pub fn number(&self) -> u8 {
        match self {
            Stage::TextExtract => 0,
            Stage::BloodTestAnalysis => 1,
            Stage::HealthIssueIdentification => 2,
            Stage::LifestyleAdvice => 3,
        }
    }

    pub fn from_task_id(task_id: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.as_str() == task_id)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accept strings, numbers and booleans where the model was asked for a string.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Parse an array leniently, skipping items that fail to deserialize.
fn parse_array_lenient<T: for<'de> Deserialize<'de>>(items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect()
}

fn string_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbnormalValue {
    #[serde(default, deserialize_with = "lenient_string")]
    pub parameter: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reference_range: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub interpretation: String,
}

/// Stage 1 output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BloodTestAnalysis {
    pub summary: String,
    pub abnormal_values: Vec<AbnormalValue>,
}

impl BloodTestAnalysis {
    /// `None` when the object has no `abnormal_values` array.
    pub fn from_value(value: &Value) -> Option<Self> {
        let abnormal = value.get("abnormal_values")?.as_array()?;
        let summary = value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            summary,
            abnormal_values: parse_array_lenient(abnormal),
        })
    }
}

/// Stage 2 output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthIssues {
    pub potential_health_issues: Vec<String>,
}

impl HealthIssues {
    pub fn from_value(value: &Value) -> Option<Self> {
        let issues = value.get("potential_health_issues")?.as_array()?;
        Some(Self {
            potential_health_issues: string_items(issues),
        })
    }
}

/// Stage 3 output when the model honoured the requested schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifestyleAdvice {
    pub lifestyle_advice: Vec<String>,
    pub medical_tests_recommendations: Vec<String>,
}

impl LifestyleAdvice {
    /// Requires at least one of the two list fields.
    pub fn from_value(value: &Value) -> Option<Self> {
        let advice = value.get("lifestyle_advice").and_then(Value::as_array);
        let tests = value
            .get("medical_tests_recommendations")
            .and_then(Value::as_array);
        if advice.is_none() && tests.is_none() {
            return None;
        }
        Some(Self {
            lifestyle_advice: advice.map(|a| string_items(a)).unwrap_or_default(),
            medical_tests_recommendations: tests.map(|t| string_items(t)).unwrap_or_default(),
        })
    }
}

/// Stage 3 result. The service does not reliably follow the requested schema, so
/// consumers have to handle every shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum Stage3Result {
    Structured(LifestyleAdvice),
    Items(Vec<String>),
    Unstructured(String),
}

const PROVIDER_NOTE: &str = "_Always discuss these recommendations with your healthcare provider, who can tailor advice and interpret test results in your specific context._";

impl Stage3Result {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, Stage3Result::Structured(_))
    }

    /// Markdown rendering used by the CLI and the session view
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        match self {
            Stage3Result::Structured(advice) => {
                out.push_str("### Lifestyle Advice\n");
                for item in &advice.lifestyle_advice {
                    out.push_str(&format!("- {}\n", item));
                }
                out.push_str("\n### Recommended Tests\n");
                for item in &advice.medical_tests_recommendations {
                    out.push_str(&format!("- {}\n", item));
                }
            }
            Stage3Result::Items(items) => {
                out.push_str("### Lifestyle Advice\n");
                for item in items {
                    out.push_str(&format!("- {}\n", item));
                }
            }
            Stage3Result::Unstructured(text) => {
                out.push_str("### Lifestyle Advice\n");
                out.push_str(
                    "_No structured lifestyle advice found, but here is the full text response:_\n",
                );
                out.push_str(&format!("```\n{}\n```\n", text));
            }
        }
        out.push_str("\n---\n");
        out.push_str(PROVIDER_NOTE);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Append-only question/answer log for one session. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: Speaker, message: impl Into<String>) {
        self.turns.push(ConversationTurn {
            speaker,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn record_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.push(Speaker::User, question);
        self.push(Speaker::Assistant, answer);
    }

    /// Turns in the order they happened
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Newest exchange first; inside an exchange the question stays before its answer.
    pub fn recent_first(&self) -> Vec<&ConversationTurn> {
        self.turns.chunks(2).rev().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Typed state threaded through the analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub document_path: PathBuf,
    pub uploaded_at: DateTime<Utc>,
    pub report_text: Option<String>,
    pub blood_test: Option<BloodTestAnalysis>,
    pub health_issues: Option<HealthIssues>,
    pub lifestyle: Option<Stage3Result>,
    #[serde(skip)]
    pub history: ConversationHistory,
}

impl AnalysisSession {
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        Self {
            document_path: document_path.into(),
            uploaded_at: Utc::now(),
            report_text: None,
            blood_test: None,
            health_issues: None,
            lifestyle: None,
            history: ConversationHistory::new(),
        }
    }

    /// Q&A needs the report text and all three stage results
    pub fn is_ready_for_questions(&self) -> bool {
        self.report_text.is_some()
            && self.blood_test.is_some()
            && self.health_issues.is_some()
            && self.lifestyle.is_some()
    }
}

/// Terminal state of a run as reported to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Completed,
    Failed { stage: Option<Stage>, reason: String },
}

impl RunStatus {
    pub fn from_session_status(status: &SessionStatus) -> Self {
        match status {
            SessionStatus::Pending => RunStatus::Pending,
            SessionStatus::Completed => RunStatus::Completed,
            SessionStatus::Failed { task_id, reason } => RunStatus::Failed {
                stage: Stage::from_task_id(task_id),
                reason: reason.clone(),
            },
        }
    }

    /// `pending`, `completed` or `failed-at-stage-N`
    pub fn label(&self) -> String {
        match self {
            RunStatus::Pending => "pending".to_string(),
            RunStatus::Completed => "completed".to_string(),
            RunStatus::Failed {
                stage: Some(stage), ..
            } => format!("failed-at-stage-{}", stage.number()),
            RunStatus::Failed { stage: None, .. } => "failed".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub session_id: String,
    pub answer: String,
    pub history: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Option<Stage>,
    pub stage_number: Option<u8>,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub run_status: String,
    pub current_task: String,
    pub status_message: Option<String>,
    pub failure: Option<StageFailure>,
    pub report_characters: Option<usize>,
    pub blood_test: Option<BloodTestAnalysis>,
    pub health_issues: Option<HealthIssues>,
    pub lifestyle: Option<Stage3Result>,
    pub lifestyle_markdown: Option<String>,
    pub ready_for_questions: bool,
    pub history: Vec<ConversationTurn>,
}

impl SessionResponse {
    pub fn from_session(session: &stage_flow::Session<AnalysisSession>) -> Self {
        let run_status = RunStatus::from_session_status(&session.status);
        let failure = match &run_status {
            RunStatus::Failed { stage, reason } => Some(StageFailure {
                stage: *stage,
                stage_number: stage.map(|s| s.number()),
                reason: reason.clone(),
            }),
            _ => None,
        };
        let state = &session.state;
        Self {
            session_id: session.id.clone(),
            run_status: run_status.label(),
            current_task: session.current_task_id.clone(),
            status_message: session.status_message.clone(),
            failure,
            report_characters: state.report_text.as_ref().map(|t| t.chars().count()),
            blood_test: state.blood_test.clone(),
            health_issues: state.health_issues.clone(),
            lifestyle: state.lifestyle.clone(),
            lifestyle_markdown: state.lifestyle.as_ref().map(Stage3Result::render_markdown),
            ready_for_questions: state.is_ready_for_questions(),
            history: state.history.recent_first().into_iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blood_test_requires_abnormal_values() {
        let missing = json!({ "summary": "all fine" });
        assert!(BloodTestAnalysis::from_value(&missing).is_none());

        let present = json!({
            "summary": "Low iron",
            "abnormal_values": [
                { "parameter": "Ferritin", "value": 8, "reference_range": "15-150", "interpretation": "Low stores" },
                "not an object"
            ]
        });
        let parsed = BloodTestAnalysis::from_value(&present).unwrap();
        assert_eq!(parsed.summary, "Low iron");
        assert_eq!(parsed.abnormal_values.len(), 1);
        assert_eq!(parsed.abnormal_values[0].value, "8");
    }

    #[test]
    fn lifestyle_advice_needs_one_known_field() {
        assert!(LifestyleAdvice::from_value(&json!({ "foo": [] })).is_none());
        let advice =
            LifestyleAdvice::from_value(&json!({ "lifestyle_advice": ["Walk daily", ""] })).unwrap();
        assert_eq!(advice.lifestyle_advice, vec!["Walk daily"]);
        assert!(advice.medical_tests_recommendations.is_empty());
    }

    #[test]
    fn history_is_shown_newest_exchange_first() {
        let mut history = ConversationHistory::new();
        history.record_exchange("q1", "a1");
        history.record_exchange("q2", "a2");

        let messages: Vec<&str> = history
            .recent_first()
            .into_iter()
            .map(|t| t.message.as_str())
            .collect();
        assert_eq!(messages, vec!["q2", "a2", "q1", "a1"]);
        assert_eq!(history.turns()[0].speaker, Speaker::User);
    }

    #[test]
    fn run_status_labels() {
        let failed = RunStatus::from_session_status(&SessionStatus::Failed {
            task_id: "blood_test_analysis".to_string(),
            reason: "missing abnormal_values".to_string(),
        });
        assert_eq!(failed.label(), "failed-at-stage-1");
        assert_eq!(
            RunStatus::from_session_status(&SessionStatus::Completed).label(),
            "completed"
        );
    }

    #[test]
    fn unstructured_advice_renders_as_preformatted_block() {
        let rendered = Stage3Result::Unstructured("just text".to_string()).render_markdown();
        assert!(rendered.contains("```\njust text\n```"));
        assert!(Stage3Result::Items(vec![]).is_degraded());
    }
}
