//! Fixed instruction templates for each stage and for follow-up questions.

use serde::Serialize;

use crate::models::{AbnormalValue, BloodTestAnalysis, ConversationHistory, HealthIssues, Speaker, Stage3Result};

pub const SAFETY_INSTRUCTION: &str = "You are a helpful medical assistant answering questions about a blood test report. \
Your answers are for general information only and are not a substitute for professional medical advice, \
diagnosis, or treatment. Always encourage the user to consult a qualified healthcare provider about their results.";

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// Stage 1: blood test analyst
pub fn blood_test_analysis_prompt(report_text: &str) -> String {
    format!(
        r#"You are a Blood Test Analyst. Analyze the following blood test report, identify abnormalities, and summarize findings.

Provide a structured JSON response with this format:

{{
  "summary": "Brief summary of the findings",
  "abnormal_values": [
    {{
      "parameter": "Parameter Name",
      "value": "Recorded Value",
      "reference_range": "Normal Range",
      "interpretation": "What the abnormal value indicates"
    }}
  ]
}}

Report: {report_text}
"#
    )
}

/// Stage 2: medical condition identifier
pub fn health_issue_prompt(abnormal_values: &[AbnormalValue]) -> String {
    let values = to_json(abnormal_values);
    format!(
        r#"You are a Medical Condition Identifier. Analyze these abnormal values and identify potential health issues.

Provide a structured JSON response with this format:

{{
  "potential_health_issues": [
    "Description of potential health issue 1",
    "Description of potential health issue 2"
  ]
}}

Abnormal Values: {values}
"#
    )
}

/// Stage 3: health advisor
pub fn lifestyle_advice_prompt(issues: &[String]) -> String {
    let issues = to_pretty_json(issues);
    format!(
        r#"You are a Health Advisor. Based on the following potential health issues, provide actionable lifestyle advice and recommended tests. Be specific and concise.

Potential Health Issues:
{issues}

Provide a structured JSON response with this format:

{{
  "lifestyle_advice": ["List of lifestyle changes."],
  "medical_tests_recommendations": ["List of recommended tests or consultations."]
}}
"#
    )
}

/// Follow-up question over everything the pipeline produced
pub fn question_prompt(
    report_text: &str,
    blood_test: &BloodTestAnalysis,
    health_issues: &HealthIssues,
    lifestyle: &Stage3Result,
    history: &ConversationHistory,
    question: &str,
) -> String {
    let mut conversation = String::new();
    for turn in history.turns() {
        let speaker = match turn.speaker {
            Speaker::User => "User",
            Speaker::Assistant => "Assistant",
        };
        conversation.push_str(&format!("{}: {}\n", speaker, turn.message));
    }
    if conversation.is_empty() {
        conversation.push_str("(none)\n");
    }

    format!(
        r#"{SAFETY_INSTRUCTION}

Blood Test Report:
{report_text}

Blood Test Analysis:
{analysis}

Potential Health Issues:
{issues}

Lifestyle Advice and Recommended Tests:
{advice}

Previous Conversation:
{conversation}
Question: {question}

Answer clearly and concisely using only the information above."#,
        analysis = to_pretty_json(blood_test),
        issues = to_pretty_json(health_issues),
        advice = to_pretty_json(lifestyle),
    )
}
