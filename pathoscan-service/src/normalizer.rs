//! Best-effort recovery of structure from free-form model output.
//!
//! The upstream model is asked for JSON but frequently answers with fenced JSON,
//! code-like list assignments, markdown bullets or prose. A [`Normalizer`] tries an
//! ordered list of [`ParseStrategy`] implementations and returns the first match,
//! falling back to the cleaned text itself. It never fails on malformed input.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::{BloodTestAnalysis, HealthIssues, LifestyleAdvice, Stage};

const BULLET_CHARS: &[char] = &[' ', '-', '*', '•', '\t'];

static QUOTED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(.*?)"|'(.*?)'"#).expect("Invalid regex"));

static EMBEDDED_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*\n([\s\S]*?)```").expect("Invalid regex"));

/// Outcome of normalizing one response
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// Strict JSON that passed the stage's schema check
    Json(Value),
    /// A list of strings salvaged from a list literal or bullet lines
    Items(Vec<String>),
    /// Nothing matched; the cleaned text, for display only
    Raw(String),
    /// The response was empty or whitespace only
    Empty,
}

impl Normalized {
    pub fn kind(&self) -> &'static str {
        match self {
            Normalized::Json(_) => "json",
            Normalized::Items(_) => "items",
            Normalized::Raw(_) => "raw",
            Normalized::Empty => "empty",
        }
    }
}

/// One step of the fallback chain. Returns `None` when the text does not fit.
pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, text: &str) -> Option<Normalized>;
}

/// Remove one fenced code block wrapping the whole text.
///
/// Applies when the first non-empty line opens a fence and the text ends with a
/// closing fence, either on its own line or glued to the last line of content.
/// Anything else is returned unchanged.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(first_break) = trimmed.find('\n') else {
        return text;
    };
    if !trimmed[..first_break].trim().starts_with("```") || !trimmed.ends_with("```") {
        return text;
    }

    // A bare closing line leaves only a newline behind; glued backticks leave the content intact.
    trimmed[first_break + 1..trimmed.len() - 3].trim_end()
}

pub type SchemaCheck = fn(&Value) -> bool;

/// Strict JSON, optionally validated against a stage schema.
///
/// Also looks inside a fenced block embedded in surrounding prose.
pub struct JsonStrategy {
    schema: Option<SchemaCheck>,
}

impl JsonStrategy {
    pub fn any() -> Self {
        Self { schema: None }
    }

    pub fn with_schema(schema: SchemaCheck) -> Self {
        Self {
            schema: Some(schema),
        }
    }

    fn accept(&self, value: Value) -> Option<Normalized> {
        match self.schema {
            Some(check) if !check(&value) => {
                debug!("JSON parsed but did not match the expected schema");
                None
            }
            _ => Some(Normalized::Json(value)),
        }
    }
}

impl ParseStrategy for JsonStrategy {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, text: &str) -> Option<Normalized> {
        if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
            return self.accept(value);
        }
        let block = EMBEDDED_FENCE.captures(text)?.get(1)?.as_str();
        let value = serde_json::from_str::<Value>(block.trim()).ok()?;
        self.accept(value)
    }
}

/// A code-style list assignment such as `lifestyle_advice = ["a", "b"]`.
pub struct ListLiteralStrategy {
    field: String,
    pattern: Regex,
}

impl ListLiteralStrategy {
    pub fn new(field: impl Into<String>) -> Self {
        let field = field.into();
        let pattern = Regex::new(&format!(
            r#"(?s){}["']?\s*[=:]\s*\[(.*?)\]"#,
            regex::escape(&field)
        ))
        .expect("escaped field name always forms a valid pattern");
        Self { field, pattern }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl ParseStrategy for ListLiteralStrategy {
    fn name(&self) -> &'static str {
        "list_literal"
    }

    fn parse(&self, text: &str) -> Option<Normalized> {
        let inner = self.pattern.captures(text)?.get(1)?.as_str();
        let items = QUOTED_ITEM
            .captures_iter(inner)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        Some(Normalized::Items(items))
    }
}

/// Markdown or plain bullets, one item per non-empty line.
pub struct BulletLineStrategy;

impl BulletLineStrategy {
    fn clean_line(line: &str) -> String {
        let stripped = line.trim_matches(BULLET_CHARS);
        let stripped = stripped
            .strip_suffix("**:")
            .or_else(|| stripped.strip_suffix(":**"))
            .or_else(|| stripped.strip_suffix(':'))
            .unwrap_or(stripped);
        stripped.trim().to_string()
    }
}

impl ParseStrategy for BulletLineStrategy {
    fn name(&self) -> &'static str {
        "bullet_lines"
    }

    fn parse(&self, text: &str) -> Option<Normalized> {
        let has_bullets = text.lines().any(|line| {
            line.trim_start()
                .starts_with(|c: char| matches!(c, '-' | '*' | '•'))
        });
        if !has_bullets {
            return None;
        }
        let items: Vec<String> = text
            .lines()
            .map(Self::clean_line)
            .filter(|line| !line.is_empty())
            .collect();
        if items.is_empty() {
            None
        } else {
            Some(Normalized::Items(items))
        }
    }
}

/// Ordered chain of strategies with a raw-text fallback
pub struct Normalizer {
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
            .with_strategy(JsonStrategy::any())
            .with_strategy(BulletLineStrategy)
    }
}

impl Normalizer {
    /// An empty chain: every non-empty response comes back as `Raw`.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: impl ParseStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// The chain used for each generation stage
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::TextExtract => Self::new(),
            Stage::BloodTestAnalysis => Self::new().with_strategy(JsonStrategy::with_schema(
                |v| BloodTestAnalysis::from_value(v).is_some(),
            )),
            Stage::HealthIssueIdentification => Self::new()
                .with_strategy(JsonStrategy::with_schema(|v| {
                    HealthIssues::from_value(v).is_some()
                }))
                .with_strategy(ListLiteralStrategy::new("potential_health_issues"))
                .with_strategy(BulletLineStrategy),
            Stage::LifestyleAdvice => Self::new()
                .with_strategy(JsonStrategy::with_schema(|v| {
                    LifestyleAdvice::from_value(v).is_some()
                }))
                .with_strategy(ListLiteralStrategy::new("lifestyle_advice"))
                .with_strategy(BulletLineStrategy),
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn normalize(&self, raw: &str) -> Normalized {
        let cleaned = strip_code_fence(raw).trim();
        if cleaned.is_empty() {
            return Normalized::Empty;
        }
        for strategy in &self.strategies {
            if let Some(result) = strategy.parse(cleaned) {
                debug!(strategy = strategy.name(), "response normalized");
                return result;
            }
        }
        debug!("no strategy matched, keeping raw text");
        Normalized::Raw(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_json_matches_plain_json() {
        let normalizer = Normalizer::default();
        let fenced = normalizer.normalize("```json\n{\"a\":1}\n```");
        let plain = normalizer.normalize("{\"a\":1}");
        assert_eq!(fenced, Normalized::Json(json!({ "a": 1 })));
        assert_eq!(fenced, plain);
    }

    #[test]
    fn strip_code_fence_leaves_unfenced_text() {
        assert_eq!(strip_code_fence("plain text"), "plain text");
        assert_eq!(strip_code_fence("```\nbody\n```"), "body");
        assert_eq!(strip_code_fence("\n\n```json\nline1\nline2\n```\n"), "line1\nline2");
        assert_eq!(strip_code_fence("```\n```"), "");
        // Only the opening line is a fence: unchanged
        assert_eq!(strip_code_fence("```json\n{}"), "```json\n{}");
    }

    #[test]
    fn closing_fence_glued_to_content_keeps_the_content() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\nline1\nline2```\n"), "line1\nline2");

        let stage3 = Normalizer::for_stage(Stage::LifestyleAdvice);
        assert_eq!(
            stage3.normalize("```json\n{\"lifestyle_advice\": [\"Walk daily\"]}```"),
            Normalized::Json(json!({ "lifestyle_advice": ["Walk daily"] }))
        );

        let stage1 = Normalizer::for_stage(Stage::BloodTestAnalysis);
        let multi_line = "```json\n{\"summary\": \"s\",\n\"abnormal_values\": []}```";
        assert_eq!(
            stage1.normalize(multi_line),
            Normalized::Json(json!({ "summary": "s", "abnormal_values": [] }))
        );
    }

    #[test]
    fn list_literal_is_extracted_in_order() {
        let normalizer = Normalizer::for_stage(Stage::LifestyleAdvice);
        let text = "Sure! Here you go:\nlifestyle_advice = [\"Eat less salt\", \"Walk daily\"]\n";
        assert_eq!(
            normalizer.normalize(text),
            Normalized::Items(vec!["Eat less salt".to_string(), "Walk daily".to_string()])
        );
    }

    #[test]
    fn list_literal_accepts_single_quotes_and_colons() {
        let strategy = ListLiteralStrategy::new("potential_health_issues");
        let text = "{'potential_health_issues': ['Anemia', \"Vitamin D deficiency\"],}";
        assert_eq!(
            strategy.parse(text),
            Some(Normalized::Items(vec![
                "Anemia".to_string(),
                "Vitamin D deficiency".to_string()
            ]))
        );
        assert_eq!(strategy.parse("no list here"), None);
    }

    #[test]
    fn bullet_lines_are_cleaned() {
        let normalizer = Normalizer::for_stage(Stage::LifestyleAdvice);
        assert_eq!(
            normalizer.normalize("- Eat less salt\n- Walk daily"),
            Normalized::Items(vec!["Eat less salt".to_string(), "Walk daily".to_string()])
        );

        let decorated = "**Diet:**\n* Cut sugar:\n• Drink water\n\n- **Sleep**:";
        assert_eq!(
            normalizer.normalize(decorated),
            Normalized::Items(vec![
                "Diet".to_string(),
                "Cut sugar".to_string(),
                "Drink water".to_string(),
                "Sleep".to_string(),
            ])
        );
    }

    #[test]
    fn empty_input_never_fails() {
        let normalizer = Normalizer::for_stage(Stage::LifestyleAdvice);
        assert_eq!(normalizer.normalize(""), Normalized::Empty);
        assert_eq!(normalizer.normalize("   \n\t "), Normalized::Empty);
        assert_eq!(normalizer.normalize("```\n\n```"), Normalized::Empty);
    }

    #[test]
    fn prose_falls_back_to_raw_text() {
        let normalizer = Normalizer::for_stage(Stage::LifestyleAdvice);
        let text = "Consider a balanced diet and regular exercise.";
        assert_eq!(normalizer.normalize(text), Normalized::Raw(text.to_string()));
    }

    #[test]
    fn schema_mismatch_falls_through() {
        let normalizer = Normalizer::for_stage(Stage::BloodTestAnalysis);
        let text = "{\"summary\": \"Everything normal\"}";
        assert_eq!(normalizer.normalize(text), Normalized::Raw(text.to_string()));

        let ok = "{\"summary\": \"s\", \"abnormal_values\": []}";
        assert_eq!(
            normalizer.normalize(ok),
            Normalized::Json(json!({ "summary": "s", "abnormal_values": [] }))
        );
    }

    #[test]
    fn json_inside_prose_is_found() {
        let normalizer = Normalizer::for_stage(Stage::HealthIssueIdentification);
        let text = "Here is the analysis:\n```json\n{\"potential_health_issues\": [\"Anemia\"]}\n```\nHope this helps.";
        assert_eq!(
            normalizer.normalize(text),
            Normalized::Json(json!({ "potential_health_issues": ["Anemia"] }))
        );
    }

    #[test]
    fn stage_chains_are_ordered() {
        assert_eq!(
            Normalizer::for_stage(Stage::LifestyleAdvice).strategy_names(),
            vec!["json", "list_literal", "bullet_lines"]
        );
        assert_eq!(
            Normalizer::for_stage(Stage::BloodTestAnalysis).strategy_names(),
            vec!["json"]
        );
    }
}
