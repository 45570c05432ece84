use async_trait::async_trait;
use pathoscan_service::{BackendError, CompletionBackend};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Replays canned responses in order and records every prompt.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every call waits this long before answering, so overlapping requests really overlap.
    #[allow(dead_code)]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[allow(dead_code)]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BackendError::Request("no scripted response left".to_string()))
    }
}

#[allow(dead_code)]
pub const STAGE1_RESPONSE: &str = r#"```json
{
  "summary": "Hemoglobin and ferritin are below range.",
  "abnormal_values": [
    {"parameter": "Hemoglobin", "value": 10.2, "reference_range": "13.5-17.5 g/dL", "interpretation": "Low"},
    {"parameter": "Ferritin", "value": "9 ng/mL", "reference_range": "24-336 ng/mL", "interpretation": "Low iron stores"}
  ]
}
```"#;

#[allow(dead_code)]
pub const STAGE2_RESPONSE: &str =
    r#"potential_health_issues = ["Iron deficiency anemia", 'Possible chronic blood loss']"#;
