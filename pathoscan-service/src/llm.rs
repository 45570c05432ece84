use async_trait::async_trait;
use rig::{agent::Agent, client::CompletionClient, completion::Prompt, providers::openrouter};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::ServiceConfig;
use crate::normalizer::strip_code_fence;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("completion request failed: {0}")]
    Request(String),
}

/// A remote text-generation service: prompt in, free-form text out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// OpenRouter-hosted chat model reached through rig
pub struct OpenRouterBackend {
    agent: Agent<openrouter::CompletionModel>,
    model: String,
}

impl OpenRouterBackend {
    pub fn new(api_key: &str, model: &str, temperature: f64) -> Self {
        let client = openrouter::Client::new(api_key);
        let agent = client.agent(model).temperature(temperature).build();
        Self {
            agent,
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            &config.openrouter_api_key,
            &config.model,
            config.temperature,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.agent
            .prompt(prompt)
            .await
            .map_err(|e| BackendError::Request(e.to_string()))
    }
}

/// Send one prompt and log what came back, raw and fence-stripped.
///
/// The response is returned untouched; interpreting it is the normalizer's job.
pub async fn invoke(
    backend: &dyn CompletionBackend,
    call: &str,
    prompt: &str,
) -> Result<String, BackendError> {
    debug!(call, prompt_chars = prompt.len(), "sending prompt");

    let raw = backend.complete(prompt).await.inspect_err(|e| {
        error!(call, error = %e, "completion request failed");
    })?;

    debug!(call, response = %raw, "response from model");
    debug!(call, response = %strip_code_fence(&raw), "cleaned response");
    Ok(raw)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;

    #[tokio::test]
    async fn invoke_returns_raw_response() {
        let backend = ScriptedBackend::new(["```json\n{}\n```"]);
        let raw = invoke(&backend, "ping", "hello").await.unwrap();
        assert_eq!(raw, "```json\n{}\n```");
        assert_eq!(backend.prompts(), vec!["hello"]);
    }

    #[tokio::test]
    async fn invoke_propagates_request_errors() {
        let backend = ScriptedBackend::failing("401 Unauthorized");
        let err = invoke(&backend, "ping", "hello").await.unwrap_err();
        assert_eq!(err, BackendError::Request("401 Unauthorized".to_string()));
    }
}
