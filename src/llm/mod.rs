//! Text Generation
//!
//! The pipeline depends only on the `TextGenerator` trait. `ChatCompletionsClient`
//! implements it against any OpenAI-compatible `/chat/completions` endpoint.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::error::{AskError, Result};

/// Failure of a single text-generation call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Transport failure (DNS, TLS, timeout, connection reset)
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not contain a completion
    #[error("malformed response: {0}")]
    Response(String),
}

/// A text-generation service: prompt in, completion out
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt`, stopping before any of the `stop` sequences
    fn generate(
        &self,
        prompt: &str,
        stop: &[&str],
    ) -> impl Future<Output = std::result::Result<String, LlmError>> + Send;
}

impl<T: TextGenerator> TextGenerator for Arc<T> {
    fn generate(
        &self,
        prompt: &str,
        stop: &[&str],
    ) -> impl Future<Output = std::result::Result<String, LlmError>> + Send {
        (**self).generate(prompt, stop)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "no_stop")]
    stop: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_stop(stop: &&[&str]) -> bool {
    stop.is_empty()
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions API
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

impl ChatCompletionsClient {
    /// Build a client from configuration and an already-resolved API key
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AskError::config_error(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
        })
    }

    /// Build a client, reading the API key from the environment
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(config, config.api_key()?)
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGenerator for ChatCompletionsClient {
    async fn generate(&self, prompt: &str, stop: &[&str]) -> std::result::Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            stop,
            temperature: self.temperature,
        };

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "requesting completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|e| LlmError::Response(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Response("no completion in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ChatCompletionsClient {
        let config = LlmConfig {
            base_url: format!("{}/v1/", server.uri()),
            model: "test-model".to_string(),
            timeout_secs: 5,
            ..LlmConfig::default()
        };
        ChatCompletionsClient::new(&config, "test-key").unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": "count customers"}],
                "stop": ["\nSQL Result:"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "SELECT COUNT(*) FROM Customer"}},
                    {"message": {"role": "assistant", "content": "SELECT 2"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client.generate("count customers", &["\nSQL Result:"]).await.unwrap();
        assert_eq!(text, "SELECT COUNT(*) FROM Customer");
    }

    #[tokio::test]
    async fn test_generate_reports_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("q", &[]).await.unwrap_err();
        assert_eq!(err, LlmError::Status { status: 401, body: "invalid api key".to_string() });
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_choices() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("q", &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::Response(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_request_error() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client = ChatCompletionsClient::new(&config, "k").unwrap();
        let err = client.generate("q", &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::Request(_)));
    }

    #[test]
    fn test_empty_stop_omitted_from_request() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage { role: "user", content: "p" }],
            stop: &[],
            temperature: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("stop").is_none());
        assert!(json.get("temperature").is_none());
    }
}
