//! LLM backend abstraction.
//!
//! `LlmClient` is the single seam to the language model: one completion
//! call that must yield a JSON object. `OpenAiClient` talks to any OpenAI
//! chat-completions endpoint with JSON response format and internal
//! retry/backoff; `MockLlmClient` scripts responses for tests.

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::retry::with_retry;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Trait abstracting the LLM provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt. The returned value is always a JSON object.
    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<Value, LlmError>;
}

/// Client for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

impl OpenAiClient {
    /// Create a client, reading the API key from the environment variable
    /// named in `config.api_key_env`.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| LlmError::AuthFailed {
                provider: format!("env var '{}' not set", config.api_key_env),
            })?;
        Ok(Self::new_with_key(config, api_key))
    }

    /// Create a client with an explicitly provided API key.
    pub fn new_with_key(config: LlmConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
        }
    }

    async fn complete_once(&self, prompt: &str, system_prompt: &str) -> Result<Value, LlmError> {
        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": prompt }
            ]
        });

        debug!(model = %self.config.model, "Sending completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.config.timeout_secs,
                    }
                } else {
                    LlmError::Connection {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &text));
        }

        let payload: Value = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: e.to_string(),
        })?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "response has no message content".to_string(),
            })?;

        let parsed: Value =
            serde_json::from_str(content).map_err(|e| LlmError::ResponseParse {
                message: format!("model output is not valid JSON: {e}"),
            })?;

        if !parsed.is_object() {
            return Err(LlmError::ResponseParse {
                message: "model output is not a JSON object".to_string(),
            });
        }

        Ok(parsed)
    }
}

/// Map an HTTP failure status to its error class. 400/401/403 are
/// permanent and never retried; 429 respects Retry-After semantics.
fn classify_http_error(status: u16, body: &str) -> LlmError {
    match status {
        400 | 403 => LlmError::InvalidRequest {
            message: format!("HTTP {status}: {body}"),
        },
        401 => LlmError::AuthFailed {
            provider: "openai".to_string(),
        },
        429 => LlmError::RateLimited {
            retry_after_secs: 5,
        },
        _ => LlmError::ApiRequest {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<Value, LlmError> {
        with_retry(&self.config.retry, || {
            self.complete_once(prompt, system_prompt)
        })
        .await
    }
}

/// A mock LLM client for testing. Returns scripted responses in order and
/// records every call.
pub struct MockLlmClient {
    /// Responses consumed front-to-back; the last one repeats once drained.
    pub responses: Mutex<VecDeque<Result<Value, LlmError>>>,
    /// Record of (prompt, system_prompt) pairs for assertion.
    pub call_log: Mutex<Vec<(String, String)>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// A mock that always returns the given JSON object.
    pub fn with_response(response: Value) -> Self {
        let mock = Self::new();
        mock.push_response(Ok(response));
        mock
    }

    pub fn push_response(&self, response: Result<Value, LlmError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<Value, LlmError> {
        self.call_log
            .lock()
            .unwrap()
            .push((prompt.to_string(), system_prompt.to_string()));

        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            match responses.front() {
                Some(Ok(v)) => Ok(v.clone()),
                Some(Err(e)) => Err(clone_error(e)),
                None => Ok(json!({})),
            }
        }
    }
}

fn clone_error(e: &LlmError) -> LlmError {
    match e {
        LlmError::ApiRequest { message } => LlmError::ApiRequest {
            message: message.clone(),
        },
        LlmError::InvalidRequest { message } => LlmError::InvalidRequest {
            message: message.clone(),
        },
        LlmError::ResponseParse { message } => LlmError::ResponseParse {
            message: message.clone(),
        },
        LlmError::AuthFailed { provider } => LlmError::AuthFailed {
            provider: provider.clone(),
        },
        LlmError::RateLimited { retry_after_secs } => LlmError::RateLimited {
            retry_after_secs: *retry_after_secs,
        },
        LlmError::Timeout { timeout_secs } => LlmError::Timeout {
            timeout_secs: *timeout_secs,
        },
        LlmError::Connection { message } => LlmError::Connection {
            message: message.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_http_errors() {
        assert!(matches!(
            classify_http_error(400, "bad request"),
            LlmError::InvalidRequest { .. }
        ));
        assert!(matches!(
            classify_http_error(401, ""),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            classify_http_error(429, ""),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_http_error(502, ""),
            LlmError::ApiRequest { .. }
        ));
    }

    #[tokio::test]
    async fn test_mock_returns_scripted_responses_in_order() {
        let mock = MockLlmClient::new();
        mock.push_response(Ok(json!({"n": 1})));
        mock.push_response(Ok(json!({"n": 2})));

        assert_eq!(mock.complete("p", "s").await.unwrap(), json!({"n": 1}));
        assert_eq!(mock.complete("p", "s").await.unwrap(), json!({"n": 2}));
        // Last response repeats.
        assert_eq!(mock.complete("p", "s").await.unwrap(), json!({"n": 2}));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_records_prompts() {
        let mock = MockLlmClient::with_response(json!({"metrics": []}));
        mock.complete("the prompt", "the system").await.unwrap();

        let log = mock.call_log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "the prompt");
        assert_eq!(log[0].1, "the system");
    }

    #[tokio::test]
    async fn test_mock_scripted_error() {
        let mock = MockLlmClient::new();
        mock.push_response(Err(LlmError::InvalidRequest {
            message: "rejected".into(),
        }));
        let result = mock.complete("p", "s").await;
        assert!(matches!(result, Err(LlmError::InvalidRequest { .. })));
    }

    #[test]
    fn test_openai_client_missing_key() {
        let mut config = LlmConfig::default();
        config.api_key_env = "ENTITYLENS_NONEXISTENT_KEY".to_string();
        let result = OpenAiClient::new(config);
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
    }
}
