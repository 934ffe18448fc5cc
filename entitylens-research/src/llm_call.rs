//! LLM completion tool.

use async_trait::async_trait;
use entitylens_core::error::ToolError;
use entitylens_core::llm::LlmClient;
use entitylens_core::tool::Tool;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const TOOL_NAME: &str = "completion";

/// Longest prompt accepted, in characters.
const MAX_PROMPT_CHARS: usize = 32_000;

/// Tool wrapping the LLM backend. Retry and backoff live inside the
/// client; by the time an error reaches this tool it is final.
pub struct CompletionTool {
    llm: Arc<dyn LlmClient>,
}

impl CompletionTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Tool for CompletionTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let prompt = args
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: "Missing 'prompt' parameter".to_string(),
            })?;
        if prompt.is_empty() {
            return Err(ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: "Prompt must not be empty".to_string(),
            });
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: format!("Prompt exceeds {MAX_PROMPT_CHARS} characters"),
            });
        }
        Ok(())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let prompt = args["prompt"].as_str().unwrap_or_default();
        let system_prompt = args
            .get("system_prompt")
            .and_then(Value::as_str)
            .unwrap_or("You are a helpful research assistant. Respond with a JSON object.");

        let data = self
            .llm
            .complete(prompt, system_prompt)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: TOOL_NAME.into(),
                message: e.to_string(),
            })?;

        Ok(json!({ "data": data }))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(180)
    }
}
