//! Page extraction tool over the browser backend.

use async_trait::async_trait;
use entitylens_core::browser::BrowserClient;
use entitylens_core::error::ToolError;
use entitylens_core::retry::{with_retry, RetryConfig};
use entitylens_core::tool::Tool;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const TOOL_NAME: &str = "page_extract";

/// Tool that loads a page and extracts elements by CSS selector.
/// Navigation failures are retried with exponential backoff; extraction
/// failures are permanent.
pub struct PageExtractTool {
    browser: Arc<dyn BrowserClient>,
    retry: RetryConfig,
}

impl PageExtractTool {
    pub fn new(browser: Arc<dyn BrowserClient>, retry: RetryConfig) -> Self {
        Self { browser, retry }
    }
}

#[async_trait]
impl Tool for PageExtractTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: "Missing 'url' parameter".to_string(),
            })?;

        let parsed = Url::parse(url).map_err(|e| ToolError::InvalidArguments {
            name: TOOL_NAME.into(),
            reason: format!("Invalid URL '{url}': {e}"),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: format!("URL scheme must be http or https, got '{}'", parsed.scheme()),
            });
        }

        let selectors = args
            .get("selectors")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: "Missing 'selectors' parameter".to_string(),
            })?;
        if selectors.is_empty() || selectors.iter().any(|s| !s.is_string()) {
            return Err(ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: "'selectors' must be a non-empty list of strings".to_string(),
            });
        }
        Ok(())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let url = args["url"].as_str().unwrap_or_default().to_string();
        let selectors: Vec<String> = args["selectors"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let wait_for = args.get("wait_for").and_then(Value::as_str).map(str::to_string);

        let extract = with_retry(&self.retry, || {
            self.browser
                .fetch_and_extract(&url, &selectors, wait_for.as_deref())
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            name: TOOL_NAME.into(),
            message: e.to_string(),
        })?;

        serde_json::to_value(&extract).map_err(|e| ToolError::ExecutionFailed {
            name: TOOL_NAME.into(),
            message: format!("failed to serialize extract: {e}"),
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(120)
    }
}
