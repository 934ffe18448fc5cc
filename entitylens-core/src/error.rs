//! Error types for the EntityLens core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering tool execution, LLM, browser, store, cache, and configuration
//! domains.

use std::path::PathBuf;
use uuid::Uuid;

/// Top-level error type for the EntityLens core library.
#[derive(Debug, thiserror::Error)]
pub enum EntityLensError {
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from tool validation and execution.
///
/// `InvalidArguments` is the validation failure of the tool contract: it is
/// never retried and never creates a job. `ExecutionFailed` is raised once a
/// tool's underlying operation has exhausted its internal retry budget.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
}

/// Errors from LLM backend interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("Request rejected as invalid: {message}")]
    InvalidRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from the browser automation backend.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Navigation failed: {message}")]
    NavigationFailed { message: String },

    #[error("Extraction failed for selector '{selector}': {message}")]
    ExtractionFailed { selector: String, message: String },

    #[error("Browser session error: {message}")]
    SessionError { message: String },

    #[error("Browser operation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the persistent store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Transaction failed: {message}")]
    Transaction { message: String },

    #[error("An active '{job_type}' job already exists for query '{query}'")]
    DuplicateActiveJob { job_type: String, query: String },

    #[error("Record serialization failed: {message}")]
    Serialization { message: String },
}

/// Errors from the result cache backend.
///
/// These are always absorbed by the tool runner (a failing cache degrades to
/// direct execution) and never escalate past it.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {message}")]
    Backend { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },
}

/// Client-visible errors from the search/dispatch front door.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: Uuid },

    #[error("Invalid job ID format: {raw}")]
    InvalidJobId { raw: String },

    #[error("Validation task not found: {task_id}")]
    TaskNotFound { task_id: Uuid },
}

/// A type alias for results using the top-level `EntityLensError`.
pub type Result<T> = std::result::Result<T, EntityLensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_tool() {
        let err = EntityLensError::Tool(ToolError::InvalidArguments {
            name: "entity_validation".into(),
            reason: "name is required".into(),
        });
        assert_eq!(
            err.to_string(),
            "Tool error: Invalid arguments for tool 'entity_validation': name is required"
        );
    }

    #[test]
    fn test_error_display_llm() {
        let err = EntityLensError::Llm(LlmError::RateLimited {
            retry_after_secs: 30,
        });
        assert_eq!(
            err.to_string(),
            "LLM error: Rate limited by provider, retry after 30s"
        );
    }

    #[test]
    fn test_error_display_store() {
        let err = StoreError::DuplicateActiveJob {
            job_type: "company_research".into(),
            query: "acme corp".into(),
        };
        assert_eq!(
            err.to_string(),
            "An active 'company_research' job already exists for query 'acme corp'"
        );
    }

    #[test]
    fn test_error_display_browser() {
        let err = BrowserError::ExtractionFailed {
            selector: "h2 > a.result__a".into(),
            message: "selector returned no nodes".into(),
        };
        assert!(err.to_string().contains("h2 > a.result__a"));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: EntityLensError = serde_err.into();
        assert!(matches!(err, EntityLensError::Serialization(_)));
    }

    #[test]
    fn test_dispatch_error_variants() {
        let id = Uuid::new_v4();
        let err = DispatchError::JobNotFound { job_id: id };
        assert!(err.to_string().contains(&id.to_string()));

        let err = DispatchError::InvalidJobId {
            raw: "not-a-uuid".into(),
        };
        assert!(err.to_string().contains("not-a-uuid"));
    }
}
