//! Uniform tool contract and the runner that executes tools.
//!
//! Every unit of work in the pipeline (validation, page extraction, LLM
//! completion, reference gathering, metrics generation) implements `Tool`.
//! `ToolRunner::run` applies the shared template: validate, check the
//! content-addressed cache, execute under the tool's timeout, store the
//! result. Validation must be side-effect free so a failed call leaves no
//! trace.

use crate::cache::CacheStore;
use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Trait that all pipeline tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// Check arguments without performing any work. Fails fast with
    /// `ToolError::InvalidArguments`.
    fn validate(&self, args: &Value) -> Result<(), ToolError>;

    /// Execute the tool with pre-validated arguments.
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;

    /// TTL applied when this tool's results are cached.
    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(3600)
    }

    /// Maximum execution time before timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
}

/// Deterministic cache key for a tool invocation.
///
/// Argument names are sorted lexicographically and each value serialized
/// compactly, so semantically identical calls hash identically regardless
/// of argument order.
pub fn cache_key(tool_name: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(b":");
    if let Value::Object(map) = args {
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        for key in keys {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            // serde_json serialization is deterministic for a given value.
            hasher.update(map[key].to_string().as_bytes());
            hasher.update(b";");
        }
    } else {
        hasher.update(args.to_string().as_bytes());
    }
    format!("tool_result:{:x}", hasher.finalize())
}

/// Executes tools with caching and timeout handling.
pub struct ToolRunner {
    cache: Arc<dyn CacheStore>,
}

impl ToolRunner {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Run a tool: validate, consult the cache, execute under timeout,
    /// store the result.
    ///
    /// Cache backend errors are logged and absorbed: a failed read is a
    /// miss, a failed write is skipped. They never surface to the caller.
    pub async fn run(&self, tool: &dyn Tool, args: Value, use_cache: bool) -> Result<Value, ToolError> {
        tool.validate(&args)?;

        let key = cache_key(tool.name(), &args);

        if use_cache {
            match self.cache.get(&key).await {
                Ok(Some(entry)) => {
                    debug!(tool = %tool.name(), "Returning cached result");
                    return Ok(entry.result);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(tool = %tool.name(), error = %e, "Cache read failed, executing directly");
                }
            }
        }

        let timeout = tool.timeout();
        info!(tool = %tool.name(), timeout_secs = timeout.as_secs(), "Executing tool");

        let result = match tokio::time::timeout(timeout, tool.execute(args)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    name: tool.name().to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        if use_cache {
            let ttl = tool.cache_ttl().as_secs();
            if let Err(e) = self.cache.set(&key, result.clone(), ttl).await {
                warn!(tool = %tool.name(), error = %e, "Cache write failed, result not cached");
            }
        }

        Ok(result)
    }
}
