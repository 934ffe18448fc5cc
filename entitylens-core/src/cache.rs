//! Content-addressed cache for tool results.
//!
//! The cache is a pure optimization: entries are keyed by a deterministic
//! hash of the tool name and arguments, carry a TTL, and losing the whole
//! backend never affects correctness. The tool runner absorbs every cache
//! error and falls back to direct execution.

use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// A cached tool result with its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: Value,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(result: Value, ttl_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            result,
            cached_at: now,
            expires_at: now + Duration::seconds(ttl_secs as i64),
        }
    }

    pub fn is_fresh(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Cache backend abstraction.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get an entry; expired entries are treated as absent.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry under the key with the given TTL.
    async fn set(&self, key: &str, result: Value, ttl_secs: u64) -> Result<(), CacheError>;
}

/// In-memory cache with optional failure injection for tests.
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// When true, every operation fails with a backend error.
    pub fail_all: Mutex<bool>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fail_all: Mutex::new(false),
        }
    }

    /// Make every subsequent cache operation fail.
    pub fn inject_failure(&self) {
        *self.fail_all.lock().unwrap() = true;
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    fn check_failure(&self) -> Result<(), CacheError> {
        if *self.fail_all.lock().unwrap() {
            return Err(CacheError::Backend {
                message: "injected cache failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.check_failure()?;
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).filter(|e| e.is_fresh()).cloned())
    }

    async fn set(&self, key: &str, result: Value, ttl_secs: u64) -> Result<(), CacheError> {
        self.check_failure()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), CacheEntry::new(result, ttl_secs));
        Ok(())
    }
}
