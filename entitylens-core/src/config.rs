//! Configuration system for EntityLens.
//!
//! Uses `figment` for layered configuration: serialized defaults -> TOML file
//! -> `ENTITYLENS_`-prefixed environment variables. The resulting `AppConfig`
//! is immutable; construct it once at startup and share it by reference.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::retry::RetryConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub browser: BrowserConfig,
    pub search: SearchConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Capacity of the in-process job queue.
    pub job_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            job_queue_depth: 64,
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("entitylens.db"),
        }
    }
}

/// Tool result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL for cached tool results, in seconds.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3600,
        }
    }
}

/// LLM backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat-completions API.
    pub base_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature; kept low for factual extraction.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            api_key_env: "ENTITYLENS_OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Per-navigation timeout in seconds.
    pub navigation_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_secs: 30,
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5_000,
                backoff_multiplier: 2.0,
                jitter: true,
            },
        }
    }
}

/// Reference gathering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search engines queried, in order.
    pub engines: Vec<EngineConfig>,
    /// Hosts whose results are discarded.
    #[serde(default = "default_domain_blacklist")]
    pub domain_blacklist: Vec<String>,
    /// Maximum result links taken per engine query.
    pub max_results_per_query: usize,
}

/// One search engine: its result-page URL template and the CSS selector
/// that yields result links on that page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    /// `{query}` is replaced with the URL-encoded query.
    pub url_template: String,
    pub result_selector: String,
}

fn default_domain_blacklist() -> Vec<String> {
    [
        "facebook.com",
        "twitter.com",
        "instagram.com",
        "youtube.com",
        "pinterest.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engines: vec![
                EngineConfig {
                    name: "google".to_string(),
                    url_template: "https://www.google.com/search?q={query}".to_string(),
                    result_selector: "div.g div.yuRUbf > a".to_string(),
                },
                EngineConfig {
                    name: "duckduckgo".to_string(),
                    url_template: "https://html.duckduckgo.com/html/?q={query}".to_string(),
                    result_selector: "h2 > a.result__a".to_string(),
                },
            ],
            domain_blacklist: default_domain_blacklist(),
            max_results_per_query: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then the given TOML file (if present),
    /// then `ENTITYLENS_`-prefixed environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        } else {
            // Optional default location; skipped silently when absent.
            figment = figment.merge(Toml::file("entitylens.toml"));
        }

        figment
            .merge(Env::prefixed("ENTITYLENS_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Invalid {
                message: e.to_string(),
            })
    }
}
