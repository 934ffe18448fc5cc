//! EntityLens core library.
//!
//! Provides the building blocks shared by the research pipeline and the
//! server: the error taxonomy, layered configuration, domain types, the
//! uniform tool contract with its content-addressed result cache, the retry
//! helper, and trait-based interfaces to the external backends (relational
//! store, browser automation, LLM provider) with mock implementations for
//! testing.

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod retry;
pub mod store;
pub mod tool;
pub mod types;

pub use error::{
    BrowserError, CacheError, ConfigError, DispatchError, EntityLensError, LlmError, Result,
    StoreError, ToolError,
};
