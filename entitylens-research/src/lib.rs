//! EntityLens research pipeline.
//!
//! The concrete tools (entity validation, page extraction, LLM completion,
//! reference gathering, metrics generation), the research orchestrator that
//! drives the job state machine, and the search/dispatch front door.

pub mod browse;
pub mod dispatch;
pub mod llm_call;
pub mod metrics;
pub mod prompts;
pub mod references;
pub mod researcher;
pub mod validation;

pub use dispatch::{JobDispatcher, SearchService, ValidationTasks};
pub use researcher::Researcher;
