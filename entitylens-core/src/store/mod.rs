//! Persistent store abstraction for entities, sources, metrics, and jobs.
//!
//! `ResearchStore` is the single seam to the relational database. Bulk
//! inserts are transactional: all rows land or none do. The store also
//! enforces single-flight on active jobs — at most one pending or
//! in-progress job may exist per (job_type, normalized query), surfaced as
//! `StoreError::DuplicateActiveJob` to the losing writer.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::types::{Entity, Metric, ResearchJob, Source};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait ResearchStore: Send + Sync {
    /// Persist a new job. Fails with `DuplicateActiveJob` when another
    /// pending or in-progress job exists for the same job_type and query.
    async fn create_job(&self, job: &ResearchJob) -> Result<(), StoreError>;

    /// Overwrite the stored job (status, timestamps, entity link,
    /// result_data). This is the orchestrator's checkpoint commit.
    async fn update_job(&self, job: &ResearchJob) -> Result<(), StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ResearchJob>, StoreError>;

    /// Find a pending or in-progress job matching job_type and the exact
    /// stored query.
    async fn find_active_job(
        &self,
        job_type: &str,
        query: &str,
    ) -> Result<Option<ResearchJob>, StoreError>;

    async fn create_entity(&self, entity: &Entity) -> Result<(), StoreError>;

    /// Case-insensitive substring match on entity name.
    async fn find_entity_by_name(&self, name: &str) -> Result<Option<Entity>, StoreError>;

    /// Insert all sources in one transaction.
    async fn insert_sources(&self, sources: &[Source]) -> Result<(), StoreError>;

    /// Insert all metrics in one transaction.
    async fn insert_metrics(&self, metrics: &[Metric]) -> Result<(), StoreError>;

    async fn sources_for_entity(&self, entity_id: Uuid) -> Result<Vec<Source>, StoreError>;

    async fn metrics_for_entity(&self, entity_id: Uuid) -> Result<Vec<Metric>, StoreError>;
}
