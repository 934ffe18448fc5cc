//! In-memory store for tests, with failure injection.

use super::ResearchStore;
use crate::error::StoreError;
use crate::types::{Entity, Metric, ResearchJob, Source};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// A memory-backed store. State lives behind one lock so the duplicate
/// check and insert in `create_job` are atomic, matching the SQLite
/// partial unique index.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// When set, the named operation fails with a query error.
    pub fail_on: Mutex<Option<String>>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, ResearchJob>,
    entities: HashMap<Uuid, Entity>,
    sources: Vec<Source>,
    metrics: Vec<Metric>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            fail_on: Mutex::new(None),
        }
    }

    /// Make the named store operation fail until cleared.
    pub fn inject_failure(&self, operation: &str) {
        *self.fail_on.lock().unwrap() = Some(operation.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    fn check_failure(&self, operation: &str) -> Result<(), StoreError> {
        if self.fail_on.lock().unwrap().as_deref() == Some(operation) {
            return Err(StoreError::Query {
                message: format!("injected failure in {operation}"),
            });
        }
        Ok(())
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().unwrap().jobs.len()
    }

    pub fn source_count(&self) -> usize {
        self.inner.lock().unwrap().sources.len()
    }

    pub fn metric_count(&self) -> usize {
        self.inner.lock().unwrap().metrics.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResearchStore for MemoryStore {
    async fn create_job(&self, job: &ResearchJob) -> Result<(), StoreError> {
        self.check_failure("create_job")?;
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner.jobs.values().any(|existing| {
            existing.status.is_active()
                && existing.job_type == job.job_type
                && existing.query == job.query
        });
        if duplicate {
            return Err(StoreError::DuplicateActiveJob {
                job_type: job.job_type.clone(),
                query: job.query.clone(),
            });
        }
        inner.jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &ResearchJob) -> Result<(), StoreError> {
        self.check_failure("update_job")?;
        let mut inner = self.inner.lock().unwrap();
        if !inner.jobs.contains_key(&job.job_id) {
            return Err(StoreError::Query {
                message: format!("job {} does not exist", job.job_id),
            });
        }
        inner.jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ResearchJob>, StoreError> {
        self.check_failure("get_job")?;
        Ok(self.inner.lock().unwrap().jobs.get(&job_id).cloned())
    }

    async fn find_active_job(
        &self,
        job_type: &str,
        query: &str,
    ) -> Result<Option<ResearchJob>, StoreError> {
        self.check_failure("find_active_job")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .find(|job| {
                job.status.is_active() && job.job_type == job_type && job.query == query
            })
            .cloned())
    }

    async fn create_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        self.check_failure("create_entity")?;
        self.inner
            .lock()
            .unwrap()
            .entities
            .insert(entity.id, entity.clone());
        Ok(())
    }

    async fn find_entity_by_name(&self, name: &str) -> Result<Option<Entity>, StoreError> {
        self.check_failure("find_entity_by_name")?;
        let needle = name.to_lowercase();
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entities
            .values()
            .find(|e| e.name.to_lowercase().contains(&needle))
            .cloned())
    }

    async fn insert_sources(&self, sources: &[Source]) -> Result<(), StoreError> {
        self.check_failure("insert_sources")?;
        self.inner.lock().unwrap().sources.extend_from_slice(sources);
        Ok(())
    }

    async fn insert_metrics(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        self.check_failure("insert_metrics")?;
        self.inner.lock().unwrap().metrics.extend_from_slice(metrics);
        Ok(())
    }

    async fn sources_for_entity(&self, entity_id: Uuid) -> Result<Vec<Source>, StoreError> {
        self.check_failure("sources_for_entity")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sources
            .iter()
            .filter(|s| s.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn metrics_for_entity(&self, entity_id: Uuid) -> Result<Vec<Metric>, StoreError> {
        self.check_failure("metrics_for_entity")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .metrics
            .iter()
            .filter(|m| m.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    #[tokio::test]
    async fn test_create_and_get_job() {
        let store = MemoryStore::new();
        let job = ResearchJob::new(EntityType::Company, "acme corp");
        store.create_job(&job).await.unwrap();

        let loaded = store.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.query, "acme corp");
        assert_eq!(loaded.job_type, "company_research");
    }

    #[tokio::test]
    async fn test_duplicate_active_job_rejected() {
        let store = MemoryStore::new();
        let first = ResearchJob::new(EntityType::Company, "acme corp");
        store.create_job(&first).await.unwrap();

        let second = ResearchJob::new(EntityType::Company, "acme corp");
        let result = store.create_job(&second).await;
        assert!(matches!(
            result,
            Err(StoreError::DuplicateActiveJob { .. })
        ));

        // A product job for the same query is a different job_type.
        let product = ResearchJob::new(EntityType::Product, "acme corp");
        store.create_job(&product).await.unwrap();
    }

    #[tokio::test]
    async fn test_terminal_job_does_not_block_resubmission() {
        let store = MemoryStore::new();
        let mut job = ResearchJob::new(EntityType::Company, "acme corp");
        store.create_job(&job).await.unwrap();

        job.start();
        job.fail("boom");
        store.update_job(&job).await.unwrap();

        let retry = ResearchJob::new(EntityType::Company, "acme corp");
        store.create_job(&retry).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_active_job_matches_exact_query() {
        let store = MemoryStore::new();
        let job = ResearchJob::new(EntityType::Company, "acme corp");
        store.create_job(&job).await.unwrap();

        let found = store
            .find_active_job("company_research", "acme corp")
            .await
            .unwrap();
        assert_eq!(found.unwrap().job_id, job.job_id);

        assert!(store
            .find_active_job("company_research", "acme")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_entity_substring_lookup_is_case_insensitive() {
        let store = MemoryStore::new();
        let entity = Entity::new("Acme Corporation", EntityType::Company);
        store.create_entity(&entity).await.unwrap();

        let found = store.find_entity_by_name("acme corp").await.unwrap();
        assert_eq!(found.unwrap().id, entity.id);

        assert!(store.find_entity_by_name("globex").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.inject_failure("insert_sources");
        let result = store.insert_sources(&[]).await;
        assert!(matches!(result, Err(StoreError::Query { .. })));

        store.clear_failure();
        store.insert_sources(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_job_fails() {
        let store = MemoryStore::new();
        let job = ResearchJob::new(EntityType::Company, "acme");
        let result = store.update_job(&job).await;
        assert!(matches!(result, Err(StoreError::Query { .. })));
    }
}
