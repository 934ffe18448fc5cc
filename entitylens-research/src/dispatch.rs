//! Search/dispatch front door.
//!
//! `SearchService::search` is the single entry point for clients: return
//! known entities immediately, suppress duplicate research, validate, and
//! hand new jobs to the dispatcher. Submission never blocks on job
//! completion.

use crate::researcher::Researcher;
use crate::validation::EntityValidationTool;
use async_trait::async_trait;
use entitylens_core::error::{DispatchError, EntityLensError, StoreError};
use entitylens_core::store::ResearchStore;
use entitylens_core::tool::ToolRunner;
use entitylens_core::types::{normalize_query, EntityType, Metric, Source};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Fire-and-forget hand-off of a submitted job to whatever executes it.
/// The server backs this with an in-process queue; tests record calls.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job_id: Uuid);
}

/// Dispatcher that records dispatched job ids (tests).
pub struct RecordingDispatcher {
    pub dispatched: Mutex<Vec<Uuid>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
        }
    }
}

impl Default for RecordingDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job_id: Uuid) {
        self.dispatched.lock().unwrap().push(job_id);
    }
}

pub struct SearchService {
    store: Arc<dyn ResearchStore>,
    runner: Arc<ToolRunner>,
    validation: Arc<EntityValidationTool>,
    researcher: Arc<Researcher>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl SearchService {
    pub fn new(
        store: Arc<dyn ResearchStore>,
        runner: Arc<ToolRunner>,
        validation: Arc<EntityValidationTool>,
        researcher: Arc<Researcher>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self {
            store,
            runner,
            validation,
            researcher,
            dispatcher,
        }
    }

    /// Search for an entity; start research when it is unknown.
    ///
    /// Order matters: existing entity, then active job, then validation,
    /// then submission. A validation failure has no side effects.
    pub async fn search(
        &self,
        query: &str,
        entity_type: EntityType,
    ) -> Result<Value, EntityLensError> {
        if let Some(entity) = self.store.find_entity_by_name(query).await? {
            let metrics = self.store.metrics_for_entity(entity.id).await?;
            let sources = self.store.sources_for_entity(entity.id).await?;
            return Ok(json!({
                "found": true,
                "entity": entity,
                "metrics": decorate_metrics(&metrics, &sources),
            }));
        }

        let job_type = entity_type.job_type();
        let normalized = normalize_query(query);
        if let Some(active) = self.store.find_active_job(&job_type, &normalized).await? {
            return Ok(research_in_progress(&active.job_id, active.status.as_str()));
        }

        let validation = self
            .runner
            .run(
                self.validation.as_ref(),
                json!({ "name": query, "entity_type": entity_type }),
                true,
            )
            .await?;
        if validation["valid"] != true {
            info!(query = %query, "Query rejected by validation");
            return Ok(json!({
                "found": false,
                "error": "Invalid query",
                "details": validation["validation_details"],
            }));
        }

        let sanitized = validation["sanitized_name"].as_str().unwrap_or(query);
        let job = match self.researcher.submit(sanitized, entity_type).await {
            Ok(job) => job,
            // Lost the check-then-act race: another submission created the
            // job between our active-job check and this insert.
            Err(EntityLensError::Store(StoreError::DuplicateActiveJob { .. })) => {
                warn!(query = %query, "Concurrent submission won the race");
                // Jobs are keyed by the sanitized name, which can differ
                // from the raw input (whitespace collapse, stripped chars).
                let stored = normalize_query(sanitized);
                let active = self.store.find_active_job(&job_type, &stored).await?;
                return Ok(match active {
                    Some(job) => research_in_progress(&job.job_id, job.status.as_str()),
                    None => json!({ "found": false, "research_in_progress": true }),
                });
            }
            Err(e) => return Err(e),
        };

        self.dispatcher.dispatch(job.job_id).await;

        Ok(json!({
            "found": false,
            "research_started": true,
            "job_id": job.job_id.to_string(),
            "status": job.status.as_str(),
        }))
    }

    /// Look up a job's status by its string id.
    pub async fn get_job_status(&self, job_id: &str) -> Result<Value, EntityLensError> {
        let id = Uuid::parse_str(job_id).map_err(|_| DispatchError::InvalidJobId {
            raw: job_id.to_string(),
        })?;
        let job = self
            .store
            .get_job(id)
            .await?
            .ok_or(DispatchError::JobNotFound { job_id: id })?;

        Ok(json!({
            "job_id": job.job_id.to_string(),
            "status": job.status.as_str(),
            "started_at": job.started_at,
            "completed_at": job.completed_at,
            "result_data": job.result_data,
        }))
    }
}

fn research_in_progress(job_id: &Uuid, status: &str) -> Value {
    json!({
        "found": false,
        "research_in_progress": true,
        "job_id": job_id.to_string(),
        "status": status,
    })
}

/// Attach to each metric the source records it cites.
fn decorate_metrics(metrics: &[Metric], sources: &[Source]) -> Vec<Value> {
    metrics
        .iter()
        .map(|metric| {
            let cited: Vec<&str> = metric.raw_data["references"]
                .as_array()
                .map(|refs| refs.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let matched: Vec<&Source> = sources
                .iter()
                .filter(|s| cited.contains(&s.url.as_str()))
                .collect();
            let mut value = serde_json::to_value(metric).unwrap_or_default();
            if let Value::Object(map) = &mut value {
                map.insert(
                    "sources".to_string(),
                    serde_json::to_value(&matched).unwrap_or_default(),
                );
            }
            value
        })
        .collect()
}

/// Outcome of polling a validation task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPoll {
    Pending,
    Resolved(Value),
}

/// Background validation pre-check: submission returns a handle
/// immediately, the outcome is polled later.
pub struct ValidationTasks {
    runner: Arc<ToolRunner>,
    validation: Arc<EntityValidationTool>,
    tasks: Arc<Mutex<HashMap<Uuid, Option<Value>>>>,
}

impl ValidationTasks {
    pub fn new(runner: Arc<ToolRunner>, validation: Arc<EntityValidationTool>) -> Self {
        Self {
            runner,
            validation,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start validating in the background and return the task handle.
    pub fn submit(&self, query: &str, entity_type: EntityType) -> Uuid {
        let task_id = Uuid::new_v4();
        self.tasks.lock().unwrap().insert(task_id, None);

        let runner = self.runner.clone();
        let validation = self.validation.clone();
        let tasks = self.tasks.clone();
        let args = json!({ "name": query, "entity_type": entity_type });
        tokio::spawn(async move {
            let outcome = match runner.run(validation.as_ref(), args, true).await {
                Ok(result) => result,
                Err(e) => json!({ "valid": false, "error": e.to_string() }),
            };
            tasks.lock().unwrap().insert(task_id, Some(outcome));
        });

        task_id
    }

    /// Poll a task. Unknown ids are NotFound; unfinished tasks Pending.
    pub fn poll(&self, task_id: Uuid) -> Result<TaskPoll, DispatchError> {
        match self.tasks.lock().unwrap().get(&task_id) {
            None => Err(DispatchError::TaskNotFound { task_id }),
            Some(None) => Ok(TaskPoll::Pending),
            Some(Some(outcome)) => Ok(TaskPoll::Resolved(outcome.clone())),
        }
    }
}
