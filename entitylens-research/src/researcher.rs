//! Research orchestrator: drives a job through its lifecycle.
//!
//! Every state transition is committed to the store before the next stage
//! runs, so a restart observes the last checkpoint. Stage errors are
//! recorded in the job's result_data, the job is marked failed, and the
//! error re-raised to the caller.

use crate::metrics::MetricsGenerationTool;
use crate::references::ReferenceGatheringTool;
use entitylens_core::error::{DispatchError, EntityLensError, ToolError};
use entitylens_core::store::ResearchStore;
use entitylens_core::tool::ToolRunner;
use entitylens_core::types::{normalize_query, Entity, EntityType, JobStatus, ResearchJob};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub struct Researcher {
    store: Arc<dyn ResearchStore>,
    runner: Arc<ToolRunner>,
    references: Arc<ReferenceGatheringTool>,
    metrics: Arc<MetricsGenerationTool>,
}

impl Researcher {
    pub fn new(
        store: Arc<dyn ResearchStore>,
        runner: Arc<ToolRunner>,
        references: Arc<ReferenceGatheringTool>,
        metrics: Arc<MetricsGenerationTool>,
    ) -> Self {
        Self {
            store,
            runner,
            references,
            metrics,
        }
    }

    /// Create and persist a pending job for the given entity name.
    ///
    /// The job's query is normalized for duplicate matching; the display
    /// form is kept in result_data for entity creation. A concurrent
    /// submission for the same query loses with `DuplicateActiveJob`.
    pub async fn submit(
        &self,
        name: &str,
        entity_type: EntityType,
    ) -> Result<ResearchJob, EntityLensError> {
        let mut job = ResearchJob::new(entity_type, normalize_query(name));
        job.merge_result("query", Value::String(name.to_string()));
        self.store.create_job(&job).await?;
        info!(job_id = %job.job_id, query = %job.query, "Research job submitted");
        Ok(job)
    }

    /// Execute a job to completion.
    ///
    /// Re-invoking for a completed job returns the recorded summary
    /// without re-running (at-least-once delivery safety). A failed job
    /// re-executes both stages.
    pub async fn execute(&self, job_id: Uuid) -> Result<Value, EntityLensError> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(DispatchError::JobNotFound { job_id })?;

        if job.status == JobStatus::Completed {
            info!(job_id = %job_id, "Job already completed, returning recorded summary");
            return Ok(json!({
                "success": true,
                "entity_id": job.entity_id.map(|id| id.to_string()),
                "result_data": job.result_data,
            }));
        }

        let entity_type = self.entity_type_of(&job)?;
        let entity_name = job.result_data["query"]
            .as_str()
            .unwrap_or(&job.query)
            .to_string();

        job.start();
        if let Err(e) = self.store.update_job(&job).await {
            return self.fail_job(&mut job, e.into()).await;
        }

        // Entity creation is a stage like any other: a store error here
        // must not strand the job in_progress holding the active slot.
        let entity = Entity::new(&entity_name, entity_type);
        if let Err(e) = self.store.create_entity(&entity).await {
            return self.fail_job(&mut job, e.into()).await;
        }
        job.link_entity(entity.id);
        if let Err(e) = self.store.update_job(&job).await {
            return self.fail_job(&mut job, e.into()).await;
        }

        let reference_result = match self
            .runner
            .run(
                self.references.as_ref(),
                json!({
                    "entity_id": entity.id.to_string(),
                    "entity_name": entity_name,
                    "entity_type": entity_type,
                }),
                true,
            )
            .await
        {
            Ok(v) => v,
            Err(e) => return self.fail_job(&mut job, e.into()).await,
        };
        job.merge_result(
            "references_found",
            reference_result["references_found"].clone(),
        );
        if let Err(e) = self.store.update_job(&job).await {
            return self.fail_job(&mut job, e.into()).await;
        }

        let metrics_result = match self
            .runner
            .run(
                self.metrics.as_ref(),
                json!({
                    "entity_id": entity.id.to_string(),
                    "entity_name": entity_name,
                    "entity_type": entity_type,
                    "references": reference_result["references"],
                }),
                true,
            )
            .await
        {
            Ok(v) => v,
            Err(e) => return self.fail_job(&mut job, e.into()).await,
        };
        job.merge_result(
            "metrics_generated",
            metrics_result["metrics_generated"].clone(),
        );

        job.complete();
        if let Err(e) = self.store.update_job(&job).await {
            return self.fail_job(&mut job, e.into()).await;
        }
        info!(job_id = %job_id, entity_id = %entity.id, "Research job completed");

        Ok(json!({
            "success": true,
            "entity_id": entity.id.to_string(),
            "references": reference_result["references"],
            "metrics": metrics_result["metrics"],
        }))
    }

    fn entity_type_of(&self, job: &ResearchJob) -> Result<EntityType, EntityLensError> {
        job.job_type
            .strip_suffix("_research")
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| {
                EntityLensError::Tool(ToolError::ExecutionFailed {
                    name: "researcher".to_string(),
                    message: format!("unrecognized job type: {}", job.job_type),
                })
            })
    }

    /// Record the stage error, commit the failed state, and re-raise.
    /// The commit is best-effort: a second store error is logged, and the
    /// original cause is the one surfaced.
    async fn fail_job(
        &self,
        job: &mut ResearchJob,
        cause: EntityLensError,
    ) -> Result<Value, EntityLensError> {
        error!(job_id = %job.job_id, error = %cause, "Research job failed");
        job.fail(cause.to_string());
        if let Err(commit) = self.store.update_job(job).await {
            error!(job_id = %job.job_id, error = %commit, "Failed to commit failed job state");
        }
        Err(cause)
    }
}
