//! Domain types shared across the research pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The kind of entity a research job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Company,
    Product,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Company => "company",
            EntityType::Product => "product",
        }
    }

    /// The job type string recorded on research jobs for this entity kind.
    pub fn job_type(&self) -> String {
        format!("{}_research", self.as_str())
    }

    /// Metric categories generated for this entity kind, in declared order.
    pub fn metric_categories(&self) -> &'static [MetricCategory] {
        match self {
            EntityType::Company => &[
                MetricCategory::Overview,
                MetricCategory::Sustainability,
                MetricCategory::Innovation,
            ],
            EntityType::Product => {
                &[MetricCategory::ProductMetrics, MetricCategory::Innovation]
            }
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(EntityType::Company),
            "product" => Ok(EntityType::Product),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

/// A researched company or product. Created once by the orchestrator from
/// the validated query, never mutated or deleted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub name: String,
    pub entity_type: EntityType,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            entity_type,
            created_at: Utc::now(),
        }
    }
}

/// A web reference attached to an entity. Append-only; URL is unique per
/// entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub url: String,
    pub source_type: String,
    /// Which search engine surfaced this URL.
    pub search_engine: String,
    pub discovered_at: DateTime<Utc>,
}

impl Source {
    pub fn new(
        entity_id: Uuid,
        url: impl Into<String>,
        source_type: impl Into<String>,
        search_engine: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            url: url.into(),
            source_type: source_type.into(),
            search_engine: search_engine.into(),
            discovered_at: Utc::now(),
        }
    }
}

/// Category a generated metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Overview,
    Sustainability,
    Innovation,
    ProductMetrics,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Overview => "overview",
            MetricCategory::Sustainability => "sustainability",
            MetricCategory::Innovation => "innovation",
            MetricCategory::ProductMetrics => "product_metrics",
        }
    }
}

impl std::fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overview" => Ok(MetricCategory::Overview),
            "sustainability" => Ok(MetricCategory::Sustainability),
            "innovation" => Ok(MetricCategory::Innovation),
            "product_metrics" => Ok(MetricCategory::ProductMetrics),
            other => Err(format!("unknown metric category: {other}")),
        }
    }
}

/// A generated metric with its provenance. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub name: String,
    pub value: String,
    pub category: MetricCategory,
    /// Clamped to [0.0, 1.0] at creation.
    pub confidence_score: f64,
    /// `{"references": [url], "supporting_data": [text]}`.
    pub raw_data: Value,
    pub generated_at: DateTime<Utc>,
}

/// Lifecycle state of a research job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Pending and in-progress jobs block duplicate submissions.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A tracked research job. Each state transition is committed to the store
/// before the next stage runs, so restarts observe the last checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJob {
    pub job_id: Uuid,
    pub job_type: String,
    /// Normalized (trimmed, lowercased) query the job was created for.
    pub query: String,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub entity_id: Option<Uuid>,
    /// Accumulates stage summaries: the originating query, then
    /// `references_found` / `metrics_generated` on success or `error` on
    /// failure.
    pub result_data: Value,
}

impl ResearchJob {
    /// Create a pending job seeded with the originating query.
    pub fn new(entity_type: EntityType, query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            job_id: Uuid::new_v4(),
            job_type: entity_type.job_type(),
            query: query.clone(),
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            entity_id: None,
            result_data: serde_json::json!({ "query": query }),
        }
    }

    /// Transition pending -> in_progress, stamping started_at.
    pub fn start(&mut self) {
        self.status = JobStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Transition to completed, stamping completed_at.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Transition to failed, recording the error message in result_data.
    /// Failed jobs never carry a completed_at.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.completed_at = None;
        self.merge_result("error", Value::String(error.into()));
    }

    pub fn link_entity(&mut self, entity_id: Uuid) {
        self.entity_id = Some(entity_id);
    }

    /// Merge a key into result_data, preserving existing keys.
    pub fn merge_result(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = &mut self.result_data {
            map.insert(key.to_string(), value);
        } else {
            self.result_data = serde_json::json!({ key: value });
        }
    }
}

/// Normalize a query for job matching: trim and lowercase.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Clamp a model-reported confidence score into [0.0, 1.0].
pub fn clamp_confidence(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}
