//! Metrics generation: turn gathered references into confidence-scored,
//! cited metrics via the LLM.

use crate::llm_call::CompletionTool;
use crate::prompts;
use async_trait::async_trait;
use chrono::Utc;
use entitylens_core::error::ToolError;
use entitylens_core::store::ResearchStore;
use entitylens_core::tool::{Tool, ToolRunner};
use entitylens_core::types::{clamp_confidence, EntityType, Metric, MetricCategory};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const TOOL_NAME: &str = "metrics_generation";

/// Tool that generates metrics for every category of an entity type, in
/// declared order, and persists them in one transaction.
///
/// An empty reference list is rejected up front: a job that found nothing
/// to cite cannot produce grounded metrics.
pub struct MetricsGenerationTool {
    runner: Arc<ToolRunner>,
    completion: Arc<CompletionTool>,
    store: Arc<dyn ResearchStore>,
}

impl MetricsGenerationTool {
    pub fn new(
        runner: Arc<ToolRunner>,
        completion: Arc<CompletionTool>,
        store: Arc<dyn ResearchStore>,
    ) -> Self {
        Self {
            runner,
            completion,
            store,
        }
    }

    /// Convert one model-reported metric into a domain record. Entries
    /// without a name or value are dropped.
    fn metric_from_value(
        entity_id: Uuid,
        category: MetricCategory,
        raw: &Value,
    ) -> Option<Metric> {
        let name = raw.get("name")?.as_str()?.to_string();
        let value = raw.get("value")?.as_str()?.to_string();
        let confidence = raw
            .get("confidence_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let references = raw.get("references").cloned().unwrap_or_else(|| json!([]));
        let supporting_data = raw
            .get("supporting_data")
            .cloned()
            .unwrap_or_else(|| json!([]));

        Some(Metric {
            id: Uuid::new_v4(),
            entity_id,
            name,
            value,
            category,
            confidence_score: clamp_confidence(confidence),
            raw_data: json!({
                "references": references,
                "supporting_data": supporting_data,
            }),
            generated_at: Utc::now(),
        })
    }
}

#[async_trait]
impl Tool for MetricsGenerationTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let entity_id = args
            .get("entity_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: "Entity ID is required".to_string(),
            })?;
        Uuid::parse_str(entity_id).map_err(|_| ToolError::InvalidArguments {
            name: TOOL_NAME.into(),
            reason: format!("Invalid entity ID: {entity_id}"),
        })?;

        match args.get("entity_name").and_then(Value::as_str) {
            None | Some("") => {
                return Err(ToolError::InvalidArguments {
                    name: TOOL_NAME.into(),
                    reason: "Entity name is required".to_string(),
                });
            }
            Some(_) => {}
        }

        args.get("entity_type")
            .and_then(Value::as_str)
            .unwrap_or("company")
            .parse::<EntityType>()
            .map_err(|e| ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: e,
            })?;

        let references = args
            .get("references")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: "References must be a list".to_string(),
            })?;
        if references.is_empty() {
            return Err(ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: "At least one reference is required".to_string(),
            });
        }
        Ok(())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let entity_id = Uuid::parse_str(args["entity_id"].as_str().unwrap_or_default())
            .unwrap_or_default();
        let entity_name = args["entity_name"].as_str().unwrap_or_default();
        let entity_type: EntityType = args
            .get("entity_type")
            .and_then(Value::as_str)
            .unwrap_or("company")
            .parse()
            .unwrap_or(EntityType::Company);
        let references: Vec<String> = args["references"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let system_prompt = prompts::system_instruction(entity_type, entity_name);

        let mut metrics = Vec::new();
        for &category in entity_type.metric_categories() {
            let prompt =
                prompts::category_prompt(category, entity_name, entity_type, &references);

            let result = self
                .runner
                .run(
                    self.completion.as_ref(),
                    json!({
                        "prompt": prompt,
                        "system_prompt": system_prompt,
                    }),
                    true,
                )
                .await?;

            let generated = result["data"]["metrics"].as_array().cloned().unwrap_or_default();
            for raw in &generated {
                if let Some(metric) = Self::metric_from_value(entity_id, category, raw) {
                    metrics.push(metric);
                }
            }
        }

        self.store
            .insert_metrics(&metrics)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: TOOL_NAME.into(),
                message: format!("failed to store metrics: {e}"),
            })?;

        info!(
            entity = %entity_name,
            generated = metrics.len(),
            "Metrics generation complete"
        );

        let summaries: Vec<Value> = metrics
            .iter()
            .map(|m| {
                json!({
                    "name": m.name,
                    "value": m.value,
                    "category": m.category,
                    "confidence_score": m.confidence_score,
                })
            })
            .collect();

        Ok(json!({
            "entity_id": entity_id.to_string(),
            "metrics_generated": metrics.len(),
            "metrics": summaries,
            "success": true,
        }))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(900)
    }
}
