//! Reference gathering: scrape search engine result pages for URLs about
//! an entity and persist them as sources.

use crate::browse::PageExtractTool;
use async_trait::async_trait;
use entitylens_core::config::SearchConfig;
use entitylens_core::error::ToolError;
use entitylens_core::store::ResearchStore;
use entitylens_core::tool::{Tool, ToolRunner};
use entitylens_core::types::{EntityType, Source};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

const TOOL_NAME: &str = "reference_gathering";

/// Tool that queries each configured search engine with templated queries,
/// harvests result links, and stores them as sources.
///
/// Individual fetch failures are tolerated; the stage fails only when
/// every engine x query fetch failed. Page fetches go through the runner
/// so identical searches hit the result cache.
pub struct ReferenceGatheringTool {
    runner: Arc<ToolRunner>,
    page_extract: Arc<PageExtractTool>,
    store: Arc<dyn ResearchStore>,
    search: SearchConfig,
}

impl ReferenceGatheringTool {
    pub fn new(
        runner: Arc<ToolRunner>,
        page_extract: Arc<PageExtractTool>,
        store: Arc<dyn ResearchStore>,
        search: SearchConfig,
    ) -> Self {
        Self {
            runner,
            page_extract,
            store,
            search,
        }
    }

    fn search_queries(entity_name: &str, entity_type: EntityType) -> Vec<String> {
        let type_specific = match entity_type {
            EntityType::Company => format!("{entity_name} company profile"),
            EntityType::Product => format!("{entity_name} product details"),
        };
        vec![
            format!("{entity_name} {entity_type} overview"),
            format!("{entity_name} official website"),
            format!("{entity_name} about us"),
            type_specific,
        ]
    }

    /// Accept only well-formed http(s) URLs whose host is off the
    /// blacklist.
    fn is_valid_reference(&self, candidate: &str) -> bool {
        let Ok(parsed) = Url::parse(candidate) else {
            return false;
        };
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        !self
            .search
            .domain_blacklist
            .iter()
            .any(|blocked| host == blocked || host.ends_with(&format!(".{blocked}")))
    }

    /// Links harvested from one result page, tagged with the engine.
    fn harvest_links(&self, extract: &Value, selector: &str, engine: &str) -> Vec<(String, String)> {
        extract["elements"][selector]
            .as_array()
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|el| el["href"].as_str())
                    .filter(|href| self.is_valid_reference(href))
                    .take(self.search.max_results_per_query)
                    .map(|href| (href.to_string(), engine.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Tool for ReferenceGatheringTool {
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

        let entity_type = args
            .get("entity_type")
            .and_then(Value::as_str)
            .unwrap_or("company");
        entity_type
            .parse::<EntityType>()
            .map_err(|e| ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: e,
            })?;
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

        let queries = Self::search_queries(entity_name, entity_type);

        let mut candidates: Vec<(String, String)> = Vec::new();
        let mut attempts = 0usize;
        let mut successes = 0usize;

        for engine in &self.search.engines {
            for query in &queries {
                attempts += 1;
                let search_url = engine
                    .url_template
                    .replace("{query}", &urlencoding::encode(query));

                let fetch = self
                    .runner
                    .run(
                        self.page_extract.as_ref(),
                        json!({
                            "url": search_url,
                            "selectors": [engine.result_selector],
                            "wait_for": "body",
                        }),
                        true,
                    )
                    .await;

                match fetch {
                    Ok(extract) => {
                        successes += 1;
                        candidates.extend(self.harvest_links(
                            &extract,
                            &engine.result_selector,
                            &engine.name,
                        ));
                    }
                    Err(e) => {
                        warn!(
                            engine = %engine.name,
                            query = %query,
                            error = %e,
                            "Search fetch failed, continuing with remaining queries"
                        );
                    }
                }
            }
        }

        if attempts > 0 && successes == 0 {
            return Err(ToolError::ExecutionFailed {
                name: TOOL_NAME.into(),
                message: format!("all {attempts} search fetches failed"),
            });
        }

        // Exact-URL dedup, first occurrence wins.
        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        for (url, engine) in candidates {
            if seen.insert(url.clone()) {
                sources.push(Source::new(entity_id, url, "web", engine));
            }
        }

        self.store
            .insert_sources(&sources)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: TOOL_NAME.into(),
                message: format!("failed to store references: {e}"),
            })?;

        info!(
            entity = %entity_name,
            found = sources.len(),
            "Reference gathering complete"
        );

        let references: Vec<&str> = sources.iter().map(|s| s.url.as_str()).collect();
        Ok(json!({
            "entity_id": entity_id.to_string(),
            "references_found": sources.len(),
            "references": references,
            "success": true,
        }))
    }

    // Search pages change constantly; never serve a stale gathering pass
    // from cache.
    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(600)
    }
}
