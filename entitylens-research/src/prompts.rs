//! Prompt templates for metrics generation.

use entitylens_core::types::{EntityType, MetricCategory};

/// JSON output contract appended to every category prompt.
const OUTPUT_CONTRACT: &str = r#"Output in JSON format:
{
    "metrics": [
        {
            "name": "metric_name",
            "value": "metric_value",
            "confidence_score": 0.0-1.0,
            "references": ["url1", "url2"],
            "supporting_data": ["quote1", "quote2"]
        }
    ]
}"#;

fn reference_list(references: &[String]) -> String {
    references
        .iter()
        .map(|url| format!("- {url}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the analysis prompt for one metric category.
pub fn category_prompt(
    category: MetricCategory,
    entity_name: &str,
    entity_type: EntityType,
    references: &[String],
) -> String {
    let urls = reference_list(references);
    let body = match category {
        MetricCategory::Overview => "Generate a structured analysis with the following metrics:\n\
             1. Company Size (employees range)\n\
             2. Industry Classification\n\
             3. Revenue Range (if public)\n\
             4. Geographic Presence\n\
             5. Key Products/Services\n\
             6. Market Position\n\
             7. Competitive Advantages\n\n\
             For each metric:\n\
             - Provide a confidence score (0-1)\n\
             - Cite specific references used\n\
             - Include relevant quotes or data points"
            .to_string(),
        MetricCategory::Sustainability => "Generate sustainability metrics focusing on:\n\
             1. Environmental Impact\n\
             2. Carbon Footprint\n\
             3. Sustainability Initiatives\n\
             4. Resource Usage\n\
             5. Waste Management\n\
             6. Environmental Certifications\n\n\
             For each metric:\n\
             - Provide a confidence score (0-1)\n\
             - Cite specific references\n\
             - Include quantitative data where available"
            .to_string(),
        MetricCategory::ProductMetrics => "Generate product metrics focusing on:\n\
             1. Market Share\n\
             2. Price Range\n\
             3. Target Audience\n\
             4. Key Features\n\
             5. Customer Satisfaction\n\
             6. Competitive Analysis\n\n\
             For each metric:\n\
             - Provide a confidence score (0-1)\n\
             - Cite specific references\n\
             - Include customer feedback or reviews where available"
            .to_string(),
        MetricCategory::Innovation => format!(
            "Generate innovation metrics for this {entity_type} focusing on:\n\
             1. R&D Investment\n\
             2. Patent Portfolio\n\
             3. Innovation Pipeline\n\
             4. Technology Adoption\n\
             5. Industry Leadership\n\
             6. Future Developments\n\n\
             For each metric:\n\
             - Provide a confidence score (0-1)\n\
             - Cite specific references\n\
             - Include specific innovations or patents where available"
        ),
    };

    format!(
        "Based on the following references about {entity_name}:\n\n{urls}\n\n{body}\n\n{OUTPUT_CONTRACT}"
    )
}

/// System instruction used for every category of an entity.
pub fn system_instruction(entity_type: EntityType, entity_name: &str) -> String {
    format!(
        "You are analyzing {entity_type} metrics for {entity_name}. \
         Focus on extracting factual information from the provided references. \
         If information is uncertain, reflect this in the confidence score."
    )
}
