//! Entity name validation.
//!
//! Three gates before any research job is created: a profanity check, a
//! character-pattern check, and a length check. Validation never touches
//! the store; a rejected query leaves no trace.

use async_trait::async_trait;
use entitylens_core::error::ToolError;
use entitylens_core::tool::Tool;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

const TOOL_NAME: &str = "entity_validation";

/// Scores how likely a text is profane, in [0, 1]. The real deployment
/// plugs in an external classifier; `WordListClassifier` is the shipped
/// default.
pub trait ProfanityClassifier: Send + Sync {
    fn predict_prob(&self, text: &str) -> f64;
}

/// Word-list profanity classifier. Scores 1.0 when any listed word appears
/// as a token, 0.0 otherwise.
pub struct WordListClassifier {
    words: Vec<String>,
}

impl WordListClassifier {
    pub fn new() -> Self {
        Self {
            words: ["damn", "hell", "crap", "shit", "fuck", "bastard"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_words(words: Vec<String>) -> Self {
        Self { words }
    }
}

impl Default for WordListClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfanityClassifier for WordListClassifier {
    fn predict_prob(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase();
        let profane = lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| self.words.iter().any(|w| w == token));
        if profane { 1.0 } else { 0.0 }
    }
}

/// Tool that validates entity names before research starts.
pub struct EntityValidationTool {
    classifier: Arc<dyn ProfanityClassifier>,
    name_pattern: Regex,
}

impl EntityValidationTool {
    pub fn new(classifier: Arc<dyn ProfanityClassifier>) -> Self {
        Self {
            classifier,
            // Word characters, whitespace, and common punctuation found in
            // legal entity names.
            name_pattern: Regex::new(r#"^[\w\s\-&.,'"]+$"#).expect("static pattern"),
        }
    }

    /// Collapse runs of whitespace and strip characters outside the
    /// allowed set.
    fn sanitize(&self, name: &str) -> String {
        let stripped: String = name
            .chars()
            .filter(|c| {
                c.is_alphanumeric()
                    || c.is_whitespace()
                    || matches!(c, '_' | '-' | '&' | '.' | ',' | '\'' | '"')
            })
            .collect();
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for EntityValidationTool {
    fn default() -> Self {
        Self::new(Arc::new(WordListClassifier::new()))
    }
}

#[async_trait]
impl Tool for EntityValidationTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let name = args.get("name").and_then(Value::as_str);
        match name {
            None => {
                return Err(ToolError::InvalidArguments {
                    name: TOOL_NAME.into(),
                    reason: "Entity name is required".to_string(),
                });
            }
            Some(n) if n.is_empty() => {
                return Err(ToolError::InvalidArguments {
                    name: TOOL_NAME.into(),
                    reason: "Entity name is required".to_string(),
                });
            }
            Some(_) => {}
        }

        if let Some(entity_type) = args.get("entity_type").and_then(Value::as_str) {
            if entity_type != "company" && entity_type != "product" {
                return Err(ToolError::InvalidArguments {
                    name: TOOL_NAME.into(),
                    reason: format!("Invalid entity type: {entity_type}"),
                });
            }
        }
        Ok(())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let name = args["name"].as_str().unwrap_or_default();

        let profanity_score = self.classifier.predict_prob(name);
        let pattern_valid = self.name_pattern.is_match(name);
        let sanitized = self.sanitize(name);
        let length_valid = (2..=200).contains(&sanitized.chars().count());

        let profanity_ok = profanity_score < 0.5;
        let is_valid = profanity_ok && pattern_valid && length_valid;

        Ok(json!({
            "valid": is_valid,
            "sanitized_name": sanitized,
            "confidence_score": 1.0 - profanity_score,
            "validation_details": {
                "profanity_check": profanity_ok,
                "pattern_valid": pattern_valid,
                "length_valid": length_valid,
            }
        }))
    }
}
