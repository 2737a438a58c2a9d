//! Classification oracle seam.
//!
//! The oracle is whatever scores content for risk. The pipeline only knows
//! that it takes raw text plus the declared output schema and answers with
//! a JSON value or an error.

pub mod ollama;

pub use ollama::OllamaOracle;

use crate::error::OracleError;
use serde_json::{json, Value};

#[allow(async_fn_in_trait)]
pub trait ClassificationOracle {
    /// Assess `content`, answering in the shape described by `schema`.
    async fn classify(&self, content: &str, schema: &Value) -> Result<Value, OracleError>;
}

/// JSON Schema of the assessment the oracle is asked to return.
pub fn output_schema() -> Value {
    let probability = json!({ "type": "number", "minimum": 0, "maximum": 1 });

    json!({
        "type": "object",
        "properties": {
            "score": { "type": "number", "minimum": 0, "maximum": 100 },
            "label": { "type": "string", "enum": ["No Risk", "Low Risk", "High Risk"] },
            "confidence": probability.clone(),
            "explanation": { "type": "string" },
            "mitigations": { "type": "array", "items": { "type": "string" } },
            "signals": {
                "type": "object",
                "properties": {
                    "reputation": {
                        "type": "object",
                        "properties": {
                            "verdict": { "type": "string", "enum": ["safe", "unsafe", "unknown"] },
                            "details": { "type": "string" }
                        }
                    },
                    "crowdsourced_scan": {
                        "type": "object",
                        "properties": {
                            "positives": { "type": "integer", "minimum": 0 },
                            "total": { "type": "integer", "minimum": 0 },
                            "reputation": { "type": "string" }
                        }
                    },
                    "text_model": {
                        "type": "object",
                        "properties": {
                            "spam_prob": probability.clone(),
                            "misinfo_prob": probability.clone(),
                            "phish_prob": probability,
                            "summary": { "type": "string" }
                        }
                    }
                }
            },
            "extracted_urls": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["score", "label", "confidence", "explanation"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_requires_core_fields() {
        let schema = output_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, vec!["score", "label", "confidence", "explanation"]);
    }

    #[test]
    fn test_schema_declares_all_top_level_fields() {
        let schema = output_schema();
        let props = schema["properties"].as_object().unwrap();
        for field in [
            "score",
            "label",
            "confidence",
            "explanation",
            "mitigations",
            "signals",
            "extracted_urls",
        ] {
            assert!(props.contains_key(field), "missing {}", field);
        }
    }
}
