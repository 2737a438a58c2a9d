//! Maps raw oracle output onto the canonical record shape.
//!
//! `normalize` is a pure function: no I/O, no clock, no ids. Required
//! fields must be present and well-typed, list fields default to empty,
//! and every signal facet stays `None` unless the oracle reported it.

use crate::error::ValidationError;
use crate::models::{
    NewAnalysis, ReputationSignal, RiskLabel, ScanSignal, Signals, StagedItem,
    TextModelSignal, Verdict,
};
use serde_json::{Map, Value};
use tracing::warn;

/// Normalize one oracle response for the item it classified.
pub fn normalize(item: &StagedItem, output: &Value) -> Result<NewAnalysis, ValidationError> {
    let obj = output.as_object().ok_or(ValidationError::NotAnObject)?;

    let score = required_number(obj, "score")?;
    if !(0.0..=100.0).contains(&score) {
        return Err(ValidationError::OutOfRange {
            field: "score",
            value: score,
        });
    }
    let score = score.round() as u8;

    let label = RiskLabel::parse(required_str(obj, "label")?);
    match &label {
        RiskLabel::Unrecognized(raw) => {
            warn!("Oracle returned unrecognized label '{}' for item {}", raw, item.id);
        }
        known if *known != RiskLabel::from_score(score) => {
            warn!(
                "Oracle label '{}' disagrees with score {} for item {}; keeping the label",
                known, score, item.id
            );
        }
        _ => {}
    }

    let confidence =
        probability(obj, "confidence")?.ok_or(ValidationError::MissingField("confidence"))?;
    let explanation = required_str(obj, "explanation")?.to_string();

    let mitigations = string_list(obj, "mitigations")?;
    let extracted_urls = string_list(obj, "extracted_urls")?;
    let signals = match present(obj, "signals") {
        None => Signals::default(),
        Some(Value::Object(signals)) => parse_signals(signals)?,
        Some(_) => {
            return Err(ValidationError::WrongType {
                field: "signals",
                expected: "object",
            })
        }
    };

    let file_name = (!item.name.is_empty()).then(|| item.name.clone());

    Ok(NewAnalysis {
        input_type: item.kind,
        raw_text: item.content.clone(),
        file_name,
        extracted_urls,
        score,
        label,
        confidence,
        explanation,
        mitigations,
        signals,
    })
}

/// A field counts as present unless it is missing or JSON `null`.
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

/// First present key among aliases.
fn present_any<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| present(obj, k))
}

fn required_number(obj: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    let value = present(obj, field).ok_or(ValidationError::MissingField(field))?;
    as_finite(value, field)
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    present(obj, field)
        .ok_or(ValidationError::MissingField(field))?
        .as_str()
        .ok_or(ValidationError::WrongType {
            field,
            expected: "string",
        })
}

fn as_finite(value: &Value, field: &'static str) -> Result<f64, ValidationError> {
    let n = value.as_f64().ok_or(ValidationError::WrongType {
        field,
        expected: "number",
    })?;
    if !n.is_finite() {
        return Err(ValidationError::OutOfRange { field, value: n });
    }
    Ok(n)
}

/// Optional number constrained to [0, 1].
fn probability(obj: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, ValidationError> {
    let Some(value) = present(obj, field) else {
        return Ok(None);
    };
    let p = as_finite(value, field)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(ValidationError::OutOfRange { field, value: p });
    }
    Ok(Some(p))
}

fn string_list(obj: &Map<String, Value>, field: &'static str) -> Result<Vec<String>, ValidationError> {
    let wrong_type = ValidationError::WrongType {
        field,
        expected: "array of strings",
    };

    match present(obj, field) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(String::from).ok_or_else(|| wrong_type.clone()))
            .collect(),
        Some(_) => Err(wrong_type),
    }
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> String {
    present(obj, field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn facet<'a>(
    signals: &'a Map<String, Value>,
    keys: &[&str],
    field: &'static str,
) -> Result<Option<&'a Map<String, Value>>, ValidationError> {
    match present_any(signals, keys) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(ValidationError::WrongType {
            field,
            expected: "object",
        }),
    }
}

fn parse_signals(signals: &Map<String, Value>) -> Result<Signals, ValidationError> {
    let reputation = facet(signals, &["reputation", "safe_browsing"], "signals.reputation")?.map(
        |rep| ReputationSignal {
            verdict: present(rep, "verdict")
                .and_then(Value::as_str)
                .map(Verdict::parse)
                .unwrap_or(Verdict::Unknown),
            details: optional_str(rep, "details"),
        },
    );

    let crowdsourced_scan = match facet(
        signals,
        &["crowdsourced_scan", "virustotal"],
        "signals.crowdsourced_scan",
    )? {
        None => None,
        Some(scan) => {
            let positives = count(scan, "positives", "signals.crowdsourced_scan.positives")?;
            let total = count(scan, "total", "signals.crowdsourced_scan.total")?;
            if positives > total {
                return Err(ValidationError::OutOfRange {
                    field: "signals.crowdsourced_scan.positives",
                    value: f64::from(positives),
                });
            }
            Some(ScanSignal {
                positives,
                total,
                reputation: optional_str(scan, "reputation"),
            })
        }
    };

    let text_model = match facet(signals, &["text_model"], "signals.text_model")? {
        None => None,
        Some(model) => Some(TextModelSignal {
            spam_prob: probability(model, "spam_prob")?,
            misinfo_prob: probability(model, "misinfo_prob")?,
            phish_prob: probability(model, "phish_prob")?,
            summary: optional_str(model, "summary"),
        }),
    };

    Ok(Signals {
        reputation,
        crowdsourced_scan,
        text_model,
    })
}

/// Non-negative whole count; a missing count reads as zero.
fn count(obj: &Map<String, Value>, key: &str, field: &'static str) -> Result<u32, ValidationError> {
    let Some(value) = present(obj, key) else {
        return Ok(0);
    };
    let n = as_finite(value, field)?;
    if n < 0.0 || n > f64::from(u32::MAX) {
        return Err(ValidationError::OutOfRange { field, value: n });
    }
    Ok(n.round() as u32)
}
