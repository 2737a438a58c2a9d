//! CSV and JSON exports of analysis records.

use crate::analysis::{average_score, risk_distribution, type_distribution, BatchReport};
use crate::models::{AnalysisRecord, RiskDistribution, TypeDistribution};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// CSV header row.
pub const CSV_HEADER: [&str; 5] = ["Text", "Score", "Label", "Confidence", "Explanation"];

const TEXT_PREVIEW_CHARS: usize = 50;
const EXPLANATION_PREVIEW_CHARS: usize = 100;

/// Dashboard export: totals, distributions and every record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardExport<'a> {
    pub total_analyses: usize,
    pub risk_distribution: RiskDistribution,
    pub type_distribution: TypeDistribution,
    pub average_score: f64,
    pub all_analyses: &'a [AnalysisRecord],
}

/// Outcome of `analyze --format json`: stored records plus the items that failed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExport<'a> {
    pub records: Vec<&'a AnalysisRecord>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub item_id: String,
    pub error: String,
}

/// One header line plus one line per record; every field quoted.
pub fn generate_csv(records: &[AnalysisRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(csv_row(CSV_HEADER.iter().map(|s| s.to_string())));

    for record in records {
        lines.push(csv_row([
            preview(&record.raw_text, TEXT_PREVIEW_CHARS),
            record.score.to_string(),
            record.label.to_string(),
            format!("{}%", (record.confidence * 100.0).round()),
            preview(&record.explanation, EXPLANATION_PREVIEW_CHARS),
        ]));
    }

    lines.join("\n")
}

/// Pretty-printed JSON array of full records.
pub fn generate_json(records: &[AnalysisRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).map_err(Into::into)
}

/// Pretty-printed dashboard document.
pub fn generate_dashboard(records: &[AnalysisRecord]) -> Result<String> {
    let export = DashboardExport {
        total_analyses: records.len(),
        risk_distribution: risk_distribution(records),
        type_distribution: type_distribution(records),
        average_score: average_score(records),
        all_analyses: records,
    };
    serde_json::to_string_pretty(&export).map_err(Into::into)
}

/// Pretty-printed batch outcome, failures included.
pub fn generate_batch_json(batch: &BatchReport) -> Result<String> {
    let export = BatchExport {
        records: batch.records(),
        failures: batch
            .failures()
            .into_iter()
            .map(|(item_id, error)| BatchFailure {
                item_id: item_id.to_string(),
                error: error.to_string(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&export).map_err(Into::into)
}

/// Write an export to `path`, or to stdout when no path is given.
pub fn write_output(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Failed to write export to {}", path.display())),
        None => write_stream(&mut std::io::stdout().lock(), content),
    }
}

/// The document and a trailing newline, nothing else.
fn write_stream<W: Write>(out: &mut W, content: &str) -> Result<()> {
    writeln!(out, "{}", content).context("Failed to write export to stdout")?;
    out.flush().context("Failed to flush stdout")
}

fn csv_row(cells: impl IntoIterator<Item = String>) -> String {
    cells
        .into_iter()
        .map(|cell| format!("\"{}\"", cell.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}

/// First `max` characters on a single line, with `...` if anything was cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();

    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
