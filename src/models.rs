//! Data models for the risk classifier.
//!
//! This module contains the staged input items, the canonical
//! `AnalysisRecord` persisted by the store, and the summary structures
//! computed over sets of records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    File,
    Url,
    Manual,
}

impl InputKind {
    /// Display name used when the user did not supply one.
    pub fn default_name(&self) -> &'static str {
        match self {
            InputKind::File => "Uploaded File",
            InputKind::Url => "URL Input",
            InputKind::Manual => "Manual Text",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::File => write!(f, "file"),
            InputKind::Url => write!(f, "url"),
            InputKind::Manual => write!(f, "manual"),
        }
    }
}

/// Lifecycle of a staged item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Submitting,
    Done,
    Failed,
}

/// A unit of content waiting in the staging queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedItem {
    pub id: String,
    pub kind: InputKind,
    /// Raw text, already decoded if it came from a file.
    pub content: String,
    pub name: String,
    pub status: ItemStatus,
}

/// Risk label reported by the classifier.
///
/// Labels the classifier invents outside the three known ones are kept
/// verbatim as `Unrecognized` so rollups can drop them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RiskLabel {
    NoRisk,
    LowRisk,
    HighRisk,
    Unrecognized(String),
}

impl RiskLabel {
    /// The three labels that count in rollups, lowest risk first.
    pub const KNOWN: [RiskLabel; 3] = [RiskLabel::NoRisk, RiskLabel::LowRisk, RiskLabel::HighRisk];

    /// Parse a label, tolerating spacing, case, and separator variations.
    pub fn parse(s: &str) -> Self {
        let folded: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "norisk" => RiskLabel::NoRisk,
            "lowrisk" => RiskLabel::LowRisk,
            "highrisk" => RiskLabel::HighRisk,
            _ => RiskLabel::Unrecognized(s.to_string()),
        }
    }

    /// Label implied by a score under the dashboard's color thresholds.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=19 => RiskLabel::NoRisk,
            20..=59 => RiskLabel::LowRisk,
            _ => RiskLabel::HighRisk,
        }
    }

    /// Rank for threshold comparisons; unrecognized labels rank below everything.
    pub fn rank(&self) -> Option<u8> {
        match self {
            RiskLabel::NoRisk => Some(0),
            RiskLabel::LowRisk => Some(1),
            RiskLabel::HighRisk => Some(2),
            RiskLabel::Unrecognized(_) => None,
        }
    }

    /// Returns an emoji representation of the label.
    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLabel::NoRisk => "🟢",
            RiskLabel::LowRisk => "🟡",
            RiskLabel::HighRisk => "🔴",
            RiskLabel::Unrecognized(_) => "⚪",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLabel::NoRisk => write!(f, "No Risk"),
            RiskLabel::LowRisk => write!(f, "Low Risk"),
            RiskLabel::HighRisk => write!(f, "High Risk"),
            RiskLabel::Unrecognized(s) => write!(f, "{}", s),
        }
    }
}

impl From<String> for RiskLabel {
    fn from(s: String) -> Self {
        RiskLabel::parse(&s)
    }
}

impl From<RiskLabel> for String {
    fn from(label: RiskLabel) -> Self {
        label.to_string()
    }
}

/// Verdict of the reputation facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Unsafe,
    Unknown,
}

impl Verdict {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "safe" => Verdict::Safe,
            "unsafe" => Verdict::Unsafe,
            _ => Verdict::Unknown,
        }
    }
}

/// URL/domain reputation lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationSignal {
    pub verdict: Verdict,
    #[serde(default)]
    pub details: String,
}

/// Multi-engine scan result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSignal {
    pub positives: u32,
    pub total: u32,
    #[serde(default)]
    pub reputation: String,
}

/// Text model probabilities. Each probability is absent when not reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextModelSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spam_prob: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misinfo_prob: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phish_prob: Option<f64>,
    #[serde(default)]
    pub summary: String,
}

/// Structured sub-assessment. Absent facets mean "no data", not "no risk".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation: Option<ReputationSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crowdsourced_scan: Option<ScanSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_model: Option<TextModelSignal>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.reputation.is_none() && self.crowdsourced_scan.is_none() && self.text_model.is_none()
    }
}

/// A normalized classification that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnalysis {
    pub input_type: InputKind,
    pub raw_text: String,
    pub file_name: Option<String>,
    pub extracted_urls: Vec<String>,
    pub score: u8,
    pub label: RiskLabel,
    pub confidence: f64,
    pub explanation: String,
    pub mitigations: Vec<String>,
    pub signals: Signals,
}

/// The canonical, persisted classification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub input_type: InputKind,
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub extracted_urls: Vec<String>,
    pub score: u8,
    pub label: RiskLabel,
    pub confidence: f64,
    pub explanation: String,
    #[serde(default)]
    pub mitigations: Vec<String>,
    #[serde(default)]
    pub signals: Signals,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Stamp a normalized analysis with its store-assigned identity.
    pub fn from_new(id: String, created_at: DateTime<Utc>, new: NewAnalysis) -> Self {
        Self {
            id,
            input_type: new.input_type,
            raw_text: new.raw_text,
            file_name: new.file_name,
            extracted_urls: new.extracted_urls,
            score: new.score,
            label: new.label,
            confidence: new.confidence,
            explanation: new.explanation,
            mitigations: new.mitigations,
            signals: new.signals,
            created_at,
        }
    }

    /// Display name: the file name when present, else the input kind.
    pub fn display_name(&self) -> &str {
        self.file_name
            .as_deref()
            .unwrap_or_else(|| self.input_type.default_name())
    }
}

/// Record counts per known label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    #[serde(rename = "No Risk")]
    pub no_risk: usize,
    #[serde(rename = "Low Risk")]
    pub low_risk: usize,
    #[serde(rename = "High Risk")]
    pub high_risk: usize,
}

impl RiskDistribution {
    pub fn total(&self) -> usize {
        self.no_risk + self.low_risk + self.high_risk
    }

    pub fn count(&self, label: &RiskLabel) -> usize {
        match label {
            RiskLabel::NoRisk => self.no_risk,
            RiskLabel::LowRisk => self.low_risk,
            RiskLabel::HighRisk => self.high_risk,
            RiskLabel::Unrecognized(_) => 0,
        }
    }
}

/// Record counts per input kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDistribution {
    pub manual: usize,
    pub file: usize,
    pub url: usize,
}

/// Rollup over a set of records, as shown for a batch or the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub total: usize,
    pub risk: RiskDistribution,
    pub types: TypeDistribution,
    pub average_score: f64,
}
