//! Rollups and filtering over analysis records.
//!
//! Everything here is a pure function over a slice of records: no I/O,
//! and the input is never reordered or mutated.

use crate::models::{
    AnalysisRecord, InputKind, RiskDistribution, RiskLabel, RiskSummary, TypeDistribution,
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Label restriction for history views.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LabelFilter {
    #[default]
    All,
    Label(RiskLabel),
}

impl LabelFilter {
    pub fn matches(&self, label: &RiskLabel) -> bool {
        match self {
            LabelFilter::All => true,
            LabelFilter::Label(wanted) => wanted == label,
        }
    }
}

impl FromStr for LabelFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(LabelFilter::All);
        }
        match RiskLabel::parse(s) {
            RiskLabel::Unrecognized(_) => Err(format!(
                "unknown label filter '{}', expected all, no-risk, low-risk or high-risk",
                s
            )),
            label => Ok(LabelFilter::Label(label)),
        }
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelFilter::All => write!(f, "all"),
            LabelFilter::Label(label) => write!(f, "{}", label),
        }
    }
}

/// Count records per known label. Unrecognized labels are not counted.
pub fn risk_distribution(records: &[AnalysisRecord]) -> RiskDistribution {
    let mut dist = RiskDistribution::default();

    for record in records {
        match record.label {
            RiskLabel::NoRisk => dist.no_risk += 1,
            RiskLabel::LowRisk => dist.low_risk += 1,
            RiskLabel::HighRisk => dist.high_risk += 1,
            RiskLabel::Unrecognized(_) => {}
        }
    }

    dist
}

/// Count records per input kind.
pub fn type_distribution(records: &[AnalysisRecord]) -> TypeDistribution {
    let mut dist = TypeDistribution::default();

    for record in records {
        match record.input_type {
            InputKind::Manual => dist.manual += 1,
            InputKind::File => dist.file += 1,
            InputKind::Url => dist.url += 1,
        }
    }

    dist
}

/// Mean score, or 0 for no records.
pub fn average_score(records: &[AnalysisRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let sum: u64 = records.iter().map(|r| u64::from(r.score)).sum();
    sum as f64 / records.len() as f64
}

/// Records matching the search term and label filter, in their original order.
///
/// The search term matches `raw_text` or `explanation` as a case-insensitive
/// substring; an empty term matches everything.
pub fn filter_records<'a>(
    records: &'a [AnalysisRecord],
    search: &str,
    label: &LabelFilter,
) -> Vec<&'a AnalysisRecord> {
    let needle = search.to_lowercase();

    records
        .iter()
        .filter(|r| {
            needle.is_empty()
                || r.raw_text.to_lowercase().contains(&needle)
                || r.explanation.to_lowercase().contains(&needle)
        })
        .filter(|r| label.matches(&r.label))
        .collect()
}

/// Full rollup for a batch or dashboard.
pub fn summarize(records: &[AnalysisRecord]) -> RiskSummary {
    RiskSummary {
        total: records.len(),
        risk: risk_distribution(records),
        types: type_distribution(records),
        average_score: average_score(records),
    }
}

/// The `n` highest-scoring records, ties in original order.
pub fn highest_risk(records: &[AnalysisRecord], n: usize) -> Vec<&AnalysisRecord> {
    let mut sorted: Vec<&AnalysisRecord> = records.iter().collect();
    sorted.sort_by_key(|r| std::cmp::Reverse(r.score));
    sorted.truncate(n);
    sorted
}

/// Mitigations recommended more than once, most frequent first.
pub fn common_mitigations(records: &[AnalysisRecord]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for mitigation in records.iter().flat_map(|r| &r.mitigations) {
        *counts.entry(mitigation.trim().to_string()).or_default() += 1;
    }

    let mut repeated: Vec<_> = counts.into_iter().filter(|(_, count)| *count > 1).collect();
    repeated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    repeated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signals;
    use chrono::Utc;

    fn create_test_record(text: &str, score: u8, label: RiskLabel, kind: InputKind) -> AnalysisRecord {
        AnalysisRecord {
            id: format!("id-{}", text),
            input_type: kind,
            raw_text: text.to_string(),
            file_name: None,
            extracted_urls: vec![],
            score,
            label,
            confidence: 0.9,
            explanation: format!("Assessment of {}", text),
            mitigations: vec![],
            signals: Signals::default(),
            created_at: Utc::now(),
        }
    }

    fn sample() -> Vec<AnalysisRecord> {
        vec![
            create_test_record("Free money now", 92, RiskLabel::HighRisk, InputKind::Manual),
            create_test_record("http://example.com", 3, RiskLabel::NoRisk, InputKind::Url),
            create_test_record("invoice.txt", 45, RiskLabel::LowRisk, InputKind::File),
            create_test_record(
                "weird",
                50,
                RiskLabel::Unrecognized("Medium".to_string()),
                InputKind::Manual,
            ),
        ]
    }

    #[test]
    fn test_risk_distribution_drops_unrecognized_labels() {
        let records = sample();
        let dist = risk_distribution(&records);

        assert_eq!(dist.no_risk, 1);
        assert_eq!(dist.low_risk, 1);
        assert_eq!(dist.high_risk, 1);
        assert_eq!(dist.total(), 3);
        assert_ne!(dist.total(), records.len());
    }

    #[test]
    fn test_type_distribution() {
        let dist = type_distribution(&sample());
        assert_eq!(dist.manual, 2);
        assert_eq!(dist.url, 1);
        assert_eq!(dist.file, 1);
    }

    #[test]
    fn test_average_score() {
        assert_eq!(average_score(&[]), 0.0);

        let records = vec![
            create_test_record("a", 92, RiskLabel::HighRisk, InputKind::Manual),
            create_test_record("b", 3, RiskLabel::NoRisk, InputKind::Url),
        ];
        assert_eq!(average_score(&records), 47.5);
    }

    #[test]
    fn test_filter_identity_under_empty_filters() {
        let records = sample();
        let filtered = filter_records(&records, "", &LabelFilter::All);
        let expected: Vec<&AnalysisRecord> = records.iter().collect();
        assert_eq!(filtered, expected);
    }

    #[test]
    fn test_filter_search_is_case_insensitive_over_text_and_explanation() {
        let records = sample();

        let by_text = filter_records(&records, "FREE MONEY", &LabelFilter::All);
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].raw_text, "Free money now");

        let by_explanation = filter_records(&records, "assessment of http", &LabelFilter::All);
        assert_eq!(by_explanation.len(), 1);
        assert_eq!(by_explanation[0].input_type, InputKind::Url);
    }

    #[test]
    fn test_filter_by_label_and_search_together() {
        let records = sample();
        let high = LabelFilter::Label(RiskLabel::HighRisk);

        assert_eq!(filter_records(&records, "", &high).len(), 1);
        assert!(filter_records(&records, "invoice", &high).is_empty());
    }

    #[test]
    fn test_filter_is_idempotent_and_order_preserving() {
        let records = sample();
        let label = LabelFilter::All;

        let once: Vec<AnalysisRecord> = filter_records(&records, "e", &label)
            .into_iter()
            .cloned()
            .collect();
        let twice: Vec<AnalysisRecord> = filter_records(&once, "e", &label)
            .into_iter()
            .cloned()
            .collect();

        assert_eq!(once, twice);
        let positions: Vec<_> = once
            .iter()
            .map(|r| records.iter().position(|o| o.id == r.id).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_label_filter_parsing() {
        assert_eq!("all".parse::<LabelFilter>(), Ok(LabelFilter::All));
        assert_eq!(
            "No Risk".parse::<LabelFilter>(),
            Ok(LabelFilter::Label(RiskLabel::NoRisk))
        );
        assert!("medium".parse::<LabelFilter>().is_err());
    }

    #[test]
    fn test_highest_risk() {
        let records = sample();
        let top = highest_risk(&records, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].score, 92);
        assert_eq!(top[1].score, 50);
    }

    #[test]
    fn test_common_mitigations() {
        let mut records = sample();
        records[0].mitigations = vec!["Do not click".to_string(), "Report it".to_string()];
        records[1].mitigations = vec!["Do not click".to_string()];

        let common = common_mitigations(&records);
        assert_eq!(common, vec![("Do not click".to_string(), 2)]);
    }

    #[test]
    fn test_summarize() {
        let summary = summarize(&sample());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.risk.total(), 3);
        assert_eq!(summary.average_score, 47.5);
    }
}
