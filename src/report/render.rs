//! Terminal views of staged items, analyses and rollups.

use super::export::preview;
use crate::models::{AnalysisRecord, RiskLabel, RiskSummary, Signals, StagedItem};

const TABLE_TEXT_CHARS: usize = 40;

/// The staging queue, as printed by `analyze --dry-run`.
pub fn render_staged(items: &[StagedItem]) -> String {
    let mut output = String::new();

    if items.is_empty() {
        output.push_str("   Nothing staged.\n");
        return output;
    }

    output.push_str(&format!("   {} items staged:\n\n", items.len()));
    for item in items {
        output.push_str(&format!(
            "     📄 [{}] {} ({} chars)\n",
            item.kind,
            item.name,
            item.content.chars().count()
        ));
    }

    output
}

/// One line per analysis: label, score, confidence, name and a text preview.
pub fn render_record_table(records: &[&AnalysisRecord]) -> String {
    let mut table = String::new();

    if records.is_empty() {
        table.push_str("   No analyses found.\n");
        return table;
    }

    table.push_str(&format!(
        "   {:<2} {:<10} {:>5} {:>5}  {:<20} {:<19}  {}\n",
        "", "Label", "Score", "Conf", "Source", "Created", "Text"
    ));

    for record in records {
        table.push_str(&format!(
            "   {:<2} {:<10} {:>5} {:>4.0}%  {:<20} {:<19}  {}\n",
            record.label.emoji(),
            record.label.to_string(),
            record.score,
            record.confidence * 100.0,
            preview(record.display_name(), 20),
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            preview(&record.raw_text, TABLE_TEXT_CHARS),
        ));
        table.push_str(&format!("      id: {}\n", record.id));
    }

    table
}

/// Full view of a single analysis.
pub fn render_record_detail(record: &AnalysisRecord) -> String {
    let mut detail = String::new();

    detail.push_str(&format!(
        "{} {} (score {}/100, confidence {:.0}%)\n\n",
        record.label.emoji(),
        record.label,
        record.score,
        record.confidence * 100.0
    ));
    detail.push_str(&format!("   ID:      {}\n", record.id));
    detail.push_str(&format!("   Source:  {} ({})\n", record.display_name(), record.input_type));
    detail.push_str(&format!(
        "   Created: {}\n\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    detail.push_str("📝 Content:\n");
    for line in record.raw_text.lines() {
        detail.push_str(&format!("   {}\n", line));
    }
    detail.push('\n');

    if !record.explanation.is_empty() {
        detail.push_str(&format!("💬 Explanation: {}\n\n", record.explanation));
    }

    if !record.mitigations.is_empty() {
        detail.push_str("💡 Mitigations:\n");
        for (i, mitigation) in record.mitigations.iter().enumerate() {
            detail.push_str(&format!("   {}. {}\n", i + 1, mitigation));
        }
        detail.push('\n');
    }

    if !record.extracted_urls.is_empty() {
        detail.push_str("🔗 URLs:\n");
        for url in &record.extracted_urls {
            detail.push_str(&format!("   - {}\n", url));
        }
        detail.push('\n');
    }

    detail.push_str(&render_signals(&record.signals));

    detail
}

/// Signal facets; absent facets are shown as having no data.
fn render_signals(signals: &Signals) -> String {
    let mut section = String::new();

    if signals.is_empty() {
        section.push_str("📡 Signals: no data\n");
        return section;
    }

    section.push_str("📡 Signals:\n");

    match signals.reputation {
        Some(ref reputation) => section.push_str(&format!(
            "   Reputation:        {:?} {}\n",
            reputation.verdict, reputation.details
        )),
        None => section.push_str("   Reputation:        no data\n"),
    }

    match signals.crowdsourced_scan {
        Some(ref scan) => section.push_str(&format!(
            "   Crowdsourced scan: {}/{} engines flagged {}\n",
            scan.positives, scan.total, scan.reputation
        )),
        None => section.push_str("   Crowdsourced scan: no data\n"),
    }

    match signals.text_model {
        Some(ref model) => {
            section.push_str(&format!(
                "   Text model:        spam {} | misinformation {} | phishing {}\n",
                percent(model.spam_prob),
                percent(model.misinfo_prob),
                percent(model.phish_prob)
            ));
            if !model.summary.is_empty() {
                section.push_str(&format!("                      {}\n", model.summary));
            }
        }
        None => section.push_str("   Text model:        no data\n"),
    }

    section
}

fn percent(probability: Option<f64>) -> String {
    match probability {
        Some(p) => format!("{:.0}%", p * 100.0),
        None => "n/a".to_string(),
    }
}

/// Label and input-type breakdown for a set of analyses.
pub fn render_summary(summary: &RiskSummary) -> String {
    let mut section = String::new();

    section.push_str("📊 Summary:\n");
    section.push_str(&format!("   Total analyses: {}\n", summary.total));

    let known = summary.risk.total();
    for label in RiskLabel::KNOWN {
        let count = summary.risk.count(&label);
        section.push_str(&format!(
            "   {} {:<10} {:>4}  ({:.0}%)\n",
            label.emoji(),
            label.to_string(),
            count,
            share(count, known)
        ));
    }
    if known < summary.total {
        section.push_str(&format!(
            "   ⚪ {:<10} {:>4}\n",
            "Other",
            summary.total - known
        ));
    }

    section.push_str(&format!(
        "   Sources: {} manual | {} file | {} url\n",
        summary.types.manual, summary.types.file, summary.types.url
    ));
    section.push_str(&format!("   Average score: {:.1}\n", summary.average_score));

    section
}

/// Dashboard view: summary, riskiest analyses and recurring mitigations.
pub fn render_stats(
    summary: &RiskSummary,
    highest: &[&AnalysisRecord],
    mitigations: &[(String, usize)],
) -> String {
    let mut output = render_summary(summary);
    output.push('\n');

    if !highest.is_empty() {
        output.push_str("🔥 Highest risk:\n");
        for record in highest {
            output.push_str(&format!(
                "   {} {:>3}  {}  ({})\n",
                record.label.emoji(),
                record.score,
                preview(&record.raw_text, TABLE_TEXT_CHARS),
                record.id
            ));
        }
        output.push('\n');
    }

    if !mitigations.is_empty() {
        output.push_str("💡 Most common mitigations:\n");
        for (mitigation, count) in mitigations {
            output.push_str(&format!("   {:>3}x {}\n", count, mitigation));
        }
        output.push('\n');
    }

    output
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize;
    use crate::models::{InputKind, ItemStatus, ScanSignal};
    use chrono::Utc;

    fn create_test_record(label: RiskLabel, score: u8) -> AnalysisRecord {
        AnalysisRecord {
            id: format!("id-{}", score),
            input_type: InputKind::Url,
            raw_text: "http://login-verify.example.com".to_string(),
            file_name: Some("URL Input".to_string()),
            extracted_urls: vec!["http://login-verify.example.com".to_string()],
            score,
            label,
            confidence: 0.75,
            explanation: "Credential harvesting domain".to_string(),
            mitigations: vec!["Do not enter credentials".to_string()],
            signals: Signals {
                crowdsourced_scan: Some(ScanSignal {
                    positives: 7,
                    total: 70,
                    reputation: "malicious".to_string(),
                }),
                ..Signals::default()
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_record_table() {
        let record = create_test_record(RiskLabel::HighRisk, 91);
        let table = render_record_table(&[&record]);

        assert!(table.contains("High Risk"));
        assert!(table.contains("91"));
        assert!(table.contains("75%"));
        assert!(table.contains("id: id-91"));
    }

    #[test]
    fn test_render_empty_table() {
        assert!(render_record_table(&[]).contains("No analyses found"));
    }

    #[test]
    fn test_render_detail_marks_missing_facets() {
        let record = create_test_record(RiskLabel::HighRisk, 91);
        let detail = render_record_detail(&record);

        assert!(detail.contains("Credential harvesting domain"));
        assert!(detail.contains("1. Do not enter credentials"));
        assert!(detail.contains("7/70 engines"));
        assert!(detail.contains("Reputation:        no data"));
        assert!(detail.contains("Text model:        no data"));
    }

    #[test]
    fn test_render_summary_counts_unrecognized_as_other() {
        let records = vec![
            create_test_record(RiskLabel::HighRisk, 90),
            create_test_record(RiskLabel::NoRisk, 5),
            create_test_record(RiskLabel::Unrecognized("Critical".to_string()), 99),
        ];
        let text = render_summary(&summarize(&records));

        assert!(text.contains("Total analyses: 3"));
        assert!(text.contains("(50%)"));
        assert!(text.contains("Other"));
    }

    #[test]
    fn test_render_staged() {
        let items = vec![StagedItem {
            id: "x".to_string(),
            kind: InputKind::Manual,
            content: "hello".to_string(),
            name: "Manual Text".to_string(),
            status: ItemStatus::Queued,
        }];
        let text = render_staged(&items);
        assert!(text.contains("1 items staged"));
        assert!(text.contains("[manual] Manual Text (5 chars)"));
    }
}
