//! Batch submission: fan staged items out to the oracle, join, persist.
//!
//! Classification runs as an ordered, buffered stream on the caller's task,
//! so at most `concurrency` oracle calls are in flight and results are
//! joined by input position regardless of completion order. Cancellation
//! is honoured while classifying; once persistence starts it runs to
//! completion.

use super::normalizer::normalize;
use crate::error::{BatchError, OracleError};
use crate::models::{AnalysisRecord, ItemStatus, NewAnalysis, StagedItem};
use crate::oracle::{output_schema, ClassificationOracle};
use crate::staging::StagingQueue;
use crate::store::AnalysisStore;
use futures::future::join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happens to the rest of a batch when one item fails.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum BatchPolicy {
    /// Any failure abandons the whole batch; nothing is stored.
    #[default]
    AllOrNothing,
    /// Every item is classified and stored on its own.
    PerItem,
}

/// Result for one staged item.
#[derive(Debug)]
pub enum ItemOutcome {
    Stored(AnalysisRecord),
    Failed { item_id: String, error: BatchError },
}

/// Per-item outcomes of a submitted batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn records(&self) -> Vec<&AnalysisRecord> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ItemOutcome::Stored(record) => Some(record),
                ItemOutcome::Failed { .. } => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<(&str, &BatchError)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ItemOutcome::Failed { item_id, error } => Some((item_id.as_str(), error)),
                ItemOutcome::Stored(_) => None,
            })
            .collect()
    }

    /// Comma-separated ids of the stored records, for `batch <IDS>`.
    pub fn batch_link(&self) -> String {
        self.records()
            .iter()
            .map(|r| r.id.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub struct BatchOrchestrator<'a, O, S> {
    oracle: &'a O,
    store: &'a S,
    concurrency: usize,
    schema: Value,
    progress: ProgressBar,
}

impl<'a, O, S> BatchOrchestrator<'a, O, S>
where
    O: ClassificationOracle,
    S: AnalysisStore,
{
    pub fn new(oracle: &'a O, store: &'a S, concurrency: usize) -> Self {
        Self {
            oracle,
            store,
            concurrency: concurrency.max(1),
            schema: output_schema(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Tick `progress` once per finished classification.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Submit every item in `queue` under `policy`.
    ///
    /// Items whose records were stored leave the queue. Items that were not
    /// stored stay, marked `failed`, so the batch can be retried.
    pub async fn submit(
        &self,
        queue: &mut StagingQueue,
        policy: BatchPolicy,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, BatchError> {
        let items: Vec<StagedItem> = queue.list().to_vec();
        if items.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        for item in &items {
            queue.set_status(&item.id, ItemStatus::Submitting);
        }
        self.progress.set_length(items.len() as u64);

        match policy {
            BatchPolicy::AllOrNothing => match self.analyze_batch(&items, cancel).await {
                Ok(records) => {
                    let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
                    queue.remove_many(&ids);
                    Ok(BatchReport {
                        outcomes: records.into_iter().map(ItemOutcome::Stored).collect(),
                    })
                }
                Err(e) => {
                    for item in &items {
                        queue.set_status(&item.id, ItemStatus::Failed);
                    }
                    Err(e)
                }
            },
            BatchPolicy::PerItem => {
                let outcomes = self.analyze_each(&items, cancel).await;
                let mut stored = Vec::new();
                for (item, outcome) in items.iter().zip(&outcomes) {
                    match outcome {
                        ItemOutcome::Stored(_) => {
                            queue.set_status(&item.id, ItemStatus::Done);
                            stored.push(item.id.clone());
                        }
                        ItemOutcome::Failed { .. } => {
                            queue.set_status(&item.id, ItemStatus::Failed)
                        }
                    }
                }
                queue.remove_many(&stored);
                Ok(BatchReport { outcomes })
            }
        }
    }

    /// All-or-nothing: classify every item, then store every record.
    ///
    /// Returns the records in input order. If any classification or
    /// validation fails, nothing is stored. A storage failure is reported
    /// with the number of records already written, which are not removed.
    pub async fn analyze_batch(
        &self,
        items: &[StagedItem],
        cancel: &CancellationToken,
    ) -> Result<Vec<AnalysisRecord>, BatchError> {
        check_preconditions(items)?;
        info!(
            "Classifying batch of {} items ({} at a time)",
            items.len(),
            self.concurrency
        );

        let classify_all = stream::iter(items)
            .map(|item| self.classify(item))
            .buffered(self.concurrency)
            .try_collect::<Vec<Value>>();

        let outputs = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Batch cancelled during classification");
                return Err(BatchError::Cancelled);
            }
            outputs = classify_all => outputs?,
        };

        let drafts = items
            .iter()
            .zip(&outputs)
            .map(|(item, output)| self.validate(item, output))
            .collect::<Result<Vec<NewAnalysis>, BatchError>>()?;

        let results = join_all(drafts.into_iter().map(|draft| self.store.create(draft))).await;

        let written = results.iter().filter(|r| r.is_ok()).count();
        let mut records = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(record) => records.push(record),
                Err(source) => {
                    warn!("Persisting batch failed after {} writes: {}", written, source);
                    return Err(BatchError::Persistence { written, source });
                }
            }
        }

        info!("Batch stored {} records", records.len());
        Ok(records)
    }

    /// Per-item: each item is classified, validated and stored independently.
    pub async fn analyze_each(
        &self,
        items: &[StagedItem],
        cancel: &CancellationToken,
    ) -> Vec<ItemOutcome> {
        info!(
            "Classifying {} items independently ({} at a time)",
            items.len(),
            self.concurrency
        );

        let outcomes: Vec<ItemOutcome> = stream::iter(items)
            .map(|item| async move {
                match self.process_item(item, cancel).await {
                    Ok(record) => ItemOutcome::Stored(record),
                    Err(error) => ItemOutcome::Failed {
                        item_id: item.id.clone(),
                        error,
                    },
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let stored = outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Stored(_)))
            .count();
        info!("Stored {} of {} items", stored, items.len());
        outcomes
    }

    async fn process_item(
        &self,
        item: &StagedItem,
        cancel: &CancellationToken,
    ) -> Result<AnalysisRecord, BatchError> {
        if item.content.trim().is_empty() {
            return Err(BatchError::EmptyContent(item.name.clone()));
        }

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BatchError::Cancelled),
            output = self.classify(item) => output?,
        };

        let draft = self.validate(item, &output)?;
        self.store
            .create(draft)
            .await
            .map_err(|source| BatchError::Persistence { written: 0, source })
    }

    async fn classify(&self, item: &StagedItem) -> Result<Value, BatchError> {
        debug!("Classifying item {} ({})", item.id, item.name);
        let result = self.oracle.classify(&item.content, &self.schema).await;
        self.progress.inc(1);

        result.map_err(|e| {
            match e {
                OracleError::Malformed { ref raw, .. } => warn!(
                    "Classification of item {} failed: {}. Raw response: {}",
                    item.id, e, raw
                ),
                _ => warn!("Classification of item {} failed: {}", item.id, e),
            }
            BatchError::Oracle(e)
        })
    }

    fn validate(&self, item: &StagedItem, output: &Value) -> Result<NewAnalysis, BatchError> {
        normalize(item, output).map_err(|e| {
            warn!(
                "Invalid classification for item {}: {}. Raw response: {}",
                item.id, e, output
            );
            BatchError::Validation(e)
        })
    }
}

fn check_preconditions(items: &[StagedItem]) -> Result<(), BatchError> {
    if items.is_empty() {
        return Err(BatchError::EmptyBatch);
    }
    if let Some(item) = items.iter().find(|i| i.content.trim().is_empty()) {
        return Err(BatchError::EmptyContent(item.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::{average_score, risk_distribution};
    use crate::error::{OracleError, StoreError};
    use crate::models::{InputKind, RiskLabel};
    use crate::store::{MemoryStore, SortKey};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Oracle answering from a script keyed by content.
    #[derive(Default)]
    struct ScriptedOracle {
        replies: HashMap<String, Result<Value, String>>,
        delays_ms: HashMap<String, u64>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn reply(mut self, content: &str, value: Value) -> Self {
            self.replies.insert(content.to_string(), Ok(value));
            self
        }

        fn fail(mut self, content: &str) -> Self {
            self.replies
                .insert(content.to_string(), Err("upstream exploded".to_string()));
            self
        }

        fn delay(mut self, content: &str, ms: u64) -> Self {
            self.delays_ms.insert(content.to_string(), ms);
            self
        }
    }

    impl ClassificationOracle for ScriptedOracle {
        async fn classify(&self, content: &str, _schema: &Value) -> Result<Value, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let ms = self.delays_ms.get(content).copied().unwrap_or(5);
            tokio::time::sleep(Duration::from_millis(ms)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match self.replies.get(content) {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(msg)) => Err(OracleError::Transport(msg.clone())),
                None => Ok(assessment(10, "No Risk")),
            }
        }
    }

    /// Store whose `create` fails for one raw text.
    struct FailingStore {
        inner: MemoryStore,
        poison: String,
    }

    impl AnalysisStore for FailingStore {
        async fn create(&self, new: NewAnalysis) -> Result<AnalysisRecord, StoreError> {
            if new.raw_text == self.poison {
                return Err(StoreError::Rejected("disk full".to_string()));
            }
            self.inner.create(new).await
        }

        async fn get(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
            self.inner.get(id).await
        }

        async fn list(
            &self,
            sort: SortKey,
            limit: usize,
        ) -> Result<Vec<AnalysisRecord>, StoreError> {
            self.inner.list(sort, limit).await
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }
    }

    fn assessment(score: u8, label: &str) -> Value {
        json!({
            "score": score,
            "label": label,
            "confidence": 0.9,
            "explanation": "scripted",
            "signals": {},
        })
    }

    fn queue_of(contents: &[&str]) -> StagingQueue {
        let mut queue = StagingQueue::new();
        for content in contents {
            queue.add(InputKind::Manual, content.to_string(), "");
        }
        queue
    }

    #[tokio::test]
    async fn test_two_item_scenario() {
        let oracle = ScriptedOracle::default()
            .reply(
                "free money now, click here",
                json!({
                    "score": 92,
                    "label": "HighRisk",
                    "confidence": 0.88,
                    "explanation": "Advance-fee lure.",
                    "mitigations": ["Do not click"],
                    "signals": {},
                    "extracted_urls": []
                }),
            )
            .reply(
                "http://example.com",
                json!({
                    "score": 3,
                    "label": "NoRisk",
                    "confidence": 0.95,
                    "explanation": "Reserved example domain.",
                    "mitigations": [],
                    "signals": {},
                    "extracted_urls": ["http://example.com"]
                }),
            );
        let store = MemoryStore::new();
        let mut queue = StagingQueue::new();
        queue.add(InputKind::Manual, "free money now, click here".to_string(), "");
        queue.add(InputKind::Url, "http://example.com".to_string(), "");

        let orchestrator = BatchOrchestrator::new(&oracle, &store, 4);
        let report = orchestrator
            .submit(&mut queue, BatchPolicy::AllOrNothing, &CancellationToken::new())
            .await
            .unwrap();

        let records: Vec<AnalysisRecord> = report.records().into_iter().cloned().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].raw_text, "free money now, click here");
        assert_eq!(records[0].label, RiskLabel::HighRisk);
        assert_eq!(records[0].mitigations, vec!["Do not click"]);
        assert_eq!(records[1].input_type, InputKind::Url);
        assert_eq!(records[1].extracted_urls, vec!["http://example.com"]);
        assert!(records[1].signals.is_empty());

        assert_eq!(store.len(), 2);
        let dist = risk_distribution(&records);
        assert_eq!((dist.no_risk, dist.low_risk, dist.high_risk), (1, 0, 1));
        assert_eq!(average_score(&records), 47.5);

        assert!(queue.is_empty());
        assert_eq!(report.batch_link(), format!("{},{}", records[0].id, records[1].id));
    }

    #[tokio::test]
    async fn test_output_order_follows_input_not_completion() {
        let oracle = ScriptedOracle::default()
            .reply("slow", assessment(80, "High Risk"))
            .delay("slow", 40)
            .reply("fast", assessment(5, "No Risk"))
            .delay("fast", 1);
        let store = MemoryStore::new();
        let items: Vec<StagedItem> = queue_of(&["slow", "fast"]).list().to_vec();

        let records = BatchOrchestrator::new(&oracle, &store, 2)
            .analyze_batch(&items, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(records[0].raw_text, "slow");
        assert_eq!(records[1].raw_text, "fast");
    }

    #[tokio::test]
    async fn test_any_oracle_failure_stores_nothing_and_keeps_queue() {
        let oracle = ScriptedOracle::default().fail("b");
        let store = MemoryStore::new();
        let mut queue = queue_of(&["a", "b", "c"]);
        let before: Vec<String> = queue.list().iter().map(|i| i.id.clone()).collect();

        let result = BatchOrchestrator::new(&oracle, &store, 3)
            .submit(&mut queue, BatchPolicy::AllOrNothing, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(BatchError::Oracle(_))));
        assert_eq!(store.len(), 0);
        let after: Vec<String> = queue.list().iter().map(|i| i.id.clone()).collect();
        assert_eq!(before, after);
        assert!(queue.list().iter().all(|i| i.status == ItemStatus::Failed));
    }

    #[tokio::test]
    async fn test_validation_failure_aborts_batch() {
        let oracle = ScriptedOracle::default()
            .reply("bad", json!({"score": 40, "label": "Low Risk", "confidence": 0.5}));
        let store = MemoryStore::new();
        let mut queue = queue_of(&["good", "bad"]);

        let result = BatchOrchestrator::new(&oracle, &store, 2)
            .submit(&mut queue, BatchPolicy::AllOrNothing, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(BatchError::Validation(_))));
        assert_eq!(store.len(), 0);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_written_records() {
        let oracle = ScriptedOracle::default();
        let store = FailingStore {
            inner: MemoryStore::new(),
            poison: "b".to_string(),
        };
        let mut queue = queue_of(&["a", "b", "c"]);

        let result = BatchOrchestrator::new(&oracle, &store, 3)
            .submit(&mut queue, BatchPolicy::AllOrNothing, &CancellationToken::new())
            .await;

        match result {
            Err(BatchError::Persistence { written, .. }) => assert_eq!(written, 2),
            other => panic!("expected persistence failure, got {:?}", other),
        }
        assert_eq!(store.inner.len(), 2);
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let oracle = ScriptedOracle::default();
        let store = MemoryStore::new();
        let contents: Vec<String> = (0..10).map(|i| format!("item {}", i)).collect();
        let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
        let items = queue_of(&refs).list().to_vec();

        let records = BatchOrchestrator::new(&oracle, &store, 3)
            .analyze_batch(&items, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 10);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 10);
        let max = oracle.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "saw {} concurrent calls", max);
        assert!(max > 1);
    }

    #[tokio::test]
    async fn test_per_item_policy_commits_successes() {
        let oracle = ScriptedOracle::default()
            .reply("ok", assessment(25, "Low Risk"))
            .fail("broken");
        let store = MemoryStore::new();
        let mut queue = queue_of(&["ok", "broken"]);

        let report = BatchOrchestrator::new(&oracle, &store, 2)
            .submit(&mut queue, BatchPolicy::PerItem, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.records().len(), 1);
        assert_eq!(report.failures().len(), 1);
        assert!(matches!(report.outcomes[0], ItemOutcome::Stored(_)));
        assert!(matches!(report.outcomes[1], ItemOutcome::Failed { .. }));
        assert_eq!(store.len(), 1);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.list()[0].content, "broken");
        assert_eq!(queue.list()[0].status, ItemStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_batch_stores_nothing() {
        let oracle = ScriptedOracle::default();
        let store = MemoryStore::new();
        let mut queue = queue_of(&["a", "b"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = BatchOrchestrator::new(&oracle, &store, 2)
            .submit(&mut queue, BatchPolicy::AllOrNothing, &cancel)
            .await;

        assert!(matches!(result, Err(BatchError::Cancelled)));
        assert_eq!(store.len(), 0);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_mid_batch() {
        let oracle = ScriptedOracle::default().delay("slow", 200);
        let store = MemoryStore::new();
        let items = queue_of(&["slow"]).list().to_vec();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = BatchOrchestrator::new(&oracle, &store, 1)
            .analyze_batch(&items, &cancel)
            .await;

        assert!(matches!(result, Err(BatchError::Cancelled)));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_preconditions() {
        let oracle = ScriptedOracle::default();
        let store = MemoryStore::new();
        let orchestrator = BatchOrchestrator::new(&oracle, &store, 2);

        let mut empty = StagingQueue::new();
        assert!(matches!(
            orchestrator
                .submit(&mut empty, BatchPolicy::AllOrNothing, &CancellationToken::new())
                .await,
            Err(BatchError::EmptyBatch)
        ));

        let items = queue_of(&["fine", "   "]).list().to_vec();
        assert!(matches!(
            orchestrator
                .analyze_batch(&items, &CancellationToken::new())
                .await,
            Err(BatchError::EmptyContent(_))
        ));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }
}
