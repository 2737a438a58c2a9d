//! Analysis persistence and queries.
//!
//! `AnalysisStore` is the record-oriented collection the pipeline writes
//! to and the history views read from. Records are immutable once created;
//! the only mutation after `create` is deletion.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::models::{AnalysisRecord, NewAnalysis};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

/// `store_path` value that selects the process-local store instead of a file.
pub const MEMORY_STORE: &str = ":memory:";

/// Field a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Score,
    Confidence,
}

/// Ordering for `list`. Parsed from `field` / `-field` (leading `-` = descending).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    pub const NEWEST_FIRST: SortKey = SortKey {
        field: SortField::CreatedAt,
        descending: true,
    };
}

impl Default for SortKey {
    fn default() -> Self {
        Self::NEWEST_FIRST
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let field = match name {
            "created_at" | "created_date" => SortField::CreatedAt,
            "score" => SortField::Score,
            "confidence" => SortField::Confidence,
            other => return Err(format!("unknown sort field '{}'", other)),
        };

        Ok(SortKey { field, descending })
    }
}

/// Split a comma-separated batch link into ids, dropping blanks.
pub fn parse_id_list(ids: &str) -> Vec<String> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

/// Persistence contract for analysis records.
#[allow(async_fn_in_trait)]
pub trait AnalysisStore {
    /// Assign an id and timestamp, persist, and return the stored record.
    async fn create(&self, new: NewAnalysis) -> Result<AnalysisRecord, StoreError>;

    /// `Ok(None)` when the id is unknown.
    async fn get(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError>;

    /// Records ordered by `sort`, truncated to `limit`.
    async fn list(&self, sort: SortKey, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError>;

    /// Remove one record. Unknown ids are a no-op.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Look up several ids, keeping their order; unknown ids yield `None`.
    async fn get_many(&self, ids: &[String]) -> Result<Vec<Option<AnalysisRecord>>, StoreError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            found.push(self.get(id).await?);
        }
        Ok(found)
    }

    /// Delete each id in turn, returning how many calls succeeded.
    ///
    /// Not atomic: on failure the deletions already made stay made and the
    /// error reports how far it got.
    async fn delete_all(&self, ids: &[String]) -> Result<usize, StoreError> {
        for (deleted, id) in ids.iter().enumerate() {
            if let Err(e) = self.delete(id).await {
                warn!("Bulk delete stopped at {} after {} deletions: {}", id, deleted, e);
                return Err(StoreError::PartialDelete {
                    deleted,
                    failed_id: id.clone(),
                    source: Box::new(e),
                });
            }
        }
        debug!("Bulk deleted {} records", ids.len());
        Ok(ids.len())
    }
}

/// In-memory table shared by the store implementations.
#[derive(Debug, Default)]
pub(crate) struct RecordTable {
    /// Insertion order.
    records: Vec<AnalysisRecord>,
    last_created: Option<DateTime<Utc>>,
}

impl RecordTable {
    pub(crate) fn from_records(records: Vec<AnalysisRecord>) -> Self {
        let last_created = records.iter().map(|r| r.created_at).max();
        Self {
            records,
            last_created,
        }
    }

    pub(crate) fn records(&self) -> &[AnalysisRecord] {
        &self.records
    }

    /// Stamp and append. Timestamps never go backwards, even if the clock does.
    pub(crate) fn insert(&mut self, new: NewAnalysis) -> AnalysisRecord {
        let now = Utc::now();
        let created_at = match self.last_created {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_created = Some(created_at);

        let record = AnalysisRecord::from_new(Uuid::new_v4().to_string(), created_at, new);
        self.records.push(record.clone());
        record
    }

    pub(crate) fn get(&self, id: &str) -> Option<&AnalysisRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Remove by id, returning the old position so the removal can be undone.
    pub(crate) fn remove(&mut self, id: &str) -> Option<(usize, AnalysisRecord)> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some((index, self.records.remove(index)))
    }

    pub(crate) fn restore(&mut self, index: usize, record: AnalysisRecord) {
        let index = index.min(self.records.len());
        self.records.insert(index, record);
    }

    /// Ties keep insertion order, so "newest first" lists later inserts first.
    pub(crate) fn list(&self, sort: SortKey, limit: usize) -> Vec<AnalysisRecord> {
        let mut rows: Vec<(usize, &AnalysisRecord)> = self.records.iter().enumerate().collect();

        rows.sort_by(|(ia, a), (ib, b)| compare(a, b, sort.field).then(ia.cmp(ib)));
        if sort.descending {
            rows.reverse();
        }

        rows.into_iter()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

fn compare(a: &AnalysisRecord, b: &AnalysisRecord, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Score => a.score.cmp(&b.score),
        SortField::Confidence => a
            .confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(Ordering::Equal),
    }
}
