//! JSON-file backed store.
//!
//! The whole table is rewritten after every mutation (write to a sibling
//! temp file, then rename). If the write fails the mutation is undone in
//! memory, so the file and the in-memory table never disagree.

use super::{AnalysisStore, RecordTable, SortKey};
use crate::error::StoreError;
use crate::models::{AnalysisRecord, NewAnalysis};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    table: Mutex<RecordTable>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let records: Vec<AnalysisRecord> = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Loaded {} analyses from {}", records.len(), path.display());

        Ok(Self {
            path,
            table: Mutex::new(RecordTable::from_records(records)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, table: &RecordTable) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(table.records())?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl AnalysisStore for JsonFileStore {
    async fn create(&self, new: NewAnalysis) -> Result<AnalysisRecord, StoreError> {
        let mut table = self.table.lock().await;
        let record = table.insert(new);

        if let Err(e) = self.flush(&table).await {
            warn!("Failed to persist analysis {}: {}", record.id, e);
            table.remove(&record.id);
            return Err(e);
        }

        debug!("Stored analysis {}", record.id);
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        Ok(self.table.lock().await.get(id).cloned())
    }

    async fn list(&self, sort: SortKey, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(self.table.lock().await.list(sort, limit))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut table = self.table.lock().await;
        let Some((index, record)) = table.remove(id) else {
            return Ok(());
        };

        if let Err(e) = self.flush(&table).await {
            warn!("Failed to persist deletion of {}: {}", id, e);
            table.restore(index, record);
            return Err(e);
        }

        debug!("Deleted analysis {}", id);
        Ok(())
    }
}
