//! Process-local store.

use super::{AnalysisStore, RecordTable, SortKey};
use crate::error::StoreError;
use crate::models::{AnalysisRecord, NewAnalysis};
use std::sync::{Mutex, MutexGuard};

/// Store that lives as long as the process. Mutations are serialized by a lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<RecordTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table().map(|t| t.records().len()).unwrap_or(0)
    }

    fn table(&self) -> Result<MutexGuard<'_, RecordTable>, StoreError> {
        self.table
            .lock()
            .map_err(|_| StoreError::Rejected("store lock poisoned".to_string()))
    }
}

impl AnalysisStore for MemoryStore {
    async fn create(&self, new: NewAnalysis) -> Result<AnalysisRecord, StoreError> {
        Ok(self.table()?.insert(new))
    }

    async fn get(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        Ok(self.table()?.get(id).cloned())
    }

    async fn list(&self, sort: SortKey, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(self.table()?.list(sort, limit))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.table()?.remove(id);
        Ok(())
    }
}
