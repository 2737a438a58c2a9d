//! Error types for the classification pipeline.

use thiserror::Error;

/// Failure talking to the classification oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to Ollama at {0}. Is Ollama running?")]
    Connect(String),

    #[error("Ollama API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to send request: {0}")]
    Transport(String),

    /// The oracle answered, but not with a JSON object. Keeps the raw text for diagnosis.
    #[error("oracle returned a malformed response: {reason}")]
    Malformed { reason: String, raw: String },
}

/// An oracle response that does not fit the canonical record.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has the wrong type, expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Failure reading or writing the analysis store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store rejected the operation: {0}")]
    Rejected(String),

    /// Bulk delete stopped part-way. Deletions before `failed_id` are not undone.
    #[error("bulk delete stopped after {deleted} records at `{failed_id}`: {source}")]
    PartialDelete {
        deleted: usize,
        failed_id: String,
        #[source]
        source: Box<StoreError>,
    },
}

/// Aggregate failure of a whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch is empty")]
    EmptyBatch,

    #[error("staged item `{0}` has no content")]
    EmptyContent(String),

    #[error("batch failed: classification error: {0}")]
    Oracle(#[source] OracleError),

    #[error("batch failed: invalid classification: {0}")]
    Validation(#[source] ValidationError),

    /// Records written before the failure stay in the store.
    #[error("batch failed: persistence error after {written} records were written: {source}")]
    Persistence {
        written: usize,
        #[source]
        source: StoreError,
    },

    #[error("batch cancelled")]
    Cancelled,
}
