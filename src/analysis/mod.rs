//! Analysis modules.
//!
//! Normalization of oracle output, batch orchestration, and the
//! read-side rollups used by the history and dashboard views.

pub mod aggregator;
pub mod normalizer;
pub mod orchestrator;

pub use aggregator::*;
pub use orchestrator::{BatchOrchestrator, BatchPolicy, BatchReport};
