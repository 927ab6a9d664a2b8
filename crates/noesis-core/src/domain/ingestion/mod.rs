//! Incremental ingestion domain module
//!
//! Batch intake of candidate nodes into a subdomain, with duplicate
//! detection by (title, subdomain), partial-failure accounting, structured
//! run logs, and before/after domain metric deltas. A candidate failure
//! never aborts its batch; re-submitting a batch is idempotent for
//! already-created titles because duplicates are skipped.

mod entity;
mod repository;
mod service;

pub use entity::{
    BatchOutcome, CandidateNode, EstimatedImpact, IngestionLogEntry, IngestionRecord,
    IngestionStatus, IngestionType, LogLevel, MetricsSnapshot, ProcessedCounts, SourceDescriptor,
};
pub use repository::{IngestionRepository, IngestionStats};
pub use service::{IngestionService, RETRAINING_THRESHOLD};
