//! Repository trait for ingestion record persistence

use async_trait::async_trait;

use crate::error::Result;

use super::entity::{IngestionRecord, IngestionType};

/// Aggregate ingestion statistics for a domain
#[derive(Debug, Clone, Default)]
pub struct IngestionStats {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    /// Percentage of runs completed (0-100)
    pub success_rate: f64,
    /// Run counts per ingestion type
    pub by_type: Vec<(IngestionType, i64)>,
    /// Sum of successful node counts across all runs
    pub total_nodes_ingested: i64,
}

/// Repository trait for ingestion record persistence
#[async_trait]
pub trait IngestionRepository: Send + Sync {
    /// Insert a new ingestion record
    async fn create(&self, record: &IngestionRecord) -> Result<()>;

    /// Get a record by id
    async fn get(&self, id: &str) -> Result<Option<IngestionRecord>>;

    /// Persist a full record row (counters, logs, status, snapshots)
    async fn update(&self, record: &IngestionRecord) -> Result<()>;

    /// Records for a domain, most recent first, bounded
    async fn list_by_domain(&self, domain_id: &str, limit: usize) -> Result<Vec<IngestionRecord>>;

    /// Aggregate statistics for a domain
    async fn stats(&self, domain_id: &str) -> Result<IngestionStats>;
}
