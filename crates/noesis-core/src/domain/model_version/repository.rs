//! Repository trait for model version persistence

use async_trait::async_trait;

use crate::error::Result;

use super::entity::{
    InferenceStats, ModelVersion, MonitoringUpdate, PerformanceMetrics, VersionStatus,
    VersionSummary,
};

/// Aggregate statistics across all versions
#[derive(Debug, Clone, Default)]
pub struct ModelVersionStats {
    pub total: i64,
    /// Version counts per status
    pub by_status: Vec<(VersionStatus, i64)>,
    /// Mean accuracy across versions that report it
    pub average_accuracy: f64,
    /// Mean latency across versions that report it
    pub average_latency_ms: f64,
}

/// Repository trait for model version persistence
#[async_trait]
pub trait ModelVersionRepository: Send + Sync {
    /// Insert a new version; unique version-number violations surface as DuplicateKey
    async fn create(&self, version: &ModelVersion) -> Result<()>;

    /// Get a version by its version string
    async fn get_by_version(&self, version_number: &str) -> Result<Option<ModelVersion>>;

    /// List versions, optionally filtered by status, newest release first, bounded
    async fn list(&self, status: Option<VersionStatus>, limit: usize) -> Result<Vec<ModelVersion>>;

    /// The current stable version, if any
    async fn get_stable(&self) -> Result<Option<ModelVersion>>;

    /// Slim release history, newest release first, bounded
    async fn history(&self, limit: usize) -> Result<Vec<VersionSummary>>;

    /// Set a version's status directly; false when the version is missing
    async fn set_status(&self, version_number: &str, status: VersionStatus) -> Result<bool>;

    /// Record measured performance; false when the version is missing
    async fn update_performance(
        &self,
        version_number: &str,
        metrics: &PerformanceMetrics,
    ) -> Result<bool>;

    /// Record inference characteristics; false when the version is missing
    async fn update_inference(&self, version_number: &str, stats: &InferenceStats) -> Result<bool>;

    /// Atomically demote the current stable version to deprecated and
    /// promote the target to stable with a release date. The transaction
    /// rolls back when the target does not exist, so at most one stable
    /// version survives concurrent promotions.
    async fn promote_to_stable(&self, version_number: &str) -> Result<Option<ModelVersion>>;

    /// Record monitoring observations, stamping the last-monitored time;
    /// false when the version is missing
    async fn record_monitoring(
        &self,
        version_number: &str,
        update: &MonitoringUpdate,
    ) -> Result<bool>;

    /// Aggregate statistics across all versions
    async fn stats(&self) -> Result<ModelVersionStats>;
}
