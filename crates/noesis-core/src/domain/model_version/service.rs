//! Model version registry service

use std::sync::Arc;

use tracing::info;

use crate::error::{Error, Result};

use super::entity::{
    CompatibilitySummary, InferenceStats, ModelVersion, MonitoringUpdate, PerformanceMetrics,
    VersionStatus, VersionSummary,
};
use super::repository::{ModelVersionRepository, ModelVersionStats};

/// Service for model version lifecycle management
pub struct ModelVersionService<R: ModelVersionRepository> {
    repository: Arc<R>,
}

impl<R: ModelVersionRepository> ModelVersionService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Register a new version in development status
    pub async fn create_version(&self, version: ModelVersion) -> Result<ModelVersion> {
        let v = version.version_number.trim();
        if v.is_empty() {
            return Err(Error::InvalidInput("version number is required".into()));
        }
        if !v.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')) {
            return Err(Error::InvalidInput(format!(
                "version number '{}' contains invalid characters",
                v
            )));
        }
        if version.trained_by.trim().is_empty() {
            return Err(Error::InvalidInput("trained_by is required".into()));
        }

        self.repository.create(&version).await?;
        info!(
            version = %version.version_number,
            domains = version.domain_ids.len(),
            "Model version created"
        );
        Ok(version)
    }

    /// Get a version by its version string
    pub async fn get_version(&self, version_number: &str) -> Result<ModelVersion> {
        self.repository
            .get_by_version(version_number)
            .await?
            .ok_or_else(|| Error::ModelVersionNotFound(version_number.to_string()))
    }

    /// List versions with an optional status filter
    pub async fn list_versions(
        &self,
        status: Option<VersionStatus>,
        limit: usize,
    ) -> Result<Vec<ModelVersion>> {
        self.repository.list(status, limit).await
    }

    /// The current stable version, if any
    pub async fn stable_version(&self) -> Result<Option<ModelVersion>> {
        self.repository.get_stable().await
    }

    /// Release history as slim summaries, newest release first
    pub async fn version_history(&self, limit: usize) -> Result<Vec<VersionSummary>> {
        self.repository.history(limit).await
    }

    /// Set a version's status directly
    pub async fn set_status(
        &self,
        version_number: &str,
        status: VersionStatus,
    ) -> Result<ModelVersion> {
        if !self.repository.set_status(version_number, status).await? {
            return Err(Error::ModelVersionNotFound(version_number.to_string()));
        }
        info!(version = %version_number, status = %status, "Model version status updated");
        self.get_version(version_number).await
    }

    /// Record measured performance for a version
    pub async fn record_performance(
        &self,
        version_number: &str,
        metrics: PerformanceMetrics,
    ) -> Result<ModelVersion> {
        if !(0.0..=100.0).contains(&metrics.accuracy) {
            return Err(Error::InvalidInput(format!(
                "accuracy must be 0-100, got {}",
                metrics.accuracy
            )));
        }
        if !self
            .repository
            .update_performance(version_number, &metrics)
            .await?
        {
            return Err(Error::ModelVersionNotFound(version_number.to_string()));
        }
        self.get_version(version_number).await
    }

    /// Record inference characteristics for a version
    pub async fn record_inference(
        &self,
        version_number: &str,
        stats: InferenceStats,
    ) -> Result<ModelVersion> {
        if stats.average_latency_ms < 0.0 || stats.tokens_per_second < 0.0 {
            return Err(Error::InvalidInput(
                "inference metrics must be non-negative".into(),
            ));
        }
        if !self
            .repository
            .update_inference(version_number, &stats)
            .await?
        {
            return Err(Error::ModelVersionNotFound(version_number.to_string()));
        }
        self.get_version(version_number).await
    }

    /// Promote a version to stable
    ///
    /// Demotes the previous stable version (if any) to deprecated and
    /// stamps the target's release date, in one transaction.
    pub async fn promote_to_stable(&self, version_number: &str) -> Result<ModelVersion> {
        let promoted = self
            .repository
            .promote_to_stable(version_number)
            .await?
            .ok_or_else(|| Error::ModelVersionNotFound(version_number.to_string()))?;

        info!(version = %version_number, "Model version promoted to stable");
        Ok(promoted)
    }

    /// Record monitoring observations for a version
    pub async fn record_monitoring(
        &self,
        version_number: &str,
        update: MonitoringUpdate,
    ) -> Result<ModelVersion> {
        if let Some(satisfaction) = update.average_user_satisfaction {
            if !(0.0..=100.0).contains(&satisfaction) {
                return Err(Error::InvalidInput(format!(
                    "user satisfaction must be 0-100, got {}",
                    satisfaction
                )));
            }
        }
        if !self
            .repository
            .record_monitoring(version_number, &update)
            .await?
        {
            return Err(Error::ModelVersionNotFound(version_number.to_string()));
        }
        self.get_version(version_number).await
    }

    /// Compatibility summary between two versions
    ///
    /// Reports the target's declared breaking changes and whether the
    /// source supports rolling back.
    pub async fn compatibility(
        &self,
        from_version: &str,
        to_version: &str,
    ) -> Result<CompatibilitySummary> {
        let from = self.get_version(from_version).await?;
        let to = self.get_version(to_version).await?;

        Ok(CompatibilitySummary {
            breaking_changes: to.compatibility.breaking_changes,
            breaking_changes_list: to.compatibility.breaking_changes_list,
            rollback_supported: from.compatibility.rollback_supported,
        })
    }

    /// Aggregate statistics across all versions
    pub async fn stats(&self) -> Result<ModelVersionStats> {
        self.repository.stats().await
    }
}
