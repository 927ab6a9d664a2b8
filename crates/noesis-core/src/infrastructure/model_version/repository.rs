//! SQLite implementation of the ModelVersionRepository
//!
//! Performance and inference numbers that feed SQL aggregates are real
//! columns; descriptive sub-structures (training stats, parameters,
//! changelog, distribution) persist as JSON text. Promotion to stable is a
//! two-statement transaction so at most one stable row can exist.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::domain::model_version::{
    Changelog, Compatibility, Distribution, InferenceStats, ModelParameters, ModelVersion,
    ModelVersionRepository, ModelVersionStats, MonitoringUpdate, PerformanceMetrics,
    TrainingStats, VersionStatus, VersionSummary,
};
use crate::error::{Error, Result, map_unique_violation};
use crate::infrastructure::timestamps::{parse_optional_timestamp, parse_timestamp};

/// SQLite implementation of the model version repository
#[derive(Clone)]
pub struct SqliteModelVersionRepository {
    pool: SqlitePool,
}

impl SqliteModelVersionRepository {
    /// Create a new SQLite model version repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelVersionRepository for SqliteModelVersionRepository {
    async fn create(&self, version: &ModelVersion) -> Result<()> {
        let domain_ids = to_json(&version.domain_ids)?;
        let training = to_optional_json(version.training.as_ref())?;
        let parameters = to_optional_json(version.parameters.as_ref())?;
        let changelog = to_optional_json(version.changelog.as_ref())?;
        let distribution = to_optional_json(version.distribution.as_ref())?;
        let breaking_changes_list = to_json(&version.compatibility.breaking_changes_list)?;

        let inference_extras = version
            .inference
            .as_ref()
            .map(|i| {
                serde_json::to_string(&serde_json::json!({
                    "gpu_required": i.gpu_required,
                    "recommended_hardware": i.recommended_hardware,
                }))
            })
            .transpose()
            .map_err(|e| Error::Other(format!("Failed to serialize inference extras: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO model_versions (
                id, version_number, name, description, domain_ids, training,
                accuracy, precision, recall, f1_score, parameters,
                average_latency_ms, tokens_per_second, memory_required_gb, inference_extras,
                changelog, previous_version, breaking_changes, breaking_changes_list,
                rollback_supported, status, release_date, sunset_date, distribution,
                trained_by, drift_score, incidents_reported, user_satisfaction,
                last_monitored_at, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&version.id)
        .bind(&version.version_number)
        .bind(&version.name)
        .bind(&version.description)
        .bind(&domain_ids)
        .bind(&training)
        .bind(version.performance.as_ref().map(|p| p.accuracy))
        .bind(version.performance.as_ref().and_then(|p| p.precision))
        .bind(version.performance.as_ref().and_then(|p| p.recall))
        .bind(version.performance.as_ref().and_then(|p| p.f1_score))
        .bind(&parameters)
        .bind(version.inference.as_ref().map(|i| i.average_latency_ms))
        .bind(version.inference.as_ref().map(|i| i.tokens_per_second))
        .bind(version.inference.as_ref().map(|i| i.memory_required_gb))
        .bind(&inference_extras)
        .bind(&changelog)
        .bind(&version.compatibility.previous_version)
        .bind(version.compatibility.breaking_changes as i64)
        .bind(&breaking_changes_list)
        .bind(version.compatibility.rollback_supported as i64)
        .bind(version.status.as_str())
        .bind(version.release_date.map(|dt| dt.to_rfc3339()))
        .bind(version.sunset_date.map(|dt| dt.to_rfc3339()))
        .bind(&distribution)
        .bind(&version.trained_by)
        .bind(version.drift_score)
        .bind(version.incidents_reported)
        .bind(version.average_user_satisfaction)
        .bind(version.last_monitored_at.map(|dt| dt.to_rfc3339()))
        .bind(Option::<String>::None)
        .bind(version.created_at.to_rfc3339())
        .bind(version.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &format!("model version '{}'", version.version_number)))?;

        debug!(version = %version.version_number, "Model version saved");
        Ok(())
    }

    async fn get_by_version(&self, version_number: &str) -> Result<Option<ModelVersion>> {
        let row: Option<ModelVersionRow> =
            sqlx::query_as("SELECT * FROM model_versions WHERE version_number = ?")
                .bind(version_number)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_version()).transpose()
    }

    async fn list(&self, status: Option<VersionStatus>, limit: usize) -> Result<Vec<ModelVersion>> {
        let rows: Vec<ModelVersionRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM model_versions WHERE status = ?
                    ORDER BY release_date DESC, created_at DESC LIMIT ?
                    "#,
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM model_versions ORDER BY release_date DESC, created_at DESC LIMIT ?",
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(|r| r.into_version()).collect()
    }

    async fn get_stable(&self) -> Result<Option<ModelVersion>> {
        let row: Option<ModelVersionRow> = sqlx::query_as(
            "SELECT * FROM model_versions WHERE status = 'stable' ORDER BY release_date DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_version()).transpose()
    }

    async fn history(&self, limit: usize) -> Result<Vec<VersionSummary>> {
        let rows: Vec<(String, Option<String>, String, Option<String>, Option<f64>)> =
            sqlx::query_as(
                r#"
                SELECT version_number, name, status, release_date, accuracy
                FROM model_versions
                ORDER BY release_date DESC, created_at DESC
                LIMIT ?
                "#,
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(version_number, name, status, release_date, accuracy)| {
                let status = VersionStatus::parse(&status)
                    .ok_or_else(|| Error::Other(format!("Invalid version status: {}", status)))?;
                Ok(VersionSummary {
                    version_number,
                    name,
                    status,
                    release_date: parse_optional_timestamp(release_date.as_deref()),
                    accuracy,
                })
            })
            .collect()
    }

    async fn set_status(&self, version_number: &str, status: VersionStatus) -> Result<bool> {
        let result =
            sqlx::query("UPDATE model_versions SET status = ?, updated_at = ? WHERE version_number = ?")
                .bind(status.as_str())
                .bind(Utc::now().to_rfc3339())
                .bind(version_number)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_performance(
        &self,
        version_number: &str,
        metrics: &PerformanceMetrics,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE model_versions SET
                accuracy = ?, precision = ?, recall = ?, f1_score = ?, updated_at = ?
            WHERE version_number = ?
            "#,
        )
        .bind(metrics.accuracy)
        .bind(metrics.precision)
        .bind(metrics.recall)
        .bind(metrics.f1_score)
        .bind(Utc::now().to_rfc3339())
        .bind(version_number)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_inference(&self, version_number: &str, stats: &InferenceStats) -> Result<bool> {
        let extras = serde_json::to_string(&serde_json::json!({
            "gpu_required": stats.gpu_required,
            "recommended_hardware": stats.recommended_hardware,
        }))
        .map_err(|e| Error::Other(format!("Failed to serialize inference extras: {}", e)))?;

        let result = sqlx::query(
            r#"
            UPDATE model_versions SET
                average_latency_ms = ?, tokens_per_second = ?, memory_required_gb = ?,
                inference_extras = ?, updated_at = ?
            WHERE version_number = ?
            "#,
        )
        .bind(stats.average_latency_ms)
        .bind(stats.tokens_per_second)
        .bind(stats.memory_required_gb)
        .bind(&extras)
        .bind(Utc::now().to_rfc3339())
        .bind(version_number)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn promote_to_stable(&self, version_number: &str) -> Result<Option<ModelVersion>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        // Demote whatever currently holds stable, then promote the target;
        // rolling back on a missing target keeps the old stable in place
        sqlx::query(
            "UPDATE model_versions SET status = 'deprecated', updated_at = ? WHERE status = 'stable'",
        )
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE model_versions SET status = 'stable', release_date = ?, updated_at = ?
            WHERE version_number = ?
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(version_number)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        info!(version = %version_number, "Model version promoted to stable");
        self.get_by_version(version_number).await
    }

    async fn record_monitoring(
        &self,
        version_number: &str,
        update: &MonitoringUpdate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE model_versions SET
                drift_score = COALESCE(?, drift_score),
                incidents_reported = COALESCE(?, incidents_reported),
                user_satisfaction = COALESCE(?, user_satisfaction),
                last_monitored_at = ?, updated_at = ?
            WHERE version_number = ?
            "#,
        )
        .bind(update.drift_score)
        .bind(update.incidents_reported)
        .bind(update.average_user_satisfaction)
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(version_number)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<ModelVersionStats> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM model_versions")
            .fetch_one(&self.pool)
            .await?;

        let (avg_accuracy, avg_latency): (Option<f64>, Option<f64>) =
            sqlx::query_as("SELECT AVG(accuracy), AVG(average_latency_ms) FROM model_versions")
                .fetch_one(&self.pool)
                .await?;

        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM model_versions GROUP BY status ORDER BY COUNT(*) DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ModelVersionStats {
            total,
            by_status: by_status
                .into_iter()
                .filter_map(|(s, c)| VersionStatus::parse(&s).map(|vs| (vs, c)))
                .collect(),
            average_accuracy: avg_accuracy.unwrap_or(0.0),
            average_latency_ms: avg_latency.unwrap_or(0.0),
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Other(format!("Failed to serialize: {}", e)))
}

fn to_optional_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>> {
    value.map(|v| to_json(v)).transpose()
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct ModelVersionRow {
    id: String,
    version_number: String,
    name: Option<String>,
    description: Option<String>,
    domain_ids: Option<String>,
    training: Option<String>,
    accuracy: Option<f64>,
    precision: Option<f64>,
    recall: Option<f64>,
    f1_score: Option<f64>,
    parameters: Option<String>,
    average_latency_ms: Option<f64>,
    tokens_per_second: Option<f64>,
    memory_required_gb: Option<f64>,
    inference_extras: Option<String>,
    changelog: Option<String>,
    previous_version: Option<String>,
    breaking_changes: i64,
    breaking_changes_list: Option<String>,
    rollback_supported: i64,
    status: String,
    release_date: Option<String>,
    sunset_date: Option<String>,
    distribution: Option<String>,
    trained_by: String,
    drift_score: Option<f64>,
    incidents_reported: i64,
    user_satisfaction: Option<f64>,
    last_monitored_at: Option<String>,
    #[allow(dead_code)]
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ModelVersionRow {
    fn into_version(self) -> Result<ModelVersion> {
        let status = VersionStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Invalid version status: {}", self.status)))?;

        let domain_ids: Vec<String> = self
            .domain_ids
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        let training: Option<TrainingStats> = self
            .training
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let parameters: Option<ModelParameters> = self
            .parameters
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let changelog: Option<Changelog> = self
            .changelog
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let distribution: Option<Distribution> = self
            .distribution
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let breaking_changes_list: Vec<String> = self
            .breaking_changes_list
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        let performance = self.accuracy.map(|accuracy| PerformanceMetrics {
            accuracy,
            precision: self.precision,
            recall: self.recall,
            f1_score: self.f1_score,
        });

        let inference = self.average_latency_ms.map(|average_latency_ms| {
            let extras: serde_json::Value = self
                .inference_extras
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();
            InferenceStats {
                average_latency_ms,
                tokens_per_second: self.tokens_per_second.unwrap_or(0.0),
                memory_required_gb: self.memory_required_gb.unwrap_or(0.0),
                gpu_required: extras
                    .get("gpu_required")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                recommended_hardware: extras
                    .get("recommended_hardware")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            }
        });

        Ok(ModelVersion {
            id: self.id,
            version_number: self.version_number,
            name: self.name,
            description: self.description,
            domain_ids,
            training,
            performance,
            parameters,
            inference,
            changelog,
            compatibility: Compatibility {
                previous_version: self.previous_version,
                breaking_changes: self.breaking_changes != 0,
                breaking_changes_list,
                rollback_supported: self.rollback_supported != 0,
            },
            status,
            release_date: parse_optional_timestamp(self.release_date.as_deref()),
            sunset_date: parse_optional_timestamp(self.sunset_date.as_deref()),
            distribution,
            trained_by: self.trained_by,
            drift_score: self.drift_score,
            incidents_reported: self.incidents_reported,
            average_user_satisfaction: self.user_satisfaction,
            last_monitored_at: parse_optional_timestamp(self.last_monitored_at.as_deref()),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}
