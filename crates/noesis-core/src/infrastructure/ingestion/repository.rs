//! SQLite implementation of the IngestionRepository
//!
//! One row per batch-intake run. Node id lists, validation errors, the
//! structured log, and the source descriptor persist as JSON text columns;
//! counters and snapshots are real columns so the stats queries stay in SQL.

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::ingestion::{
    EstimatedImpact, IngestionLogEntry, IngestionRecord, IngestionRepository, IngestionStats,
    IngestionStatus, IngestionType, MetricsSnapshot, ProcessedCounts, SourceDescriptor,
};
use crate::error::{Error, Result};
use crate::infrastructure::timestamps::{parse_optional_timestamp, parse_timestamp};

/// SQLite implementation of the ingestion repository
#[derive(Clone)]
pub struct SqliteIngestionRepository {
    pool: SqlitePool,
}

impl SqliteIngestionRepository {
    /// Create a new SQLite ingestion repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IngestionRepository for SqliteIngestionRepository {
    async fn create(&self, record: &IngestionRecord) -> Result<()> {
        let source = record
            .source
            .as_ref()
            .map(|s| serde_json::to_string(s))
            .transpose()
            .map_err(|e| Error::Other(format!("Failed to serialize source: {}", e)))?;
        let node_ids = to_json(&record.node_ids)?;
        let validation_errors = to_json(&record.validation_errors)?;
        let logs = to_json(&record.logs)?;

        sqlx::query(
            r#"
            INSERT INTO ingestion_records (
                id, domain_id, subdomain_id, ingestion_type, source, node_ids,
                nodes_total, nodes_successful, nodes_failed, nodes_skipped,
                validation_passed, validation_failed, validation_errors,
                duplicates_found, requires_retraining, estimated_impact,
                status, executed_by, started_at, ended_at, duration_seconds,
                logs, before_total_nodes, before_quality_score,
                after_total_nodes, after_quality_score, delta_nodes, delta_quality_score,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.domain_id)
        .bind(&record.subdomain_id)
        .bind(record.ingestion_type.as_str())
        .bind(&source)
        .bind(&node_ids)
        .bind(record.processed.total)
        .bind(record.processed.successful)
        .bind(record.processed.failed)
        .bind(record.processed.skipped)
        .bind(record.validation_passed)
        .bind(record.validation_failed)
        .bind(&validation_errors)
        .bind(record.duplicates_found)
        .bind(record.requires_retraining as i64)
        .bind(record.estimated_impact.map(|i| i.as_str()))
        .bind(record.status.as_str())
        .bind(&record.executed_by)
        .bind(record.started_at.to_rfc3339())
        .bind(record.ended_at.map(|dt| dt.to_rfc3339()))
        .bind(record.duration_seconds)
        .bind(&logs)
        .bind(record.before.map(|b| b.total_nodes))
        .bind(record.before.map(|b| b.quality_score))
        .bind(record.after.map(|a| a.total_nodes))
        .bind(record.after.map(|a| a.quality_score))
        .bind(record.delta_nodes)
        .bind(record.delta_quality_score)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(ingestion_id = %record.id, domain_id = %record.domain_id, "Ingestion record saved");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<IngestionRecord>> {
        let row: Option<IngestionRow> =
            sqlx::query_as("SELECT * FROM ingestion_records WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_record()).transpose()
    }

    async fn update(&self, record: &IngestionRecord) -> Result<()> {
        let node_ids = to_json(&record.node_ids)?;
        let validation_errors = to_json(&record.validation_errors)?;
        let logs = to_json(&record.logs)?;

        sqlx::query(
            r#"
            UPDATE ingestion_records SET
                node_ids = ?, nodes_total = ?, nodes_successful = ?,
                nodes_failed = ?, nodes_skipped = ?,
                validation_passed = ?, validation_failed = ?, validation_errors = ?,
                duplicates_found = ?, requires_retraining = ?, estimated_impact = ?,
                status = ?, ended_at = ?, duration_seconds = ?, logs = ?,
                after_total_nodes = ?, after_quality_score = ?,
                delta_nodes = ?, delta_quality_score = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&node_ids)
        .bind(record.processed.total)
        .bind(record.processed.successful)
        .bind(record.processed.failed)
        .bind(record.processed.skipped)
        .bind(record.validation_passed)
        .bind(record.validation_failed)
        .bind(&validation_errors)
        .bind(record.duplicates_found)
        .bind(record.requires_retraining as i64)
        .bind(record.estimated_impact.map(|i| i.as_str()))
        .bind(record.status.as_str())
        .bind(record.ended_at.map(|dt| dt.to_rfc3339()))
        .bind(record.duration_seconds)
        .bind(&logs)
        .bind(record.after.map(|a| a.total_nodes))
        .bind(record.after.map(|a| a.quality_score))
        .bind(record.delta_nodes)
        .bind(record.delta_quality_score)
        .bind(record.updated_at.to_rfc3339())
        .bind(&record.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_domain(&self, domain_id: &str, limit: usize) -> Result<Vec<IngestionRecord>> {
        let rows: Vec<IngestionRow> = sqlx::query_as(
            "SELECT * FROM ingestion_records WHERE domain_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(domain_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_record()).collect()
    }

    async fn stats(&self, domain_id: &str) -> Result<IngestionStats> {
        let (total, completed, failed, total_nodes_ingested): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(nodes_successful), 0)
                FROM ingestion_records WHERE domain_id = ?
                "#,
            )
            .bind(domain_id)
            .fetch_one(&self.pool)
            .await?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT ingestion_type, COUNT(*) FROM ingestion_records
            WHERE domain_id = ? GROUP BY ingestion_type ORDER BY COUNT(*) DESC
            "#,
        )
        .bind(domain_id)
        .fetch_all(&self.pool)
        .await?;

        let success_rate = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Ok(IngestionStats {
            total,
            completed,
            failed,
            success_rate,
            by_type: by_type
                .into_iter()
                .filter_map(|(t, c)| IngestionType::parse(&t).map(|it| (it, c)))
                .collect(),
            total_nodes_ingested,
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Other(format!("Failed to serialize: {}", e)))
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct IngestionRow {
    id: String,
    domain_id: String,
    subdomain_id: Option<String>,
    ingestion_type: String,
    source: Option<String>,
    node_ids: Option<String>,
    nodes_total: i64,
    nodes_successful: i64,
    nodes_failed: i64,
    nodes_skipped: i64,
    validation_passed: i64,
    validation_failed: i64,
    validation_errors: Option<String>,
    duplicates_found: i64,
    requires_retraining: i64,
    estimated_impact: Option<String>,
    status: String,
    executed_by: String,
    started_at: String,
    ended_at: Option<String>,
    duration_seconds: Option<i64>,
    logs: Option<String>,
    before_total_nodes: Option<i64>,
    before_quality_score: Option<i64>,
    after_total_nodes: Option<i64>,
    after_quality_score: Option<i64>,
    delta_nodes: Option<i64>,
    delta_quality_score: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl IngestionRow {
    fn into_record(self) -> Result<IngestionRecord> {
        let ingestion_type = IngestionType::parse(&self.ingestion_type)
            .ok_or_else(|| Error::Other(format!("Invalid ingestion type: {}", self.ingestion_type)))?;
        let status = IngestionStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Invalid ingestion status: {}", self.status)))?;

        let source: Option<SourceDescriptor> = self
            .source
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let node_ids: Vec<String> = self
            .node_ids
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        let validation_errors: Vec<String> = self
            .validation_errors
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        let logs: Vec<IngestionLogEntry> = self
            .logs
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        let before = match (self.before_total_nodes, self.before_quality_score) {
            (Some(total_nodes), Some(quality_score)) => Some(MetricsSnapshot {
                total_nodes,
                quality_score,
            }),
            _ => None,
        };
        let after = match (self.after_total_nodes, self.after_quality_score) {
            (Some(total_nodes), Some(quality_score)) => Some(MetricsSnapshot {
                total_nodes,
                quality_score,
            }),
            _ => None,
        };

        Ok(IngestionRecord {
            id: self.id,
            domain_id: self.domain_id,
            subdomain_id: self.subdomain_id,
            ingestion_type,
            source,
            node_ids,
            processed: ProcessedCounts {
                total: self.nodes_total,
                successful: self.nodes_successful,
                failed: self.nodes_failed,
                skipped: self.nodes_skipped,
            },
            validation_passed: self.validation_passed,
            validation_failed: self.validation_failed,
            validation_errors,
            duplicates_found: self.duplicates_found,
            requires_retraining: self.requires_retraining != 0,
            estimated_impact: self.estimated_impact.as_deref().and_then(EstimatedImpact::parse),
            status,
            executed_by: self.executed_by,
            started_at: parse_timestamp(&self.started_at),
            ended_at: parse_optional_timestamp(self.ended_at.as_deref()),
            duration_seconds: self.duration_seconds,
            logs,
            before,
            after,
            delta_nodes: self.delta_nodes,
            delta_quality_score: self.delta_quality_score,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{Domain, DomainName, HierarchyRepository};
    use crate::infrastructure::hierarchy::SqliteHierarchyRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> (SqliteIngestionRepository, String) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool).await.expect("Failed to run migrations");

        let hierarchy = SqliteHierarchyRepository::new(pool.clone());
        let domain = Domain::new(DomainName::Osint, "OSINT");
        hierarchy.create_domain(&domain).await.unwrap();

        (SqliteIngestionRepository::new(pool), domain.id)
    }

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let (repo, domain_id) = setup_test_db().await;

        let mut record = IngestionRecord::new(&domain_id, None, IngestionType::WebScraping, "op")
            .with_source(SourceDescriptor {
                name: Some("public registry".into()),
                url: Some("https://example.org/feed".into()),
                format: Some("JSON".into()),
                record_count: Some(120),
            });
        record.before = Some(MetricsSnapshot {
            total_nodes: 10,
            quality_score: 70,
        });
        record.log(IngestionLogEntry::info("starting"));

        repo.create(&record).await.unwrap();

        let fetched = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.ingestion_type, IngestionType::WebScraping);
        assert_eq!(fetched.status, IngestionStatus::Pending);
        assert_eq!(fetched.source.as_ref().and_then(|s| s.record_count), Some(120));
        assert_eq!(fetched.before.map(|b| b.total_nodes), Some(10));
        assert_eq!(fetched.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_update_round_trip() {
        let (repo, domain_id) = setup_test_db().await;

        let mut record = IngestionRecord::new(&domain_id, None, IngestionType::Api, "op");
        repo.create(&record).await.unwrap();

        record.status = IngestionStatus::Completed;
        record.processed = ProcessedCounts {
            total: 5,
            successful: 3,
            failed: 1,
            skipped: 1,
        };
        record.node_ids = vec!["n1".into(), "n2".into(), "n3".into()];
        record.requires_retraining = true;
        record.estimated_impact = Some(EstimatedImpact::High);
        record.delta_nodes = Some(3);

        repo.update(&record).await.unwrap();

        let fetched = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, IngestionStatus::Completed);
        assert_eq!(fetched.processed.total, 5);
        assert_eq!(fetched.node_ids.len(), 3);
        assert!(fetched.requires_retraining);
        assert_eq!(fetched.estimated_impact, Some(EstimatedImpact::High));
        assert_eq!(fetched.delta_nodes, Some(3));
    }

    #[tokio::test]
    async fn test_list_by_domain_recency_and_limit() {
        let (repo, domain_id) = setup_test_db().await;

        for i in 0..3i64 {
            let mut record = IngestionRecord::new(&domain_id, None, IngestionType::Manual, "op");
            // Distinct created_at values so the ordering is deterministic
            record.created_at = chrono::Utc::now() + chrono::Duration::seconds(i);
            repo.create(&record).await.unwrap();
        }

        let all = repo.list_by_domain(&domain_id, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].created_at >= all[1].created_at);

        let limited = repo.list_by_domain(&domain_id, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_aggregation() {
        let (repo, domain_id) = setup_test_db().await;

        let mut completed = IngestionRecord::new(&domain_id, None, IngestionType::Manual, "op");
        completed.status = IngestionStatus::Completed;
        completed.processed.successful = 7;
        repo.create(&completed).await.unwrap();

        let mut failed = IngestionRecord::new(&domain_id, None, IngestionType::Api, "op");
        failed.status = IngestionStatus::Failed;
        repo.create(&failed).await.unwrap();

        let stats = repo.stats(&domain_id).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 50.0).abs() < 1e-9);
        assert_eq!(stats.total_nodes_ingested, 7);
        assert_eq!(stats.by_type.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_empty_domain() {
        let (repo, domain_id) = setup_test_db().await;

        let stats = repo.stats(&domain_id).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.by_type.is_empty());
    }
}
