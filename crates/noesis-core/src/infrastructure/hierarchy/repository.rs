//! SQLite implementation of the HierarchyRepository
//!
//! Domains and subdomains map to one row each; metadata persists as a JSON
//! text column. The aggregate reads feeding the recompute operations are
//! plain SQL over the nodes table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::hierarchy::{
    Domain, DomainMetadata, DomainName, HierarchyRepository, LifecycleStatus, NodeCounts,
    Subdomain, SubdomainMetadata, SubdomainNodeBreakdown,
};
use crate::error::{Error, Result, map_unique_violation};
use crate::infrastructure::timestamps::{parse_optional_timestamp, parse_timestamp};

/// SQLite implementation of the hierarchy repository
#[derive(Clone)]
pub struct SqliteHierarchyRepository {
    pool: SqlitePool,
}

impl SqliteHierarchyRepository {
    /// Create a new SQLite hierarchy repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HierarchyRepository for SqliteHierarchyRepository {
    // ========== Domain Operations ==========

    async fn create_domain(&self, domain: &Domain) -> Result<()> {
        let metadata_json = serde_json::to_string(&domain.metadata)
            .map_err(|e| Error::Other(format!("Failed to serialize domain metadata: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO domains (
                id, name, description, icon, color, priority, status,
                total_nodes, quality_score, last_model_update, metadata,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&domain.id)
        .bind(domain.name.as_str())
        .bind(&domain.description)
        .bind(&domain.icon)
        .bind(&domain.color)
        .bind(domain.priority as i64)
        .bind(domain.status.as_str())
        .bind(domain.total_nodes)
        .bind(domain.quality_score)
        .bind(domain.last_model_update.map(|dt| dt.to_rfc3339()))
        .bind(&metadata_json)
        .bind(domain.created_at.to_rfc3339())
        .bind(domain.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &format!("domain name '{}'", domain.name)))?;

        debug!(domain_id = %domain.id, name = %domain.name, "Domain saved");
        Ok(())
    }

    async fn get_domain(&self, id: &str) -> Result<Option<Domain>> {
        let row: Option<DomainRow> = sqlx::query_as("SELECT * FROM domains WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    async fn get_domain_by_name(&self, name: DomainName) -> Result<Option<Domain>> {
        let row: Option<DomainRow> = sqlx::query_as("SELECT * FROM domains WHERE name = ?")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    async fn list_domains(
        &self,
        status: Option<LifecycleStatus>,
        priority: Option<u8>,
    ) -> Result<Vec<Domain>> {
        let rows: Vec<DomainRow> = match (status, priority) {
            (Some(status), Some(priority)) => {
                sqlx::query_as(
                    "SELECT * FROM domains WHERE status = ? AND priority = ? ORDER BY priority DESC, created_at DESC",
                )
                .bind(status.as_str())
                .bind(priority as i64)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(status), None) => {
                sqlx::query_as(
                    "SELECT * FROM domains WHERE status = ? ORDER BY priority DESC, created_at DESC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(priority)) => {
                sqlx::query_as(
                    "SELECT * FROM domains WHERE priority = ? ORDER BY priority DESC, created_at DESC",
                )
                .bind(priority as i64)
                .fetch_all(&self.pool)
                .await?
            }
            (None, None) => {
                sqlx::query_as("SELECT * FROM domains ORDER BY priority DESC, created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    async fn update_domain(&self, domain: &Domain) -> Result<()> {
        let metadata_json = serde_json::to_string(&domain.metadata)
            .map_err(|e| Error::Other(format!("Failed to serialize domain metadata: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE domains SET
                description = ?, icon = ?, color = ?, priority = ?, status = ?,
                last_model_update = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&domain.description)
        .bind(&domain.icon)
        .bind(&domain.color)
        .bind(domain.priority as i64)
        .bind(domain.status.as_str())
        .bind(domain.last_model_update.map(|dt| dt.to_rfc3339()))
        .bind(&metadata_json)
        .bind(domain.updated_at.to_rfc3339())
        .bind(&domain.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_domain_total_nodes(&self, id: &str, total: i64) -> Result<()> {
        sqlx::query("UPDATE domains SET total_nodes = ?, updated_at = ? WHERE id = ?")
            .bind(total)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_domain_quality_score(&self, id: &str, score: i64) -> Result<()> {
        sqlx::query("UPDATE domains SET quality_score = ?, updated_at = ? WHERE id = ?")
            .bind(score.clamp(0, 100))
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========== Subdomain Operations ==========

    async fn create_subdomain(&self, subdomain: &Subdomain) -> Result<()> {
        let metadata_json = serde_json::to_string(&subdomain.metadata)
            .map_err(|e| Error::Other(format!("Failed to serialize subdomain metadata: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO subdomains (
                id, domain_id, name, description, slug, icon, display_order,
                total_nodes, validated_nodes, quality_score, status,
                last_ingestion_at, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&subdomain.id)
        .bind(&subdomain.domain_id)
        .bind(&subdomain.name)
        .bind(&subdomain.description)
        .bind(&subdomain.slug)
        .bind(&subdomain.icon)
        .bind(subdomain.display_order)
        .bind(subdomain.total_nodes)
        .bind(subdomain.validated_nodes)
        .bind(subdomain.quality_score)
        .bind(subdomain.status.as_str())
        .bind(subdomain.last_ingestion_at.map(|dt| dt.to_rfc3339()))
        .bind(&metadata_json)
        .bind(subdomain.created_at.to_rfc3339())
        .bind(subdomain.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(
                e,
                &format!("subdomain slug '{}' in domain {}", subdomain.slug, subdomain.domain_id),
            )
        })?;

        debug!(subdomain_id = %subdomain.id, slug = %subdomain.slug, "Subdomain saved");
        Ok(())
    }

    async fn get_subdomain(&self, id: &str) -> Result<Option<Subdomain>> {
        let row: Option<SubdomainRow> = sqlx::query_as("SELECT * FROM subdomains WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_subdomain()).transpose()
    }

    async fn get_subdomain_by_slug(&self, domain_id: &str, slug: &str) -> Result<Option<Subdomain>> {
        let row: Option<SubdomainRow> =
            sqlx::query_as("SELECT * FROM subdomains WHERE domain_id = ? AND slug = ?")
                .bind(domain_id)
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_subdomain()).transpose()
    }

    async fn list_subdomains(
        &self,
        domain_id: &str,
        status: Option<LifecycleStatus>,
    ) -> Result<Vec<Subdomain>> {
        let rows: Vec<SubdomainRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    "SELECT * FROM subdomains WHERE domain_id = ? AND status = ? ORDER BY display_order, created_at DESC",
                )
                .bind(domain_id)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM subdomains WHERE domain_id = ? ORDER BY display_order, created_at DESC",
                )
                .bind(domain_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(|r| r.into_subdomain()).collect()
    }

    async fn update_subdomain(&self, subdomain: &Subdomain) -> Result<()> {
        let metadata_json = serde_json::to_string(&subdomain.metadata)
            .map_err(|e| Error::Other(format!("Failed to serialize subdomain metadata: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE subdomains SET
                name = ?, description = ?, icon = ?, display_order = ?,
                status = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&subdomain.name)
        .bind(&subdomain.description)
        .bind(&subdomain.icon)
        .bind(subdomain.display_order)
        .bind(subdomain.status.as_str())
        .bind(&metadata_json)
        .bind(subdomain.updated_at.to_rfc3339())
        .bind(&subdomain.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_subdomain_node_counts(&self, id: &str, counts: NodeCounts) -> Result<()> {
        sqlx::query(
            "UPDATE subdomains SET total_nodes = ?, validated_nodes = ?, updated_at = ? WHERE id = ?",
        )
        .bind(counts.total)
        .bind(counts.validated)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_subdomain_quality_score(&self, id: &str, score: i64) -> Result<()> {
        sqlx::query("UPDATE subdomains SET quality_score = ?, updated_at = ? WHERE id = ?")
            .bind(score.clamp(0, 100))
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_subdomain_last_ingestion(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE subdomains SET last_ingestion_at = ?, updated_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========== Aggregate Reads ==========

    async fn count_subdomain_nodes(&self, subdomain_id: &str) -> Result<NodeCounts> {
        let (total, validated): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN validation_status = 'approved' THEN 1 ELSE 0 END), 0)
            FROM nodes WHERE subdomain_id = ?
            "#,
        )
        .bind(subdomain_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(NodeCounts { total, validated })
    }

    async fn count_domain_nodes(&self, domain_id: &str) -> Result<NodeCounts> {
        let (total, validated): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN n.validation_status = 'approved' THEN 1 ELSE 0 END), 0)
            FROM nodes n
            JOIN subdomains s ON n.subdomain_id = s.id
            WHERE s.domain_id = ?
            "#,
        )
        .bind(domain_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(NodeCounts { total, validated })
    }

    async fn mean_approved_feedback_for_subdomain(
        &self,
        subdomain_id: &str,
    ) -> Result<Option<f64>> {
        let (mean,): (Option<f64>,) = sqlx::query_as(
            r#"
            SELECT AVG(feedback_score) FROM nodes
            WHERE subdomain_id = ? AND validation_status = 'approved'
            "#,
        )
        .bind(subdomain_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(mean)
    }

    async fn mean_approved_feedback_for_domain(&self, domain_id: &str) -> Result<Option<f64>> {
        let (mean,): (Option<f64>,) = sqlx::query_as(
            r#"
            SELECT AVG(n.feedback_score)
            FROM nodes n
            JOIN subdomains s ON n.subdomain_id = s.id
            WHERE s.domain_id = ? AND n.validation_status = 'approved'
            "#,
        )
        .bind(domain_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(mean)
    }

    async fn subdomain_node_breakdown(&self, subdomain_id: &str) -> Result<SubdomainNodeBreakdown> {
        let (total, validated, pending, rejected): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN validation_status = 'approved' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN validation_status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN validation_status = 'rejected' THEN 1 ELSE 0 END), 0)
            FROM nodes WHERE subdomain_id = ?
            "#,
        )
        .bind(subdomain_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SubdomainNodeBreakdown {
            total,
            validated,
            pending,
            rejected,
        })
    }
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct DomainRow {
    id: String,
    name: String,
    description: String,
    icon: String,
    color: String,
    priority: i64,
    status: String,
    total_nodes: i64,
    quality_score: i64,
    last_model_update: Option<String>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DomainRow {
    fn into_domain(self) -> Result<Domain> {
        let name = DomainName::parse(&self.name)
            .ok_or_else(|| Error::Other(format!("Invalid domain name: {}", self.name)))?;
        let status = LifecycleStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Invalid domain status: {}", self.status)))?;

        let metadata: DomainMetadata = self
            .metadata
            .as_ref()
            .map(|s| serde_json::from_str(s).unwrap_or_default())
            .unwrap_or_default();

        Ok(Domain {
            id: self.id,
            name,
            description: self.description,
            icon: self.icon,
            color: self.color,
            priority: self.priority.clamp(1, 10) as u8,
            status,
            total_nodes: self.total_nodes,
            quality_score: self.quality_score,
            last_model_update: parse_optional_timestamp(self.last_model_update.as_deref()),
            metadata,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct SubdomainRow {
    id: String,
    domain_id: String,
    name: String,
    description: Option<String>,
    slug: String,
    icon: Option<String>,
    display_order: i64,
    total_nodes: i64,
    validated_nodes: i64,
    quality_score: i64,
    status: String,
    last_ingestion_at: Option<String>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SubdomainRow {
    fn into_subdomain(self) -> Result<Subdomain> {
        let status = LifecycleStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Invalid subdomain status: {}", self.status)))?;

        let metadata: SubdomainMetadata = self
            .metadata
            .as_ref()
            .map(|s| serde_json::from_str(s).unwrap_or_default())
            .unwrap_or_default();

        Ok(Subdomain {
            id: self.id,
            domain_id: self.domain_id,
            name: self.name,
            description: self.description,
            slug: self.slug,
            icon: self.icon,
            display_order: self.display_order,
            total_nodes: self.total_nodes,
            validated_nodes: self.validated_nodes,
            quality_score: self.quality_score,
            status,
            last_ingestion_at: parse_optional_timestamp(self.last_ingestion_at.as_deref()),
            metadata,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}
