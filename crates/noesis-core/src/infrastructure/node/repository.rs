//! SQLite implementation of the NodeRepository
//!
//! The node row holds current state and cached scores; validation history,
//! feedback entries, and content revisions live in append-only side tables.
//! Keyword search uses json_each over the keywords JSON column.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::node::{
    ContentRevision, ContentType, FeedbackEntry, KeywordMatch, KnowledgeNode, NodeFilter,
    NodeMetadata, NodeRepository, SourceInfo, ValidationRecord, ValidationState, ValidationStatus,
};
use crate::error::{Error, Result};
use crate::infrastructure::timestamps::{parse_optional_timestamp, parse_timestamp};

/// SQLite implementation of the node repository
#[derive(Clone)]
pub struct SqliteNodeRepository {
    pool: SqlitePool,
}

impl SqliteNodeRepository {
    /// Create a new SQLite node repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NodeRepository for SqliteNodeRepository {
    async fn create(&self, node: &KnowledgeNode) -> Result<()> {
        let keywords = to_json(&node.keywords)?;
        let examples = to_json(&node.examples)?;
        let related = to_json(&node.related_node_ids)?;
        let structured = node
            .structured_data
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()
            .map_err(|e| Error::Other(format!("Failed to serialize structured data: {}", e)))?;
        let source = node
            .source
            .as_ref()
            .map(|s| serde_json::to_string(s))
            .transpose()
            .map_err(|e| Error::Other(format!("Failed to serialize source: {}", e)))?;
        let metadata = serde_json::to_string(&node.metadata)
            .map_err(|e| Error::Other(format!("Failed to serialize node metadata: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO nodes (
                id, subdomain_id, category, title, content, summary,
                keywords, examples, related_node_ids, content_type,
                structured_data, source,
                validation_status, validation_score, approved_by, approved_at, rejection_reason,
                effective_date, expiry_date,
                view_count, usage_in_models, feedback_score, version,
                metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.id)
        .bind(&node.subdomain_id)
        .bind(&node.category)
        .bind(&node.title)
        .bind(&node.content)
        .bind(&node.summary)
        .bind(&keywords)
        .bind(&examples)
        .bind(&related)
        .bind(node.content_type.as_str())
        .bind(&structured)
        .bind(&source)
        .bind(node.validation.status.as_str())
        .bind(node.validation.score)
        .bind(&node.validation.approved_by)
        .bind(node.validation.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(&node.validation.rejection_reason)
        .bind(node.effective_date.to_rfc3339())
        .bind(node.expiry_date.map(|dt| dt.to_rfc3339()))
        .bind(node.view_count)
        .bind(node.usage_in_models)
        .bind(node.feedback_score)
        .bind(node.version)
        .bind(&metadata)
        .bind(node.created_at.to_rfc3339())
        .bind(node.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(node_id = %node.id, title = %node.title, "Node saved");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<KnowledgeNode>> {
        let row: Option<NodeRow> = sqlx::query_as("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_node()).transpose()
    }

    async fn get_many(
        &self,
        ids: &[String],
        status: Option<ValidationStatus>,
    ) -> Result<Vec<KnowledgeNode>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let query = match status {
            Some(_) => format!(
                "SELECT * FROM nodes WHERE id IN ({}) AND validation_status = ? ORDER BY feedback_score DESC, created_at DESC",
                placeholders
            ),
            None => format!(
                "SELECT * FROM nodes WHERE id IN ({}) ORDER BY feedback_score DESC, created_at DESC",
                placeholders
            ),
        };

        let mut query_builder = sqlx::query_as::<_, NodeRow>(&query);
        for id in ids {
            query_builder = query_builder.bind(id);
        }
        if let Some(status) = status {
            query_builder = query_builder.bind(status.as_str());
        }

        let rows: Vec<NodeRow> = query_builder.fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn find_by_title(
        &self,
        subdomain_id: &str,
        title: &str,
    ) -> Result<Option<KnowledgeNode>> {
        let row: Option<NodeRow> =
            sqlx::query_as("SELECT * FROM nodes WHERE subdomain_id = ? AND title = ?")
                .bind(subdomain_id)
                .bind(title)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_node()).transpose()
    }

    async fn list_by_subdomain(
        &self,
        subdomain_id: &str,
        filter: &NodeFilter,
    ) -> Result<Vec<KnowledgeNode>> {
        let mut query = String::from("SELECT * FROM nodes WHERE subdomain_id = ?");
        if filter.status.is_some() {
            query.push_str(" AND validation_status = ?");
        }
        if filter.category.is_some() {
            query.push_str(" AND category = ?");
        }
        if filter.content_type.is_some() {
            query.push_str(" AND content_type = ?");
        }
        query.push_str(" ORDER BY feedback_score DESC, created_at DESC");

        let mut query_builder = sqlx::query_as::<_, NodeRow>(&query).bind(subdomain_id);
        if let Some(status) = filter.status {
            query_builder = query_builder.bind(status.as_str());
        }
        if let Some(category) = &filter.category {
            query_builder = query_builder.bind(category);
        }
        if let Some(content_type) = filter.content_type {
            query_builder = query_builder.bind(content_type.as_str());
        }

        let rows: Vec<NodeRow> = query_builder.fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn search_by_keywords(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<KeywordMatch>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = keywords.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let query = format!(
            r#"
            SELECT n.id, COUNT(k.value) AS matched
            FROM nodes n, json_each(n.keywords) k
            WHERE n.validation_status = 'approved' AND k.value IN ({})
            GROUP BY n.id
            ORDER BY matched DESC, n.feedback_score DESC, n.created_at DESC
            LIMIT ?
            "#,
            placeholders
        );

        let mut query_builder = sqlx::query_as::<_, (String, i64)>(&query);
        for keyword in keywords {
            query_builder = query_builder.bind(keyword);
        }
        query_builder = query_builder.bind(limit as i64);

        let hits: Vec<(String, i64)> = query_builder.fetch_all(&self.pool).await?;

        let mut matches = Vec::with_capacity(hits.len());
        for (node_id, matched_keywords) in hits {
            if let Some(node) = self.get(&node_id).await? {
                matches.push(KeywordMatch {
                    node,
                    matched_keywords,
                });
            }
        }

        Ok(matches)
    }

    async fn record_validation(&self, node_id: &str, record: &ValidationRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Current status is last-write-wins; approval/rejection stamps persist
        let result = match record.status {
            ValidationStatus::Approved => {
                sqlx::query(
                    r#"
                    UPDATE nodes SET
                        validation_status = ?, validation_score = ?,
                        approved_by = ?, approved_at = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(record.status.as_str())
                .bind(record.score)
                .bind(&record.validated_by)
                .bind(record.validated_at.to_rfc3339())
                .bind(record.validated_at.to_rfc3339())
                .bind(node_id)
                .execute(&mut *tx)
                .await?
            }
            ValidationStatus::Rejected => {
                sqlx::query(
                    r#"
                    UPDATE nodes SET
                        validation_status = ?, validation_score = ?,
                        rejection_reason = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(record.status.as_str())
                .bind(record.score)
                .bind(&record.comments)
                .bind(record.validated_at.to_rfc3339())
                .bind(node_id)
                .execute(&mut *tx)
                .await?
            }
            _ => {
                sqlx::query(
                    "UPDATE nodes SET validation_status = ?, validation_score = ?, updated_at = ? WHERE id = ?",
                )
                .bind(record.status.as_str())
                .bind(record.score)
                .bind(record.validated_at.to_rfc3339())
                .bind(node_id)
                .execute(&mut *tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::NodeNotFound(node_id.to_string()));
        }

        // Each validation is an independent append; concurrent validations
        // on the same node cannot lose each other's entries
        sqlx::query(
            r#"
            INSERT INTO node_validations (id, node_id, validated_by, validated_at, status, score, comments)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(node_id)
        .bind(&record.validated_by)
        .bind(record.validated_at.to_rfc3339())
        .bind(record.status.as_str())
        .bind(record.score)
        .bind(&record.comments)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_validations(&self, node_id: &str) -> Result<Vec<ValidationRecord>> {
        let rows: Vec<ValidationRow> = sqlx::query_as(
            "SELECT * FROM node_validations WHERE node_id = ? ORDER BY validated_at, rowid",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_record()).collect()
    }

    async fn update_content(
        &self,
        node_id: &str,
        expected_version: i64,
        new_content: &str,
        modified_by: &str,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT content FROM nodes WHERE id = ? AND version = ?")
                .bind(node_id)
                .bind(expected_version)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((old_content,)) = current else {
            tx.rollback().await?;
            return Ok(false);
        };

        let now = Utc::now();

        // UNIQUE(node_id, version) doubles as a guard: a concurrent writer
        // that already archived this version makes the insert fail
        let archived = sqlx::query(
            r#"
            INSERT INTO node_revisions (id, node_id, version, content, modified_by, modified_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(node_id)
        .bind(expected_version)
        .bind(&old_content)
        .bind(modified_by)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await;

        if let Err(e) = archived {
            tx.rollback().await?;
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return Ok(false);
                }
            }
            return Err(e.into());
        }

        let result = sqlx::query(
            "UPDATE nodes SET content = ?, version = version + 1, updated_at = ? WHERE id = ? AND version = ?",
        )
        .bind(new_content)
        .bind(now.to_rfc3339())
        .bind(node_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        debug!(node_id = %node_id, version = expected_version + 1, "Node content replaced");
        Ok(true)
    }

    async fn list_revisions(&self, node_id: &str) -> Result<Vec<ContentRevision>> {
        let rows: Vec<RevisionRow> = sqlx::query_as(
            "SELECT * FROM node_revisions WHERE node_id = ? ORDER BY version",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_revision()).collect())
    }

    async fn add_feedback(&self, node_id: &str, entry: &FeedbackEntry) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO node_feedback (id, node_id, user_id, rating, comment, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(node_id)
        .bind(&entry.user_id)
        .bind(entry.rating)
        .bind(&entry.comment)
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        // Recompute from the feedback table in one statement so concurrent
        // appends cannot lose each other's ratings
        let result = sqlx::query(
            r#"
            UPDATE nodes SET
                feedback_score = (
                    SELECT CAST(ROUND(AVG(rating) * 20) AS INTEGER)
                    FROM node_feedback WHERE node_id = ?
                ),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(node_id)
        .bind(entry.created_at.to_rfc3339())
        .bind(node_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::NodeNotFound(node_id.to_string()));
        }

        let (score,): (i64,) = sqlx::query_as("SELECT feedback_score FROM nodes WHERE id = ?")
            .bind(node_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(score)
    }

    async fn list_feedback(&self, node_id: &str) -> Result<Vec<FeedbackEntry>> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(
            "SELECT * FROM node_feedback WHERE node_id = ? ORDER BY created_at, rowid",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_entry()).collect())
    }

    async fn record_view(&self, node_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE nodes SET view_count = view_count + 1 WHERE id = ?")
            .bind(node_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_model_usage(&self, node_id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE nodes SET usage_in_models = usage_in_models + 1 WHERE id = ?")
                .bind(node_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_expiring(&self, within_days: i64) -> Result<Vec<KnowledgeNode>> {
        let now = Utc::now();
        let cutoff = now + Duration::days(within_days);

        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT * FROM nodes
            WHERE expiry_date IS NOT NULL AND expiry_date >= ? AND expiry_date <= ?
            ORDER BY expiry_date
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn update(&self, node: &KnowledgeNode) -> Result<()> {
        let keywords = to_json(&node.keywords)?;
        let examples = to_json(&node.examples)?;
        let related = to_json(&node.related_node_ids)?;
        let structured = node
            .structured_data
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()
            .map_err(|e| Error::Other(format!("Failed to serialize structured data: {}", e)))?;
        let source = node
            .source
            .as_ref()
            .map(|s| serde_json::to_string(s))
            .transpose()
            .map_err(|e| Error::Other(format!("Failed to serialize source: {}", e)))?;
        let metadata = serde_json::to_string(&node.metadata)
            .map_err(|e| Error::Other(format!("Failed to serialize node metadata: {}", e)))?;

        // Content, version, validation state, and counters have dedicated
        // write paths; this covers the descriptive fields
        sqlx::query(
            r#"
            UPDATE nodes SET
                category = ?, title = ?, summary = ?,
                keywords = ?, examples = ?, related_node_ids = ?,
                content_type = ?, structured_data = ?, source = ?,
                effective_date = ?, expiry_date = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&node.category)
        .bind(&node.title)
        .bind(&node.summary)
        .bind(&keywords)
        .bind(&examples)
        .bind(&related)
        .bind(node.content_type.as_str())
        .bind(&structured)
        .bind(&source)
        .bind(node.effective_date.to_rfc3339())
        .bind(node.expiry_date.map(|dt| dt.to_rfc3339()))
        .bind(&metadata)
        .bind(node.updated_at.to_rfc3339())
        .bind(&node.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Other(format!("Failed to serialize: {}", e)))
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct NodeRow {
    id: String,
    subdomain_id: String,
    category: String,
    title: String,
    content: String,
    summary: String,
    keywords: Option<String>,
    examples: Option<String>,
    related_node_ids: Option<String>,
    content_type: String,
    structured_data: Option<String>,
    source: Option<String>,
    validation_status: String,
    validation_score: i64,
    approved_by: Option<String>,
    approved_at: Option<String>,
    rejection_reason: Option<String>,
    effective_date: String,
    expiry_date: Option<String>,
    view_count: i64,
    usage_in_models: i64,
    feedback_score: i64,
    version: i64,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl NodeRow {
    fn into_node(self) -> Result<KnowledgeNode> {
        let content_type = ContentType::parse(&self.content_type)
            .ok_or_else(|| Error::Other(format!("Invalid content type: {}", self.content_type)))?;
        let status = ValidationStatus::parse(&self.validation_status).ok_or_else(|| {
            Error::Other(format!("Invalid validation status: {}", self.validation_status))
        })?;

        let keywords: Vec<String> = from_json_or_default(self.keywords.as_deref());
        let examples: Vec<String> = from_json_or_default(self.examples.as_deref());
        let related_node_ids: Vec<String> = from_json_or_default(self.related_node_ids.as_deref());
        let structured_data: Option<serde_json::Value> = self
            .structured_data
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let source: Option<SourceInfo> = self
            .source
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let metadata: NodeMetadata = self
            .metadata
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(|| NodeMetadata::new("unknown"));

        Ok(KnowledgeNode {
            id: self.id,
            subdomain_id: self.subdomain_id,
            category: self.category,
            title: self.title,
            content: self.content,
            summary: self.summary,
            keywords,
            examples,
            related_node_ids,
            content_type,
            structured_data,
            source,
            validation: ValidationState {
                status,
                score: self.validation_score,
                approved_by: self.approved_by,
                approved_at: parse_optional_timestamp(self.approved_at.as_deref()),
                rejection_reason: self.rejection_reason,
            },
            effective_date: parse_timestamp(&self.effective_date),
            expiry_date: parse_optional_timestamp(self.expiry_date.as_deref()),
            view_count: self.view_count,
            usage_in_models: self.usage_in_models,
            feedback_score: self.feedback_score,
            version: self.version,
            metadata,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

fn from_json_or_default<T: serde::de::DeserializeOwned + Default>(s: Option<&str>) -> T {
    s.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
}

#[derive(Debug, FromRow)]
struct ValidationRow {
    #[allow(dead_code)]
    id: String,
    #[allow(dead_code)]
    node_id: String,
    validated_by: String,
    validated_at: String,
    status: String,
    score: i64,
    comments: Option<String>,
}

impl ValidationRow {
    fn into_record(self) -> Result<ValidationRecord> {
        let status = ValidationStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Invalid validation status: {}", self.status)))?;

        Ok(ValidationRecord {
            validated_by: self.validated_by,
            validated_at: parse_timestamp(&self.validated_at),
            status,
            score: self.score,
            comments: self.comments,
        })
    }
}

#[derive(Debug, FromRow)]
struct FeedbackRow {
    #[allow(dead_code)]
    id: String,
    #[allow(dead_code)]
    node_id: String,
    user_id: String,
    rating: f64,
    comment: Option<String>,
    created_at: String,
}

impl FeedbackRow {
    fn into_entry(self) -> FeedbackEntry {
        FeedbackEntry {
            user_id: self.user_id,
            rating: self.rating,
            comment: self.comment,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug, FromRow)]
struct RevisionRow {
    #[allow(dead_code)]
    id: String,
    #[allow(dead_code)]
    node_id: String,
    version: i64,
    content: String,
    modified_by: String,
    modified_at: String,
}

impl RevisionRow {
    fn into_revision(self) -> ContentRevision {
        ContentRevision {
            version: self.version,
            content: self.content,
            modified_by: self.modified_by,
            modified_at: parse_timestamp(&self.modified_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{Domain, DomainName, HierarchyRepository, Subdomain};
    use crate::infrastructure::hierarchy::SqliteHierarchyRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> (SqliteNodeRepository, String) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool).await.expect("Failed to run migrations");

        let hierarchy = SqliteHierarchyRepository::new(pool.clone());
        let domain = Domain::new(DomainName::Cybersecurity, "Security");
        hierarchy.create_domain(&domain).await.unwrap();
        let subdomain = Subdomain::new(&domain.id, "Pentesting", "pentesting");
        hierarchy.create_subdomain(&subdomain).await.unwrap();

        (SqliteNodeRepository::new(pool), subdomain.id)
    }

    fn sample_node(subdomain_id: &str, title: &str) -> KnowledgeNode {
        KnowledgeNode::new(subdomain_id, "Technique", title, "Body", "Summary", "tester")
    }

    #[tokio::test]
    async fn test_save_and_get_node_round_trip() {
        let (repo, subdomain_id) = setup_test_db().await;

        let node = sample_node(&subdomain_id, "Buffer overflows")
            .with_keywords(vec!["memory".into(), "exploit".into()])
            .with_content_type(ContentType::Pattern)
            .with_source(SourceInfo {
                title: Some("Phrack".into()),
                url: Some("https://phrack.org".into()),
                author: Some("aleph1".into()),
                published_at: None,
                credibility: 95,
            })
            .with_structured_data(serde_json::json!({"cwe": 120}));

        repo.create(&node).await.unwrap();

        let fetched = repo.get(&node.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Buffer overflows");
        assert_eq!(fetched.keywords, vec!["memory".to_string(), "exploit".to_string()]);
        assert_eq!(fetched.content_type, ContentType::Pattern);
        assert_eq!(fetched.source.as_ref().map(|s| s.credibility), Some(95));
        assert_eq!(
            fetched.structured_data,
            Some(serde_json::json!({"cwe": 120}))
        );
        assert_eq!(fetched.metadata.created_by, "tester");
    }

    #[tokio::test]
    async fn test_find_by_title() {
        let (repo, subdomain_id) = setup_test_db().await;

        let node = sample_node(&subdomain_id, "Unique title");
        repo.create(&node).await.unwrap();

        let found = repo.find_by_title(&subdomain_id, "Unique title").await.unwrap();
        assert!(found.is_some());

        let missing = repo.find_by_title(&subdomain_id, "Other title").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_by_subdomain_filters_and_sort() {
        let (repo, subdomain_id) = setup_test_db().await;

        let mut high = sample_node(&subdomain_id, "High");
        high.feedback_score = 90;
        let mut low = sample_node(&subdomain_id, "Low");
        low.feedback_score = 10;
        low.category = "Other".into();

        repo.create(&high).await.unwrap();
        repo.create(&low).await.unwrap();

        let all = repo
            .list_by_subdomain(&subdomain_id, &NodeFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "High", "sorted by feedback score desc");

        let filtered = repo
            .list_by_subdomain(
                &subdomain_id,
                &NodeFilter {
                    category: Some("Other".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].title, "Low");
    }

    #[tokio::test]
    async fn test_record_validation_appends_and_updates() {
        let (repo, subdomain_id) = setup_test_db().await;

        let node = sample_node(&subdomain_id, "Reviewed");
        repo.create(&node).await.unwrap();

        let record = ValidationRecord {
            validated_by: "curator".into(),
            validated_at: Utc::now(),
            status: ValidationStatus::Approved,
            score: 88,
            comments: Some("well sourced".into()),
        };
        repo.record_validation(&node.id, &record).await.unwrap();

        let fetched = repo.get(&node.id).await.unwrap().unwrap();
        assert_eq!(fetched.validation.status, ValidationStatus::Approved);
        assert_eq!(fetched.validation.score, 88);
        assert_eq!(fetched.validation.approved_by.as_deref(), Some("curator"));

        let history = repo.list_validations(&node.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].comments.as_deref(), Some("well sourced"));

        // Missing node rolls back the history insert too
        let err = repo.record_validation("missing", &record).await.unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));
        let orphan_count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM node_validations WHERE node_id = 'missing'")
                .fetch_one(&repo.pool)
                .await
                .unwrap();
        assert_eq!(orphan_count.0, 0);
    }

    #[tokio::test]
    async fn test_update_content_version_check() {
        let (repo, subdomain_id) = setup_test_db().await;

        let node = sample_node(&subdomain_id, "Versioned");
        repo.create(&node).await.unwrap();

        let applied = repo
            .update_content(&node.id, 1, "new body", "editor")
            .await
            .unwrap();
        assert!(applied);

        let fetched = repo.get(&node.id).await.unwrap().unwrap();
        assert_eq!(fetched.version, 2);
        assert_eq!(fetched.content, "new body");

        // Stale version loses the race
        let applied = repo
            .update_content(&node.id, 1, "stale write", "editor")
            .await
            .unwrap();
        assert!(!applied);

        let fetched = repo.get(&node.id).await.unwrap().unwrap();
        assert_eq!(fetched.version, 2);
        assert_eq!(fetched.content, "new body");

        let revisions = repo.list_revisions(&node.id).await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].version, 1);
        assert_eq!(revisions[0].content, "Body");
    }

    #[tokio::test]
    async fn test_feedback_recompute() {
        let (repo, subdomain_id) = setup_test_db().await;

        let node = sample_node(&subdomain_id, "Rated");
        repo.create(&node).await.unwrap();

        let entry = |rating: f64| FeedbackEntry {
            user_id: "u".into(),
            rating,
            comment: None,
            created_at: Utc::now(),
        };

        assert_eq!(repo.add_feedback(&node.id, &entry(3.0)).await.unwrap(), 60);
        assert_eq!(repo.add_feedback(&node.id, &entry(4.0)).await.unwrap(), 70);
        // mean(3, 4, 4.5) = 3.8333 * 20 = 76.67 → 77
        assert_eq!(repo.add_feedback(&node.id, &entry(4.5)).await.unwrap(), 77);

        let feedback = repo.list_feedback(&node.id).await.unwrap();
        assert_eq!(feedback.len(), 3);
    }

    #[tokio::test]
    async fn test_keyword_search() {
        let (repo, subdomain_id) = setup_test_db().await;

        let mut both = sample_node(&subdomain_id, "Both keywords")
            .with_keywords(vec!["dns".into(), "recon".into()]);
        both.validation.status = ValidationStatus::Approved;
        let mut one = sample_node(&subdomain_id, "One keyword")
            .with_keywords(vec!["dns".into(), "malware".into()]);
        one.validation.status = ValidationStatus::Approved;
        let pending = sample_node(&subdomain_id, "Pending")
            .with_keywords(vec!["dns".into(), "recon".into()]);

        repo.create(&both).await.unwrap();
        repo.create(&one).await.unwrap();
        repo.create(&pending).await.unwrap();

        let results = repo
            .search_by_keywords(&["dns".into(), "recon".into()], 10)
            .await
            .unwrap();

        assert_eq!(results.len(), 2, "pending nodes are excluded");
        assert_eq!(results[0].node.id, both.id, "most matches first");
        assert_eq!(results[0].matched_keywords, 2);
        assert_eq!(results[1].matched_keywords, 1);
    }

    #[tokio::test]
    async fn test_get_many_with_status_filter() {
        let (repo, subdomain_id) = setup_test_db().await;

        let mut approved = sample_node(&subdomain_id, "Approved");
        approved.validation.status = ValidationStatus::Approved;
        let pending = sample_node(&subdomain_id, "Pending");

        repo.create(&approved).await.unwrap();
        repo.create(&pending).await.unwrap();

        let ids = vec![approved.id.clone(), pending.id.clone(), "missing".to_string()];

        let all = repo.get_many(&ids, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let approved_only = repo
            .get_many(&ids, Some(ValidationStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved_only.len(), 1);
        assert_eq!(approved_only[0].id, approved.id);

        let empty = repo.get_many(&[], None).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_counters() {
        let (repo, subdomain_id) = setup_test_db().await;

        let node = sample_node(&subdomain_id, "Counted");
        repo.create(&node).await.unwrap();

        assert!(repo.record_view(&node.id).await.unwrap());
        assert!(repo.record_model_usage(&node.id).await.unwrap());
        assert!(!repo.record_view("missing").await.unwrap());

        let fetched = repo.get(&node.id).await.unwrap().unwrap();
        assert_eq!(fetched.view_count, 1);
        assert_eq!(fetched.usage_in_models, 1);
    }

    #[tokio::test]
    async fn test_list_expiring_window() {
        let (repo, subdomain_id) = setup_test_db().await;

        let soon = sample_node(&subdomain_id, "Soon")
            .with_expiry_date(Utc::now() + Duration::days(5));
        let later = sample_node(&subdomain_id, "Later")
            .with_expiry_date(Utc::now() + Duration::days(60));
        let past = sample_node(&subdomain_id, "Past")
            .with_expiry_date(Utc::now() - Duration::days(1));

        repo.create(&soon).await.unwrap();
        repo.create(&later).await.unwrap();
        repo.create(&past).await.unwrap();

        let expiring = repo.list_expiring(30).await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].title, "Soon");
    }

    #[tokio::test]
    async fn test_update_descriptive_fields() {
        let (repo, subdomain_id) = setup_test_db().await;

        let node = sample_node(&subdomain_id, "Original");
        repo.create(&node).await.unwrap();

        let mut updated = node.clone();
        updated.title = "Renamed".into();
        updated.keywords = vec!["new".into()];
        repo.update(&updated).await.unwrap();

        let fetched = repo.get(&node.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Renamed");
        assert_eq!(fetched.keywords, vec!["new".to_string()]);
        // Content path untouched
        assert_eq!(fetched.content, "Body");
        assert_eq!(fetched.version, 1);
    }
}
