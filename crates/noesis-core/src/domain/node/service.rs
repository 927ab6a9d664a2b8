//! Knowledge node service
//!
//! High-level operations over the node store: creation, listing, keyword
//! search, the validation workflow, versioned content updates, feedback
//! scoring, and usage counters.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::entity::{
    ContentRevision, FeedbackEntry, KnowledgeNode, ValidationRecord, ValidationStatus,
};
use super::repository::{NodeFilter, NodeRepository};

/// Attempts for optimistic content updates before giving up
const CONTENT_UPDATE_RETRIES: u32 = 3;

/// Input for a validate call
#[derive(Debug, Clone)]
pub struct ValidationInput {
    pub status: ValidationStatus,
    /// Score assigned by the rater (0-100)
    pub score: i64,
    pub comments: Option<String>,
    pub validated_by: String,
}

/// A search hit with its computed relevance (0.0-1.0)
#[derive(Debug, Clone)]
pub struct RankedNode {
    pub node: KnowledgeNode,
    pub relevance: f64,
}

/// Service for knowledge node management
pub struct NodeService<R: NodeRepository> {
    repository: Arc<R>,
}

impl<R: NodeRepository> NodeService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Create a new node; validation starts pending with score 0
    pub async fn create_node(&self, node: KnowledgeNode) -> Result<KnowledgeNode> {
        for (field, value) in [
            ("category", &node.category),
            ("title", &node.title),
            ("content", &node.content),
            ("summary", &node.summary),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("node {} is required", field)));
            }
        }
        if let Some(source) = &node.source {
            if source.credibility > 100 {
                return Err(Error::InvalidInput(format!(
                    "source credibility must be 0-100, got {}",
                    source.credibility
                )));
            }
        }

        self.repository.create(&node).await?;
        info!(node_id = %node.id, subdomain_id = %node.subdomain_id, title = %node.title, "Node created");
        Ok(node)
    }

    /// Get a node by id
    pub async fn get_node(&self, id: &str) -> Result<KnowledgeNode> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }

    /// List nodes in a subdomain with optional filters
    pub async fn list_nodes(
        &self,
        subdomain_id: &str,
        filter: NodeFilter,
    ) -> Result<Vec<KnowledgeNode>> {
        self.repository.list_by_subdomain(subdomain_id, &filter).await
    }

    /// Keyword search over approved nodes
    ///
    /// Relevance is the fraction of query keywords present in the node's
    /// keyword set; ties break on feedback score via the repository sort.
    pub async fn search_by_keywords(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<RankedNode>> {
        if keywords.is_empty() {
            return Err(Error::InvalidInput("at least one keyword is required".into()));
        }

        let query_len = keywords.len() as f64;
        let matches = self.repository.search_by_keywords(keywords, limit).await?;

        Ok(matches
            .into_iter()
            .map(|m| RankedNode {
                relevance: m.matched_keywords as f64 / query_len,
                node: m.node,
            })
            .collect())
    }

    /// Record a validation outcome
    ///
    /// Appends an immutable history entry and updates the node's current
    /// status and score. Approval stamps approver and time; rejection stamps
    /// the reason. Any state may be revisited by a later call.
    pub async fn validate_node(&self, node_id: &str, input: ValidationInput) -> Result<KnowledgeNode> {
        if !(0..=100).contains(&input.score) {
            return Err(Error::InvalidInput(format!(
                "validation score must be 0-100, got {}",
                input.score
            )));
        }
        if input.validated_by.trim().is_empty() {
            return Err(Error::InvalidInput("validated_by is required".into()));
        }
        self.get_node(node_id).await?;

        let record = ValidationRecord {
            validated_by: input.validated_by,
            validated_at: Utc::now(),
            status: input.status,
            score: input.score,
            comments: input.comments,
        };

        self.repository.record_validation(node_id, &record).await?;
        info!(
            node_id = %node_id,
            status = %record.status,
            score = record.score,
            validated_by = %record.validated_by,
            "Node validated"
        );

        self.get_node(node_id).await
    }

    /// Validation history for a node, in call order
    pub async fn validation_history(&self, node_id: &str) -> Result<Vec<ValidationRecord>> {
        self.get_node(node_id).await?;
        self.repository.list_validations(node_id).await
    }

    /// Replace a node's content, archiving the prior version first
    ///
    /// The archive-then-replace pair runs as one transaction guarded by an
    /// optimistic version check; on a concurrent update the read-check-write
    /// cycle is retried a bounded number of times.
    pub async fn update_content(
        &self,
        node_id: &str,
        new_content: &str,
        modified_by: &str,
    ) -> Result<KnowledgeNode> {
        if new_content.trim().is_empty() {
            return Err(Error::InvalidInput("node content is required".into()));
        }

        for attempt in 0..CONTENT_UPDATE_RETRIES {
            let node = self.get_node(node_id).await?;
            let applied = self
                .repository
                .update_content(node_id, node.version, new_content, modified_by)
                .await?;

            if applied {
                debug!(
                    node_id = %node_id,
                    from_version = node.version,
                    to_version = node.version + 1,
                    "Node content updated"
                );
                return self.get_node(node_id).await;
            }

            warn!(node_id = %node_id, attempt = attempt + 1, "Content update lost version race, retrying");
        }

        Err(Error::UpdateConflict(node_id.to_string(), CONTENT_UPDATE_RETRIES))
    }

    /// Archived content revisions for a node, oldest first
    pub async fn revision_history(&self, node_id: &str) -> Result<Vec<ContentRevision>> {
        self.get_node(node_id).await?;
        self.repository.list_revisions(node_id).await
    }

    /// Append feedback and recompute the node's feedback score
    ///
    /// The score maps the 0-5 rating scale onto 0-100 as
    /// `round(mean(ratings) * 20)`.
    pub async fn add_feedback(
        &self,
        node_id: &str,
        user_id: &str,
        rating: f64,
        comment: Option<String>,
    ) -> Result<i64> {
        if !(0.0..=5.0).contains(&rating) {
            return Err(Error::InvalidInput(format!(
                "rating must be between 0 and 5, got {}",
                rating
            )));
        }
        self.get_node(node_id).await?;

        let entry = FeedbackEntry {
            user_id: user_id.to_string(),
            rating,
            comment,
            created_at: Utc::now(),
        };

        let score = self.repository.add_feedback(node_id, &entry).await?;
        debug!(node_id = %node_id, rating = rating, feedback_score = score, "Feedback recorded");
        Ok(score)
    }

    /// Raw feedback entries for a node
    pub async fn feedback_history(&self, node_id: &str) -> Result<Vec<FeedbackEntry>> {
        self.get_node(node_id).await?;
        self.repository.list_feedback(node_id).await
    }

    /// Record a view of the node
    pub async fn record_view(&self, node_id: &str) -> Result<()> {
        if !self.repository.record_view(node_id).await? {
            return Err(Error::NodeNotFound(node_id.to_string()));
        }
        Ok(())
    }

    /// Record that a model consumed this node
    pub async fn record_model_usage(&self, node_id: &str) -> Result<()> {
        if !self.repository.record_model_usage(node_id).await? {
            return Err(Error::NodeNotFound(node_id.to_string()));
        }
        Ok(())
    }

    /// Approved nodes referenced by this node's related-node list
    pub async fn related_nodes(&self, node_id: &str) -> Result<Vec<KnowledgeNode>> {
        let node = self.get_node(node_id).await?;
        if node.related_node_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.repository
            .get_many(&node.related_node_ids, Some(ValidationStatus::Approved))
            .await
    }

    /// Nodes whose expiry date falls within the next `within_days` days
    pub async fn expiring_nodes(&self, within_days: i64) -> Result<Vec<KnowledgeNode>> {
        if within_days < 0 {
            return Err(Error::InvalidInput("within_days must be non-negative".into()));
        }
        self.repository.list_expiring(within_days).await
    }

    /// Update non-content node fields via load-mutate-save
    pub async fn update_node(&self, mut node: KnowledgeNode) -> Result<KnowledgeNode> {
        self.get_node(&node.id).await?;
        node.updated_at = Utc::now();
        self.repository.update(&node).await?;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{Domain, DomainName, Subdomain};
    use crate::infrastructure::hierarchy::SqliteHierarchyRepository;
    use crate::infrastructure::node::SqliteNodeRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (NodeService<SqliteNodeRepository>, String, SqlitePool) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool).await.expect("Failed to run migrations");

        let hierarchy = SqliteHierarchyRepository::new(pool.clone());
        let domain = Domain::new(DomainName::Cybersecurity, "Security");
        crate::domain::hierarchy::HierarchyRepository::create_domain(&hierarchy, &domain)
            .await
            .unwrap();
        let subdomain = Subdomain::new(&domain.id, "Pentesting", "pentesting");
        crate::domain::hierarchy::HierarchyRepository::create_subdomain(&hierarchy, &subdomain)
            .await
            .unwrap();

        let service = NodeService::new(Arc::new(SqliteNodeRepository::new(pool.clone())));
        (service, subdomain.id, pool)
    }

    fn sample_node(subdomain_id: &str, title: &str) -> KnowledgeNode {
        KnowledgeNode::new(
            subdomain_id,
            "Technique",
            title,
            "Body content",
            "Summary",
            "tester",
        )
    }

    #[tokio::test]
    async fn test_create_and_get_node() {
        let (service, subdomain_id, _pool) = setup().await;

        let node = service
            .create_node(sample_node(&subdomain_id, "SQL injection basics"))
            .await
            .unwrap();

        let fetched = service.get_node(&node.id).await.unwrap();
        assert_eq!(fetched.title, "SQL injection basics");
        assert_eq!(fetched.validation.status, ValidationStatus::Pending);
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_fields() {
        let (service, subdomain_id, _pool) = setup().await;

        let mut node = sample_node(&subdomain_id, "x");
        node.summary = "  ".into();

        let err = service.create_node(node).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_validation_appends_history() {
        let (service, subdomain_id, _pool) = setup().await;
        let node = service
            .create_node(sample_node(&subdomain_id, "XSS payloads"))
            .await
            .unwrap();

        for (status, score) in [
            (ValidationStatus::NeedsReview, 40),
            (ValidationStatus::Approved, 90),
            (ValidationStatus::Rejected, 10),
        ] {
            service
                .validate_node(
                    &node.id,
                    ValidationInput {
                        status,
                        score,
                        comments: None,
                        validated_by: "curator".into(),
                    },
                )
                .await
                .unwrap();
        }

        let history = service.validation_history(&node.id).await.unwrap();
        assert_eq!(history.len(), 3, "history is append-only regardless of final status");

        let current = service.get_node(&node.id).await.unwrap();
        assert_eq!(current.validation.status, ValidationStatus::Rejected);
        assert_eq!(current.validation.score, 10);
    }

    #[tokio::test]
    async fn test_validation_score_range_enforced() {
        let (service, subdomain_id, _pool) = setup().await;
        let node = service
            .create_node(sample_node(&subdomain_id, "n"))
            .await
            .unwrap();

        let err = service
            .validate_node(
                &node.id,
                ValidationInput {
                    status: ValidationStatus::Approved,
                    score: 150,
                    comments: None,
                    validated_by: "curator".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_content_update_archives_and_increments() {
        let (service, subdomain_id, _pool) = setup().await;
        let node = service
            .create_node(sample_node(&subdomain_id, "Versioned"))
            .await
            .unwrap();

        let updated = service
            .update_content(&node.id, "Second body", "editor")
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.content, "Second body");

        let updated = service
            .update_content(&node.id, "Third body", "editor")
            .await
            .unwrap();
        assert_eq!(updated.version, 3);

        let revisions = service.revision_history(&node.id).await.unwrap();
        assert_eq!(revisions.len() as i64, updated.version - 1);
        assert_eq!(revisions[0].version, 1);
        assert_eq!(revisions[0].content, "Body content");
        assert_eq!(revisions[1].version, 2);
        assert_eq!(revisions[1].content, "Second body");
    }

    #[tokio::test]
    async fn test_feedback_score_formula() {
        let (service, subdomain_id, _pool) = setup().await;
        let node = service
            .create_node(sample_node(&subdomain_id, "Rated"))
            .await
            .unwrap();

        let score = service
            .add_feedback(&node.id, "user-1", 4.0, None)
            .await
            .unwrap();
        assert_eq!(score, 80);

        let score = service
            .add_feedback(&node.id, "user-2", 5.0, Some("great".into()))
            .await
            .unwrap();
        // mean(4, 5) * 20 = 90
        assert_eq!(score, 90);

        let fetched = service.get_node(&node.id).await.unwrap();
        assert_eq!(fetched.feedback_score, 90);

        let entries = service.feedback_history(&node.id).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_feedback_rating_range_enforced() {
        let (service, subdomain_id, _pool) = setup().await;
        let node = service
            .create_node(sample_node(&subdomain_id, "n"))
            .await
            .unwrap();

        let err = service
            .add_feedback(&node.id, "user", 6.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_view_and_usage_counters() {
        let (service, subdomain_id, _pool) = setup().await;
        let node = service
            .create_node(sample_node(&subdomain_id, "Counted"))
            .await
            .unwrap();

        service.record_view(&node.id).await.unwrap();
        service.record_view(&node.id).await.unwrap();
        service.record_model_usage(&node.id).await.unwrap();

        let fetched = service.get_node(&node.id).await.unwrap();
        assert_eq!(fetched.view_count, 2);
        assert_eq!(fetched.usage_in_models, 1);

        let err = service.record_view("missing").await.unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_keyword_search_approved_only_and_ranked() {
        let (service, subdomain_id, _pool) = setup().await;

        let approved = service
            .create_node(
                sample_node(&subdomain_id, "Recon guide")
                    .with_keywords(vec!["dns".into(), "recon".into()]),
            )
            .await
            .unwrap();
        service
            .validate_node(
                &approved.id,
                ValidationInput {
                    status: ValidationStatus::Approved,
                    score: 90,
                    comments: None,
                    validated_by: "curator".into(),
                },
            )
            .await
            .unwrap();

        // Pending node with matching keywords must not surface
        service
            .create_node(
                sample_node(&subdomain_id, "Unvetted recon")
                    .with_keywords(vec!["dns".into(), "recon".into()]),
            )
            .await
            .unwrap();

        let results = service
            .search_by_keywords(&["dns".into(), "recon".into()], 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node.id, approved.id);
        assert!((results[0].relevance - 1.0).abs() < f64::EPSILON);

        let partial = service
            .search_by_keywords(&["dns".into(), "malware".into()], 10)
            .await
            .unwrap();
        assert_eq!(partial.len(), 1);
        assert!((partial[0].relevance - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_related_nodes_filtered_to_approved() {
        let (service, subdomain_id, _pool) = setup().await;

        let related_approved = service
            .create_node(sample_node(&subdomain_id, "Approved related"))
            .await
            .unwrap();
        service
            .validate_node(
                &related_approved.id,
                ValidationInput {
                    status: ValidationStatus::Approved,
                    score: 80,
                    comments: None,
                    validated_by: "curator".into(),
                },
            )
            .await
            .unwrap();

        let related_pending = service
            .create_node(sample_node(&subdomain_id, "Pending related"))
            .await
            .unwrap();

        let node = service
            .create_node(
                sample_node(&subdomain_id, "Primary").with_related_nodes(vec![
                    related_approved.id.clone(),
                    related_pending.id.clone(),
                ]),
            )
            .await
            .unwrap();

        let related = service.related_nodes(&node.id).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, related_approved.id);
    }

    #[tokio::test]
    async fn test_expiring_nodes_window() {
        let (service, subdomain_id, _pool) = setup().await;

        service
            .create_node(
                sample_node(&subdomain_id, "Expires soon")
                    .with_expiry_date(Utc::now() + chrono::Duration::days(10)),
            )
            .await
            .unwrap();
        service
            .create_node(
                sample_node(&subdomain_id, "Expires later")
                    .with_expiry_date(Utc::now() + chrono::Duration::days(90)),
            )
            .await
            .unwrap();
        service
            .create_node(sample_node(&subdomain_id, "Never expires"))
            .await
            .unwrap();

        let expiring = service.expiring_nodes(30).await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].title, "Expires soon");
    }
}
