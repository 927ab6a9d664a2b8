//! Repository trait for knowledge node persistence
//!
//! Covers CRUD plus the operations with ordering or atomicity requirements:
//! validation appends, feedback appends with score recompute, and
//! archive-then-replace content updates guarded by a version check.

use async_trait::async_trait;

use crate::error::Result;

use super::entity::{
    ContentRevision, ContentType, FeedbackEntry, KnowledgeNode, ValidationRecord, ValidationStatus,
};

/// Filters for listing nodes within a subdomain
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub status: Option<ValidationStatus>,
    pub category: Option<String>,
    pub content_type: Option<ContentType>,
}

/// A node matched by keyword search, with the number of query keywords hit
#[derive(Debug, Clone)]
pub struct KeywordMatch {
    pub node: KnowledgeNode,
    pub matched_keywords: i64,
}

/// Repository trait for knowledge node persistence
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Insert a new node
    async fn create(&self, node: &KnowledgeNode) -> Result<()>;

    /// Get a node by id
    async fn get(&self, id: &str) -> Result<Option<KnowledgeNode>>;

    /// Get several nodes by id, optionally restricted to a validation status
    async fn get_many(
        &self,
        ids: &[String],
        status: Option<ValidationStatus>,
    ) -> Result<Vec<KnowledgeNode>>;

    /// Look up a node by (subdomain, title), the ingestion dedup key
    async fn find_by_title(&self, subdomain_id: &str, title: &str)
    -> Result<Option<KnowledgeNode>>;

    /// List nodes in a subdomain, filtered, sorted by feedback score then recency
    async fn list_by_subdomain(
        &self,
        subdomain_id: &str,
        filter: &NodeFilter,
    ) -> Result<Vec<KnowledgeNode>>;

    /// Approved nodes whose keyword set intersects the query keywords,
    /// with per-node matched counts, sorted by matches then feedback score
    async fn search_by_keywords(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<KeywordMatch>>;

    /// Append a validation history entry and update the node's current
    /// state in one transaction. The append is an independent insert, so
    /// concurrent validations never lose history entries.
    async fn record_validation(&self, node_id: &str, record: &ValidationRecord) -> Result<()>;

    /// Validation history for a node, in call order
    async fn list_validations(&self, node_id: &str) -> Result<Vec<ValidationRecord>>;

    /// Archive the current content as a revision, then replace content and
    /// increment the version, guarded by an optimistic version check.
    /// Returns false when another writer won the race (no changes applied).
    async fn update_content(
        &self,
        node_id: &str,
        expected_version: i64,
        new_content: &str,
        modified_by: &str,
    ) -> Result<bool>;

    /// Archived content revisions for a node, oldest first
    async fn list_revisions(&self, node_id: &str) -> Result<Vec<ContentRevision>>;

    /// Append a feedback entry and recompute the cached feedback score
    /// (`round(mean(rating) * 20)`) from the feedback table
    async fn add_feedback(&self, node_id: &str, entry: &FeedbackEntry) -> Result<i64>;

    /// Raw feedback entries for a node, oldest first
    async fn list_feedback(&self, node_id: &str) -> Result<Vec<FeedbackEntry>>;

    /// Monotonically increment the view counter; false when the node is missing
    async fn record_view(&self, node_id: &str) -> Result<bool>;

    /// Monotonically increment the usage-in-models counter
    async fn record_model_usage(&self, node_id: &str) -> Result<bool>;

    /// Nodes whose expiry date falls within the given window from now,
    /// soonest first
    async fn list_expiring(&self, within_days: i64) -> Result<Vec<KnowledgeNode>>;

    /// Persist a full node row (load-mutate-save updates of non-content fields)
    async fn update(&self, node: &KnowledgeNode) -> Result<()>;
}
