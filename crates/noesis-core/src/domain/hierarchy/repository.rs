//! Repository trait for hierarchy persistence
//!
//! Abstracts over storage for domains and subdomains, including the
//! aggregate reads the recompute operations derive cached fields from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

use super::entity::{Domain, DomainName, LifecycleStatus, Subdomain};

/// Node counts owned by a domain or subdomain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCounts {
    pub total: i64,
    pub validated: i64,
}

/// Per-status node breakdown for a subdomain
#[derive(Debug, Clone, Copy, Default)]
pub struct SubdomainNodeBreakdown {
    pub total: i64,
    pub validated: i64,
    pub pending: i64,
    pub rejected: i64,
}

/// Repository trait for hierarchy persistence
#[async_trait]
pub trait HierarchyRepository: Send + Sync {
    // ========== Domain Operations ==========

    /// Insert a new domain; unique-name violations surface as DuplicateKey
    async fn create_domain(&self, domain: &Domain) -> Result<()>;

    /// Get a domain by id
    async fn get_domain(&self, id: &str) -> Result<Option<Domain>>;

    /// Get a domain by its natural key
    async fn get_domain_by_name(&self, name: DomainName) -> Result<Option<Domain>>;

    /// List domains with optional filters, sorted by priority then recency
    async fn list_domains(
        &self,
        status: Option<LifecycleStatus>,
        priority: Option<u8>,
    ) -> Result<Vec<Domain>>;

    /// Persist a full domain row (load-mutate-save updates)
    async fn update_domain(&self, domain: &Domain) -> Result<()>;

    /// Overwrite only the cached node counter
    async fn set_domain_total_nodes(&self, id: &str, total: i64) -> Result<()>;

    /// Overwrite only the cached quality score
    async fn set_domain_quality_score(&self, id: &str, score: i64) -> Result<()>;

    // ========== Subdomain Operations ==========

    /// Insert a new subdomain; (domain_id, slug) violations surface as DuplicateKey
    async fn create_subdomain(&self, subdomain: &Subdomain) -> Result<()>;

    /// Get a subdomain by id
    async fn get_subdomain(&self, id: &str) -> Result<Option<Subdomain>>;

    /// Get a subdomain by its natural key
    async fn get_subdomain_by_slug(&self, domain_id: &str, slug: &str) -> Result<Option<Subdomain>>;

    /// List subdomains of a domain sorted by display order then recency
    async fn list_subdomains(
        &self,
        domain_id: &str,
        status: Option<LifecycleStatus>,
    ) -> Result<Vec<Subdomain>>;

    /// Persist a full subdomain row
    async fn update_subdomain(&self, subdomain: &Subdomain) -> Result<()>;

    /// Overwrite only the cached node counters
    async fn set_subdomain_node_counts(&self, id: &str, counts: NodeCounts) -> Result<()>;

    /// Overwrite only the cached quality score
    async fn set_subdomain_quality_score(&self, id: &str, score: i64) -> Result<()>;

    /// Stamp the last-ingestion timestamp
    async fn set_subdomain_last_ingestion(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    // ========== Aggregate Reads ==========

    /// Count nodes (total, approved) directly under a subdomain
    async fn count_subdomain_nodes(&self, subdomain_id: &str) -> Result<NodeCounts>;

    /// Count nodes (total, approved) transitively under a domain
    async fn count_domain_nodes(&self, domain_id: &str) -> Result<NodeCounts>;

    /// Mean feedback score of approved nodes under a subdomain, None when empty
    async fn mean_approved_feedback_for_subdomain(&self, subdomain_id: &str)
    -> Result<Option<f64>>;

    /// Mean feedback score of approved nodes transitively under a domain
    async fn mean_approved_feedback_for_domain(&self, domain_id: &str) -> Result<Option<f64>>;

    /// Per-status node breakdown for a subdomain
    async fn subdomain_node_breakdown(&self, subdomain_id: &str) -> Result<SubdomainNodeBreakdown>;
}
