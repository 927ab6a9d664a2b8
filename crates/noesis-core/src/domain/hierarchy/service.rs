//! Hierarchy domain service
//!
//! Create/list/update operations for domains and subdomains, plus the
//! recompute operations that refresh cached counters and quality scores.
//! Recomputes are idempotent: they read a snapshot of the node store and
//! overwrite only the cached fields.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};

use super::entity::{Domain, DomainName, LifecycleStatus, Subdomain};
use super::repository::{HierarchyRepository, NodeCounts};

/// Statistics for a subdomain, derived from live node counts
#[derive(Debug, Clone)]
pub struct SubdomainStats {
    pub total: i64,
    pub validated: i64,
    pub pending: i64,
    pub rejected: i64,
    /// Percentage of nodes approved (0-100)
    pub validation_rate: f64,
    /// Cached quality score as of the last recompute
    pub quality_score: i64,
}

/// Service for domain and subdomain management
pub struct HierarchyService<R: HierarchyRepository> {
    repository: Arc<R>,
}

impl<R: HierarchyRepository> HierarchyService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    // ========== Domain Operations ==========

    /// Create a new domain
    pub async fn create_domain(&self, domain: Domain) -> Result<Domain> {
        if domain.description.trim().is_empty() {
            return Err(Error::InvalidInput("domain description is required".into()));
        }
        if !(1..=10).contains(&domain.priority) {
            return Err(Error::InvalidInput(format!(
                "priority must be between 1 and 10, got {}",
                domain.priority
            )));
        }

        self.repository.create_domain(&domain).await?;
        info!(domain_id = %domain.id, name = %domain.name, "Domain created");
        Ok(domain)
    }

    /// Get a domain by id
    pub async fn get_domain(&self, id: &str) -> Result<Domain> {
        self.repository
            .get_domain(id)
            .await?
            .ok_or_else(|| Error::DomainNotFound(id.to_string()))
    }

    /// Get a domain by name
    pub async fn get_domain_by_name(&self, name: DomainName) -> Result<Option<Domain>> {
        self.repository.get_domain_by_name(name).await
    }

    /// List domains with optional status/priority filters
    pub async fn list_domains(
        &self,
        status: Option<LifecycleStatus>,
        priority: Option<u8>,
    ) -> Result<Vec<Domain>> {
        self.repository.list_domains(status, priority).await
    }

    /// Update a domain via load-mutate-save
    pub async fn update_domain(&self, mut domain: Domain) -> Result<Domain> {
        // Confirm the row still exists so updates surface NotFound
        self.get_domain(&domain.id).await?;
        domain.updated_at = chrono::Utc::now();
        self.repository.update_domain(&domain).await?;
        Ok(domain)
    }

    /// Change a domain's lifecycle status
    pub async fn set_domain_status(&self, id: &str, status: LifecycleStatus) -> Result<Domain> {
        let mut domain = self.get_domain(id).await?;
        domain.status = status;
        self.update_domain(domain).await
    }

    /// Recompute a domain's cached quality score from approved nodes
    ///
    /// Rounded mean of feedback scores across all approved nodes
    /// transitively owned by the domain; 0 when there are none.
    pub async fn recompute_domain_quality(&self, domain_id: &str) -> Result<i64> {
        self.get_domain(domain_id).await?;

        let mean = self
            .repository
            .mean_approved_feedback_for_domain(domain_id)
            .await?;
        let score = mean.map(|m| m.round() as i64).unwrap_or(0);

        self.repository
            .set_domain_quality_score(domain_id, score)
            .await?;

        debug!(domain_id = %domain_id, quality_score = score, "Domain quality recomputed");
        Ok(score)
    }

    /// Recompute a domain's cached node counter
    pub async fn recompute_domain_counters(&self, domain_id: &str) -> Result<NodeCounts> {
        self.get_domain(domain_id).await?;

        let counts = self.repository.count_domain_nodes(domain_id).await?;
        self.repository
            .set_domain_total_nodes(domain_id, counts.total)
            .await?;

        debug!(
            domain_id = %domain_id,
            total = counts.total,
            validated = counts.validated,
            "Domain counters recomputed"
        );
        Ok(counts)
    }

    // ========== Subdomain Operations ==========

    /// Create a new subdomain under an existing domain
    pub async fn create_subdomain(&self, subdomain: Subdomain) -> Result<Subdomain> {
        if subdomain.name.trim().is_empty() {
            return Err(Error::InvalidInput("subdomain name is required".into()));
        }
        if subdomain.slug.trim().is_empty() {
            return Err(Error::InvalidInput("subdomain slug is required".into()));
        }
        self.get_domain(&subdomain.domain_id).await?;

        self.repository.create_subdomain(&subdomain).await?;
        info!(
            subdomain_id = %subdomain.id,
            domain_id = %subdomain.domain_id,
            slug = %subdomain.slug,
            "Subdomain created"
        );
        Ok(subdomain)
    }

    /// Get a subdomain by id
    pub async fn get_subdomain(&self, id: &str) -> Result<Subdomain> {
        self.repository
            .get_subdomain(id)
            .await?
            .ok_or_else(|| Error::SubdomainNotFound(id.to_string()))
    }

    /// Get a subdomain by (domain, slug)
    pub async fn get_subdomain_by_slug(
        &self,
        domain_id: &str,
        slug: &str,
    ) -> Result<Option<Subdomain>> {
        self.repository
            .get_subdomain_by_slug(domain_id, &slug.to_lowercase())
            .await
    }

    /// List subdomains of a domain
    pub async fn list_subdomains(
        &self,
        domain_id: &str,
        status: Option<LifecycleStatus>,
    ) -> Result<Vec<Subdomain>> {
        self.repository.list_subdomains(domain_id, status).await
    }

    /// Update a subdomain via load-mutate-save
    pub async fn update_subdomain(&self, mut subdomain: Subdomain) -> Result<Subdomain> {
        self.get_subdomain(&subdomain.id).await?;
        subdomain.updated_at = chrono::Utc::now();
        self.repository.update_subdomain(&subdomain).await?;
        Ok(subdomain)
    }

    /// Recompute a subdomain's cached quality score from approved nodes
    pub async fn recompute_subdomain_quality(&self, subdomain_id: &str) -> Result<i64> {
        self.get_subdomain(subdomain_id).await?;

        let mean = self
            .repository
            .mean_approved_feedback_for_subdomain(subdomain_id)
            .await?;
        let score = mean.map(|m| m.round() as i64).unwrap_or(0);

        self.repository
            .set_subdomain_quality_score(subdomain_id, score)
            .await?;

        debug!(subdomain_id = %subdomain_id, quality_score = score, "Subdomain quality recomputed");
        Ok(score)
    }

    /// Recompute a subdomain's cached node counters
    pub async fn recompute_subdomain_counters(&self, subdomain_id: &str) -> Result<NodeCounts> {
        self.get_subdomain(subdomain_id).await?;

        let counts = self.repository.count_subdomain_nodes(subdomain_id).await?;
        self.repository
            .set_subdomain_node_counts(subdomain_id, counts)
            .await?;

        debug!(
            subdomain_id = %subdomain_id,
            total = counts.total,
            validated = counts.validated,
            "Subdomain counters recomputed"
        );
        Ok(counts)
    }

    /// Stamp the subdomain's last-ingestion timestamp
    pub async fn record_data_ingestion(&self, subdomain_id: &str) -> Result<()> {
        self.get_subdomain(subdomain_id).await?;
        self.repository
            .set_subdomain_last_ingestion(subdomain_id, chrono::Utc::now())
            .await
    }

    /// Live node statistics for a subdomain
    pub async fn subdomain_stats(&self, subdomain_id: &str) -> Result<SubdomainStats> {
        let subdomain = self.get_subdomain(subdomain_id).await?;
        let breakdown = self
            .repository
            .subdomain_node_breakdown(subdomain_id)
            .await?;

        let validation_rate = if breakdown.total > 0 {
            (breakdown.validated as f64 / breakdown.total as f64) * 100.0
        } else {
            0.0
        };

        Ok(SubdomainStats {
            total: breakdown.total,
            validated: breakdown.validated,
            pending: breakdown.pending,
            rejected: breakdown.rejected,
            validation_rate,
            quality_score: subdomain.quality_score,
        })
    }
}
