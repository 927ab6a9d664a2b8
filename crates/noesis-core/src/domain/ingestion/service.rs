//! Ingestion pipeline service
//!
//! Orchestrates batch intake: opens a run against a domain, processes
//! candidate batches with duplicate detection and per-candidate failure
//! accounting, and closes the run with metric deltas and a retraining
//! evaluation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::hierarchy::HierarchyRepository;
use crate::domain::node::{KnowledgeNode, NodeRepository};
use crate::error::{Error, Result};

use super::entity::{
    BatchOutcome, CandidateNode, EstimatedImpact, IngestionLogEntry, IngestionRecord,
    IngestionStatus, IngestionType, MetricsSnapshot, SourceDescriptor,
};
use super::repository::{IngestionRepository, IngestionStats};

/// Node volume above which a run is flagged as requiring model retraining.
/// Fixed policy, not user-configurable.
pub const RETRAINING_THRESHOLD: i64 = 50;

/// Service for incremental knowledge ingestion
pub struct IngestionService<I, N, H>
where
    I: IngestionRepository,
    N: NodeRepository,
    H: HierarchyRepository,
{
    ingestions: Arc<I>,
    nodes: Arc<N>,
    hierarchy: Arc<H>,
}

impl<I, N, H> IngestionService<I, N, H>
where
    I: IngestionRepository,
    N: NodeRepository,
    H: HierarchyRepository,
{
    pub fn new(ingestions: Arc<I>, nodes: Arc<N>, hierarchy: Arc<H>) -> Self {
        Self {
            ingestions,
            nodes,
            hierarchy,
        }
    }

    /// Open a new ingestion run against a domain
    ///
    /// Captures the domain's cached counters as the before-snapshot.
    pub async fn open(
        &self,
        domain_id: &str,
        subdomain_id: Option<String>,
        ingestion_type: IngestionType,
        source: Option<SourceDescriptor>,
        executed_by: &str,
    ) -> Result<IngestionRecord> {
        if executed_by.trim().is_empty() {
            return Err(Error::InvalidInput("executed_by is required".into()));
        }
        let domain = self
            .hierarchy
            .get_domain(domain_id)
            .await?
            .ok_or_else(|| Error::DomainNotFound(domain_id.to_string()))?;

        if let Some(sid) = &subdomain_id {
            self.hierarchy
                .get_subdomain(sid)
                .await?
                .ok_or_else(|| Error::SubdomainNotFound(sid.clone()))?;
        }

        let mut record =
            IngestionRecord::new(domain_id, subdomain_id, ingestion_type, executed_by);
        if let Some(source) = source {
            record = record.with_source(source);
        }
        record.before = Some(MetricsSnapshot {
            total_nodes: domain.total_nodes,
            quality_score: domain.quality_score,
        });

        self.ingestions.create(&record).await?;
        info!(
            ingestion_id = %record.id,
            domain_id = %domain_id,
            ingestion_type = %record.ingestion_type,
            "Ingestion run opened"
        );
        Ok(record)
    }

    /// Get an ingestion record by id
    pub async fn get(&self, id: &str) -> Result<IngestionRecord> {
        self.ingestions
            .get(id)
            .await?
            .ok_or_else(|| Error::IngestionNotFound(id.to_string()))
    }

    /// Process a batch of candidate nodes against an open run
    ///
    /// Each candidate is validated, checked against existing (title,
    /// subdomain) pairs, and created on success. Candidate failures are
    /// accounted and logged, never raised; only a missing ingestion record
    /// or target subdomain short-circuits the call. Batches may be
    /// submitted repeatedly; counters accumulate.
    pub async fn process_batch(
        &self,
        ingestion_id: &str,
        subdomain_id: &str,
        candidates: &[CandidateNode],
        executed_by: &str,
    ) -> Result<BatchOutcome> {
        let mut record = self.get(ingestion_id).await?;
        self.hierarchy
            .get_subdomain(subdomain_id)
            .await?
            .ok_or_else(|| Error::SubdomainNotFound(subdomain_id.to_string()))?;

        if record.status == IngestionStatus::Pending {
            record.status = IngestionStatus::InProgress;
        }

        let mut outcome = BatchOutcome::default();

        for candidate in candidates {
            if let Some(problem) = candidate.validate() {
                record.validation_failed += 1;
                record.validation_errors.push(problem.clone());
                outcome.failed += 1;
                outcome.errors.push(problem);
                continue;
            }
            record.validation_passed += 1;

            match self.nodes.find_by_title(subdomain_id, &candidate.title).await {
                Ok(Some(_)) => {
                    outcome.skipped += 1;
                    record.duplicates_found += 1;
                    let message = format!("Duplicate node skipped: {}", candidate.title);
                    outcome.errors.push(message.clone());
                    record.log(IngestionLogEntry::warning(message));
                }
                Ok(None) => {
                    let mut node = KnowledgeNode::new(
                        subdomain_id,
                        &candidate.category,
                        &candidate.title,
                        &candidate.content,
                        &candidate.summary,
                        executed_by,
                    )
                    .with_keywords(candidate.keywords.clone())
                    .with_examples(candidate.examples.clone());
                    if let Some(content_type) = candidate.content_type {
                        node = node.with_content_type(content_type);
                    }
                    if let Some(source) = candidate.source.clone() {
                        node = node.with_source(source);
                    }

                    match self.nodes.create(&node).await {
                        Ok(()) => {
                            outcome.successful += 1;
                            outcome.node_ids.push(node.id);
                        }
                        Err(e) => {
                            outcome.failed += 1;
                            let message =
                                format!("Failed to create node '{}': {}", candidate.title, e);
                            outcome.errors.push(message.clone());
                            record.log(IngestionLogEntry::error(message));
                            warn!(ingestion_id = %ingestion_id, title = %candidate.title, error = %e, "Candidate failed");
                        }
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    let message =
                        format!("Duplicate lookup failed for '{}': {}", candidate.title, e);
                    outcome.errors.push(message.clone());
                    record.log(IngestionLogEntry::error(message));
                }
            }
        }

        record.absorb_batch(candidates.len() as i64, &outcome);
        record.log(
            IngestionLogEntry::info(format!("Processed batch of {} candidates", candidates.len()))
                .with_details(serde_json::json!({
                    "successful": outcome.successful,
                    "failed": outcome.failed,
                    "skipped": outcome.skipped,
                })),
        );

        self.ingestions.update(&record).await?;

        info!(
            ingestion_id = %ingestion_id,
            successful = outcome.successful,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "Batch processed"
        );
        Ok(outcome)
    }

    /// Complete an ingestion run
    ///
    /// Recomputes the owning domain's counters and quality, stamps the
    /// after-snapshot and deltas, and flags the run for retraining when
    /// the successful count or the node delta exceeds the threshold.
    pub async fn complete(&self, ingestion_id: &str) -> Result<IngestionRecord> {
        let mut record = self.get(ingestion_id).await?;

        record.status = IngestionStatus::Completed;
        let ended = Utc::now();
        record.ended_at = Some(ended);
        record.duration_seconds = Some((ended - record.started_at).num_seconds());

        // Refresh domain aggregates so the after-snapshot reflects this run
        let counts = self.hierarchy.count_domain_nodes(&record.domain_id).await?;
        self.hierarchy
            .set_domain_total_nodes(&record.domain_id, counts.total)
            .await?;
        let mean = self
            .hierarchy
            .mean_approved_feedback_for_domain(&record.domain_id)
            .await?;
        let quality = mean.map(|m| m.round() as i64).unwrap_or(0);
        self.hierarchy
            .set_domain_quality_score(&record.domain_id, quality)
            .await?;

        let after = MetricsSnapshot {
            total_nodes: counts.total,
            quality_score: quality,
        };
        record.after = Some(after);
        let before = record.before.unwrap_or_default();
        record.delta_nodes = Some(after.total_nodes - before.total_nodes);
        record.delta_quality_score = Some(after.quality_score - before.quality_score);

        record.log(
            IngestionLogEntry::info(format!(
                "Ingestion completed: {} successful, {} failed, {} skipped",
                record.processed.successful, record.processed.failed, record.processed.skipped
            ))
            .with_details(serde_json::to_value(record.processed).unwrap_or_default()),
        );

        if record.processed.successful > RETRAINING_THRESHOLD
            || record.delta_nodes.unwrap_or(0) > RETRAINING_THRESHOLD
        {
            record.requires_retraining = true;
            record.estimated_impact = Some(EstimatedImpact::High);
        }

        self.ingestions.update(&record).await?;

        // Refresh subdomain counters and stamp its ingestion time
        if let Some(subdomain_id) = record.subdomain_id.clone() {
            let counts = self.hierarchy.count_subdomain_nodes(&subdomain_id).await?;
            self.hierarchy
                .set_subdomain_node_counts(&subdomain_id, counts)
                .await?;
            self.hierarchy
                .set_subdomain_last_ingestion(&subdomain_id, ended)
                .await?;
        }

        info!(
            ingestion_id = %ingestion_id,
            delta_nodes = record.delta_nodes,
            requires_retraining = record.requires_retraining,
            "Ingestion completed"
        );
        Ok(record)
    }

    /// Mark an ingestion run as failed
    pub async fn fail(&self, ingestion_id: &str, error_message: &str) -> Result<IngestionRecord> {
        let mut record = self.get(ingestion_id).await?;

        record.status = IngestionStatus::Failed;
        record.ended_at = Some(Utc::now());
        record.log(IngestionLogEntry::error(error_message));

        self.ingestions.update(&record).await?;
        warn!(ingestion_id = %ingestion_id, error = %error_message, "Ingestion failed");
        Ok(record)
    }

    /// Ingestion history for a domain, most recent first
    pub async fn history(&self, domain_id: &str, limit: usize) -> Result<Vec<IngestionRecord>> {
        self.ingestions.list_by_domain(domain_id, limit).await
    }

    /// Aggregate ingestion statistics for a domain
    pub async fn stats(&self, domain_id: &str) -> Result<IngestionStats> {
        self.ingestions.stats(domain_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{Domain, DomainName, Subdomain};
    use crate::infrastructure::hierarchy::SqliteHierarchyRepository;
    use crate::infrastructure::ingestion::SqliteIngestionRepository;
    use crate::infrastructure::node::SqliteNodeRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    type TestService =
        IngestionService<SqliteIngestionRepository, SqliteNodeRepository, SqliteHierarchyRepository>;

    struct Fixture {
        service: TestService,
        domain_id: String,
        subdomain_id: String,
    }

    async fn setup() -> Fixture {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool).await.expect("Failed to run migrations");

        let hierarchy = Arc::new(SqliteHierarchyRepository::new(pool.clone()));
        let domain = Domain::new(DomainName::Cybersecurity, "Security");
        hierarchy.create_domain(&domain).await.unwrap();
        let subdomain = Subdomain::new(&domain.id, "Pentesting", "pentesting");
        hierarchy.create_subdomain(&subdomain).await.unwrap();

        Fixture {
            service: IngestionService::new(
                Arc::new(SqliteIngestionRepository::new(pool.clone())),
                Arc::new(SqliteNodeRepository::new(pool.clone())),
                hierarchy,
            ),
            domain_id: domain.id,
            subdomain_id: subdomain.id,
        }
    }

    fn candidate(title: &str) -> CandidateNode {
        CandidateNode {
            category: "Technique".into(),
            title: title.into(),
            content: format!("Content for {}", title),
            summary: format!("Summary of {}", title),
            keywords: vec!["pentest".into()],
            examples: vec![],
            content_type: None,
            source: None,
        }
    }

    #[tokio::test]
    async fn test_open_requires_existing_domain() {
        let fixture = setup().await;

        let err = fixture
            .service
            .open("missing", None, IngestionType::Manual, None, "op")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DomainNotFound(_)));
    }

    #[tokio::test]
    async fn test_open_captures_before_snapshot() {
        let fixture = setup().await;

        let record = fixture
            .service
            .open(&fixture.domain_id, None, IngestionType::Api, None, "op")
            .await
            .unwrap();

        assert_eq!(record.status, IngestionStatus::Pending);
        assert_eq!(record.before, Some(MetricsSnapshot::default()));
    }

    #[tokio::test]
    async fn test_batch_with_duplicates_and_failures() {
        let fixture = setup().await;

        let record = fixture
            .service
            .open(
                &fixture.domain_id,
                Some(fixture.subdomain_id.clone()),
                IngestionType::BulkUpload,
                None,
                "op",
            )
            .await
            .unwrap();

        let mut invalid = candidate("Broken");
        invalid.content = "".into();

        let batch = vec![candidate("Alpha"), candidate("Alpha"), invalid];
        let outcome = fixture
            .service
            .process_batch(&record.id, &fixture.subdomain_id, &batch, "op")
            .await
            .unwrap();

        assert_eq!(outcome.successful, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed, 1);

        let record = fixture.service.get(&record.id).await.unwrap();
        assert_eq!(record.status, IngestionStatus::InProgress);
        assert_eq!(record.processed.total, 3);
        assert_eq!(record.duplicates_found, 1);
        assert_eq!(record.validation_failed, 1);
        assert_eq!(record.validation_passed, 2);
        assert_eq!(record.node_ids.len(), 1);
        assert!(!record.logs.is_empty());
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent() {
        let fixture = setup().await;

        let record = fixture
            .service
            .open(
                &fixture.domain_id,
                Some(fixture.subdomain_id.clone()),
                IngestionType::Import,
                None,
                "op",
            )
            .await
            .unwrap();

        let batch = vec![candidate("One"), candidate("Two")];

        let first = fixture
            .service
            .process_batch(&record.id, &fixture.subdomain_id, &batch, "op")
            .await
            .unwrap();
        assert_eq!(first.successful, 2);
        assert_eq!(first.skipped, 0);

        let second = fixture
            .service
            .process_batch(&record.id, &fixture.subdomain_id, &batch, "op")
            .await
            .unwrap();
        assert_eq!(second.successful, 0);
        assert_eq!(second.skipped, 2, "re-submitted titles are skipped");

        let record = fixture.service.get(&record.id).await.unwrap();
        assert_eq!(record.processed.total, 4, "total grows by batch size both times");
        assert_eq!(record.processed.successful, 2);
        assert_eq!(record.processed.skipped, 2);
    }

    #[tokio::test]
    async fn test_complete_stamps_metrics_and_counters() {
        let fixture = setup().await;

        let record = fixture
            .service
            .open(
                &fixture.domain_id,
                Some(fixture.subdomain_id.clone()),
                IngestionType::Manual,
                None,
                "op",
            )
            .await
            .unwrap();

        fixture
            .service
            .process_batch(
                &record.id,
                &fixture.subdomain_id,
                &[candidate("A"), candidate("B")],
                "op",
            )
            .await
            .unwrap();

        let completed = fixture.service.complete(&record.id).await.unwrap();

        assert_eq!(completed.status, IngestionStatus::Completed);
        assert!(completed.ended_at.is_some());
        assert!(completed.duration_seconds.is_some());
        assert_eq!(completed.after.map(|a| a.total_nodes), Some(2));
        assert_eq!(completed.delta_nodes, Some(2));
        assert!(!completed.requires_retraining, "2 nodes is below the threshold");
    }

    #[tokio::test]
    async fn test_retraining_flag_above_threshold() {
        let fixture = setup().await;

        let record = fixture
            .service
            .open(
                &fixture.domain_id,
                Some(fixture.subdomain_id.clone()),
                IngestionType::DatabaseSync,
                None,
                "op",
            )
            .await
            .unwrap();

        let batch: Vec<CandidateNode> = (0..=RETRAINING_THRESHOLD)
            .map(|i| candidate(&format!("Node {}", i)))
            .collect();
        fixture
            .service
            .process_batch(&record.id, &fixture.subdomain_id, &batch, "op")
            .await
            .unwrap();

        let completed = fixture.service.complete(&record.id).await.unwrap();
        assert!(completed.requires_retraining);
        assert_eq!(completed.estimated_impact, Some(EstimatedImpact::High));
    }

    #[tokio::test]
    async fn test_fail_stamps_error_log() {
        let fixture = setup().await;

        let record = fixture
            .service
            .open(&fixture.domain_id, None, IngestionType::WebScraping, None, "op")
            .await
            .unwrap();

        let failed = fixture
            .service
            .fail(&record.id, "source unreachable")
            .await
            .unwrap();

        assert_eq!(failed.status, IngestionStatus::Failed);
        assert!(failed.ended_at.is_some());
        assert!(
            failed
                .logs
                .iter()
                .any(|l| l.level == crate::domain::ingestion::LogLevel::Error
                    && l.message.contains("source unreachable"))
        );
    }

    #[tokio::test]
    async fn test_missing_record_short_circuits() {
        let fixture = setup().await;

        let err = fixture
            .service
            .process_batch("missing", &fixture.subdomain_id, &[candidate("X")], "op")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IngestionNotFound(_)));
    }

    #[tokio::test]
    async fn test_history_and_stats() {
        let fixture = setup().await;

        let r1 = fixture
            .service
            .open(
                &fixture.domain_id,
                Some(fixture.subdomain_id.clone()),
                IngestionType::Manual,
                None,
                "op",
            )
            .await
            .unwrap();
        fixture
            .service
            .process_batch(&r1.id, &fixture.subdomain_id, &[candidate("H1")], "op")
            .await
            .unwrap();
        fixture.service.complete(&r1.id).await.unwrap();

        let r2 = fixture
            .service
            .open(&fixture.domain_id, None, IngestionType::Api, None, "op")
            .await
            .unwrap();
        fixture.service.fail(&r2.id, "boom").await.unwrap();

        let history = fixture.service.history(&fixture.domain_id, 10).await.unwrap();
        assert_eq!(history.len(), 2);

        let stats = fixture.service.stats(&fixture.domain_id).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 50.0).abs() < 1e-9);
        assert_eq!(stats.total_nodes_ingested, 1);
        assert!(stats.by_type.iter().any(|(t, c)| *t == IngestionType::Manual && *c == 1));
    }
}
