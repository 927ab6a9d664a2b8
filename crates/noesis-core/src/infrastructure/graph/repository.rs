//! SQLite implementation of the GraphRepository
//!
//! Edges live in their own table with indexed foreign keys on both
//! endpoints, so incoming and outgoing queries are symmetric. The
//! similarity and dependency queries join back to the nodes table.

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::domain::graph::{
    EdgeStatus, GraphRepository, GraphStats, KnowledgeEdge, RelationshipType,
};
use crate::domain::node::KnowledgeNode;
use crate::error::{Error, Result};
use crate::infrastructure::timestamps::parse_timestamp;

/// SQLite implementation of the graph repository
#[derive(Clone)]
pub struct SqliteGraphRepository {
    pool: SqlitePool,
}

impl SqliteGraphRepository {
    /// Create a new SQLite graph repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn node_exists(&self, id: &str) -> Result<bool> {
        let (exists,): (i64,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists != 0)
    }

    async fn fetch_nodes(&self, ids: &[String]) -> Result<Vec<KnowledgeNode>> {
        let node_repo = crate::infrastructure::node::SqliteNodeRepository::new(self.pool.clone());
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = crate::domain::node::NodeRepository::get(&node_repo, id).await? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }
}

#[async_trait]
impl GraphRepository for SqliteGraphRepository {
    async fn create_edge(&self, edge: &KnowledgeEdge) -> Result<()> {
        if !self.node_exists(&edge.source_node_id).await? {
            return Err(Error::NodeNotFound(edge.source_node_id.clone()));
        }
        if !self.node_exists(&edge.target_node_id).await? {
            return Err(Error::NodeNotFound(edge.target_node_id.clone()));
        }

        let evidence_json = serde_json::to_string(&edge.evidence)
            .map_err(|e| Error::Other(format!("Failed to serialize evidence: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO graph_edges (
                id, source_node_id, target_node_id, relationship_type,
                weight, confidence, context, bidirectional, status,
                created_by, reasoning, evidence, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&edge.id)
        .bind(&edge.source_node_id)
        .bind(&edge.target_node_id)
        .bind(edge.relationship_type.as_str())
        .bind(edge.weight)
        .bind(edge.confidence)
        .bind(&edge.context)
        .bind(edge.bidirectional as i64)
        .bind(edge.status.as_str())
        .bind(&edge.created_by)
        .bind(&edge.reasoning)
        .bind(&evidence_json)
        .bind(edge.created_at.to_rfc3339())
        .bind(edge.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            edge_id = %edge.id,
            source = %edge.source_node_id,
            target = %edge.target_node_id,
            "Edge saved"
        );
        Ok(())
    }

    async fn get_edge(&self, id: &str) -> Result<Option<KnowledgeEdge>> {
        let row: Option<EdgeRow> = sqlx::query_as("SELECT * FROM graph_edges WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_edge()).transpose()
    }

    async fn outgoing_edges(
        &self,
        node_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<KnowledgeEdge>> {
        let rows: Vec<EdgeRow> = match relationship_type {
            Some(rt) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM graph_edges
                    WHERE source_node_id = ? AND status = 'active' AND relationship_type = ?
                    ORDER BY weight DESC, confidence DESC
                    "#,
                )
                .bind(node_id)
                .bind(rt.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM graph_edges
                    WHERE source_node_id = ? AND status = 'active'
                    ORDER BY weight DESC, confidence DESC
                    "#,
                )
                .bind(node_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(|r| r.into_edge()).collect()
    }

    async fn incoming_edges(
        &self,
        node_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<KnowledgeEdge>> {
        let rows: Vec<EdgeRow> = match relationship_type {
            Some(rt) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM graph_edges
                    WHERE target_node_id = ? AND status = 'active' AND relationship_type = ?
                    ORDER BY weight DESC, confidence DESC
                    "#,
                )
                .bind(node_id)
                .bind(rt.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM graph_edges
                    WHERE target_node_id = ? AND status = 'active'
                    ORDER BY weight DESC, confidence DESC
                    "#,
                )
                .bind(node_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(|r| r.into_edge()).collect()
    }

    async fn update_edge(&self, edge: &KnowledgeEdge) -> Result<()> {
        let evidence_json = serde_json::to_string(&edge.evidence)
            .map_err(|e| Error::Other(format!("Failed to serialize evidence: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE graph_edges SET
                weight = ?, confidence = ?, context = ?, bidirectional = ?,
                status = ?, reasoning = ?, evidence = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(edge.weight)
        .bind(edge.confidence)
        .bind(&edge.context)
        .bind(edge.bidirectional as i64)
        .bind(edge.status.as_str())
        .bind(&edge.reasoning)
        .bind(&evidence_json)
        .bind(edge.updated_at.to_rfc3339())
        .bind(&edge.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_edge_status(&self, id: &str, status: EdgeStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE graph_edges SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        let changed = result.rows_affected() > 0;
        if changed {
            info!(edge_id = %id, status = %status, "Edge status changed");
        }
        Ok(changed)
    }

    async fn neighbor_ids(&self, node_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT target_node_id FROM graph_edges
            WHERE source_node_id = ? AND status = 'active'
            UNION
            SELECT source_node_id FROM graph_edges
            WHERE target_node_id = ? AND status = 'active' AND bidirectional = 1
            "#,
        )
        .bind(node_id)
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn similar_nodes(&self, node_id: &str, limit: usize) -> Result<Vec<KnowledgeNode>> {
        // Opposite endpoint of each similar_to edge touching the node
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT CASE
                WHEN source_node_id = ? THEN target_node_id
                ELSE source_node_id
            END AS other_id
            FROM graph_edges
            WHERE (source_node_id = ? OR target_node_id = ?)
                AND relationship_type = 'similar_to'
                AND status = 'active'
            ORDER BY confidence DESC
            LIMIT ?
            "#,
        )
        .bind(node_id)
        .bind(node_id)
        .bind(node_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = rows.into_iter().map(|(id,)| id).collect();
        self.fetch_nodes(&ids).await
    }

    async fn dependent_nodes(&self, node_id: &str, limit: usize) -> Result<Vec<KnowledgeNode>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT target_node_id FROM graph_edges
            WHERE source_node_id = ? AND relationship_type = 'prerequisite_of' AND status = 'active'
            ORDER BY weight DESC
            LIMIT ?
            "#,
        )
        .bind(node_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = rows.into_iter().map(|(id,)| id).collect();
        self.fetch_nodes(&ids).await
    }

    async fn stats(&self) -> Result<GraphStats> {
        let (total_edges,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM graph_edges")
            .fetch_one(&self.pool)
            .await?;

        let (avg_weight, avg_confidence): (Option<f64>, Option<f64>) =
            sqlx::query_as("SELECT AVG(weight), AVG(confidence) FROM graph_edges")
                .fetch_one(&self.pool)
                .await?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT relationship_type, COUNT(*) FROM graph_edges GROUP BY relationship_type ORDER BY COUNT(*) DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(GraphStats {
            total_edges: total_edges as u64,
            by_type: by_type
                .into_iter()
                .filter_map(|(t, c)| RelationshipType::parse(&t).map(|rt| (rt, c as u64)))
                .collect(),
            average_weight: avg_weight.unwrap_or(0.0),
            average_confidence: avg_confidence.unwrap_or(0.0),
        })
    }
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct EdgeRow {
    id: String,
    source_node_id: String,
    target_node_id: String,
    relationship_type: String,
    weight: f64,
    confidence: i64,
    context: Option<String>,
    bidirectional: i64,
    status: String,
    created_by: Option<String>,
    reasoning: Option<String>,
    evidence: Option<String>,
    created_at: String,
    updated_at: String,
}

impl EdgeRow {
    fn into_edge(self) -> Result<KnowledgeEdge> {
        let relationship_type = RelationshipType::parse(&self.relationship_type).ok_or_else(|| {
            Error::Other(format!("Invalid relationship type: {}", self.relationship_type))
        })?;
        let status = EdgeStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Invalid edge status: {}", self.status)))?;

        let evidence: Vec<String> = self
            .evidence
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        Ok(KnowledgeEdge {
            id: self.id,
            source_node_id: self.source_node_id,
            target_node_id: self.target_node_id,
            relationship_type,
            weight: self.weight,
            confidence: self.confidence,
            context: self.context,
            bidirectional: self.bidirectional != 0,
            status,
            created_by: self.created_by,
            reasoning: self.reasoning,
            evidence,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{Domain, DomainName, HierarchyRepository, Subdomain};
    use crate::domain::node::{KnowledgeNode, NodeRepository};
    use crate::infrastructure::hierarchy::SqliteHierarchyRepository;
    use crate::infrastructure::node::SqliteNodeRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> (SqliteGraphRepository, SqliteNodeRepository, String) {
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

        (
            SqliteGraphRepository::new(pool.clone()),
            SqliteNodeRepository::new(pool),
            subdomain.id,
        )
    }

    async fn make_node(repo: &SqliteNodeRepository, subdomain_id: &str, title: &str) -> KnowledgeNode {
        let node = KnowledgeNode::new(subdomain_id, "Technique", title, "Body", "Summary", "t");
        repo.create(&node).await.unwrap();
        node
    }

    #[tokio::test]
    async fn test_save_and_get_edge_round_trip() {
        let (graph, nodes, subdomain_id) = setup_test_db().await;
        let a = make_node(&nodes, &subdomain_id, "A").await;
        let b = make_node(&nodes, &subdomain_id, "B").await;

        let edge = KnowledgeEdge::new(&a.id, &b.id, RelationshipType::CaseStudyOf)
            .with_weight(0.7)
            .with_confidence(80)
            .with_context("worked example")
            .with_reasoning("seen together in training data")
            .with_evidence(vec!["https://example.org".into()]);

        graph.create_edge(&edge).await.unwrap();

        let fetched = graph.get_edge(&edge.id).await.unwrap().unwrap();
        assert_eq!(fetched.relationship_type, RelationshipType::CaseStudyOf);
        assert_eq!(fetched.weight, 0.7);
        assert_eq!(fetched.confidence, 80);
        assert_eq!(fetched.evidence.len(), 1);
        assert!(!fetched.bidirectional);
    }

    #[tokio::test]
    async fn test_create_edge_missing_endpoint() {
        let (graph, nodes, subdomain_id) = setup_test_db().await;
        let a = make_node(&nodes, &subdomain_id, "A").await;

        let err = graph
            .create_edge(&KnowledgeEdge::new(&a.id, "ghost", RelationshipType::RelatedTo))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));

        let err = graph
            .create_edge(&KnowledgeEdge::new("ghost", &a.id, RelationshipType::RelatedTo))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_neighbor_ids_direction_rules() {
        let (graph, nodes, subdomain_id) = setup_test_db().await;
        let a = make_node(&nodes, &subdomain_id, "A").await;
        let b = make_node(&nodes, &subdomain_id, "B").await;
        let c = make_node(&nodes, &subdomain_id, "C").await;

        // a -> b directed, c -> a bidirectional
        graph
            .create_edge(&KnowledgeEdge::new(&a.id, &b.id, RelationshipType::DependsOn))
            .await
            .unwrap();
        graph
            .create_edge(
                &KnowledgeEdge::new(&c.id, &a.id, RelationshipType::RelatedTo).bidirectional(),
            )
            .await
            .unwrap();

        let mut neighbors = graph.neighbor_ids(&a.id).await.unwrap();
        neighbors.sort();
        let mut expected = vec![b.id.clone(), c.id.clone()];
        expected.sort();
        assert_eq!(neighbors, expected);

        // b has no outgoing edges and its incoming edge is not bidirectional
        let neighbors = graph.neighbor_ids(&b.id).await.unwrap();
        assert!(neighbors.is_empty());
    }

    #[tokio::test]
    async fn test_edge_status_filtering() {
        let (graph, nodes, subdomain_id) = setup_test_db().await;
        let a = make_node(&nodes, &subdomain_id, "A").await;
        let b = make_node(&nodes, &subdomain_id, "B").await;

        let edge = KnowledgeEdge::new(&a.id, &b.id, RelationshipType::Extends);
        graph.create_edge(&edge).await.unwrap();

        assert_eq!(graph.outgoing_edges(&a.id, None).await.unwrap().len(), 1);

        graph
            .set_edge_status(&edge.id, EdgeStatus::Deprecated)
            .await
            .unwrap();

        assert!(graph.outgoing_edges(&a.id, None).await.unwrap().is_empty());
        assert!(graph.neighbor_ids(&a.id).await.unwrap().is_empty());

        assert!(!graph.set_edge_status("missing", EdgeStatus::Inactive).await.unwrap());
    }

    #[tokio::test]
    async fn test_type_filtered_queries() {
        let (graph, nodes, subdomain_id) = setup_test_db().await;
        let a = make_node(&nodes, &subdomain_id, "A").await;
        let b = make_node(&nodes, &subdomain_id, "B").await;
        let c = make_node(&nodes, &subdomain_id, "C").await;

        graph
            .create_edge(&KnowledgeEdge::new(&a.id, &b.id, RelationshipType::References))
            .await
            .unwrap();
        graph
            .create_edge(&KnowledgeEdge::new(&a.id, &c.id, RelationshipType::Contradicts))
            .await
            .unwrap();

        let refs = graph
            .outgoing_edges(&a.id, Some(RelationshipType::References))
            .await
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target_node_id, b.id);

        let incoming = graph
            .incoming_edges(&c.id, Some(RelationshipType::Contradicts))
            .await
            .unwrap();
        assert_eq!(incoming.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_empty() {
        let (graph, _nodes, _subdomain_id) = setup_test_db().await;

        let stats = graph.stats().await.unwrap();
        assert_eq!(stats.total_edges, 0);
        assert_eq!(stats.average_weight, 0.0);
        assert!(stats.by_type.is_empty());
    }
}
