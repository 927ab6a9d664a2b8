//! Relationship graph service
//!
//! Edge management plus traversal queries: breadth-first shortest path,
//! similarity lookups, and dependency lookups.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::node::KnowledgeNode;
use crate::error::{Error, Result};

use super::entity::{EdgeStatus, EdgeUpdate, KnowledgeEdge, RelationshipType};
use super::repository::{GraphRepository, GraphStats};

/// Default bound on BFS depth
const DEFAULT_MAX_DEPTH: usize = 5;

/// Result of a path search between two nodes
#[derive(Debug, Clone)]
pub enum PathSearch {
    /// Node ids along the shortest path found, endpoints included
    Found(Vec<String>),
    /// No path within the depth bound
    NotFound,
}

impl PathSearch {
    /// The path, if one was found
    pub fn path(&self) -> Option<&[String]> {
        match self {
            Self::Found(path) => Some(path),
            Self::NotFound => None,
        }
    }
}

/// Service for relationship graph operations
pub struct GraphService<R: GraphRepository> {
    repository: Arc<R>,
}

impl<R: GraphRepository> GraphService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Create an edge between two existing nodes
    pub async fn create_edge(&self, edge: KnowledgeEdge) -> Result<KnowledgeEdge> {
        if edge.source_node_id == edge.target_node_id {
            return Err(Error::InvalidInput(
                "an edge cannot connect a node to itself".into(),
            ));
        }
        if !(0.0..=1.0).contains(&edge.weight) {
            return Err(Error::InvalidInput(format!(
                "weight must be between 0.0 and 1.0, got {}",
                edge.weight
            )));
        }
        if !(0..=100).contains(&edge.confidence) {
            return Err(Error::InvalidInput(format!(
                "confidence must be between 0 and 100, got {}",
                edge.confidence
            )));
        }

        self.repository.create_edge(&edge).await?;
        info!(
            edge_id = %edge.id,
            source = %edge.source_node_id,
            target = %edge.target_node_id,
            relationship = %edge.relationship_type,
            "Edge created"
        );
        Ok(edge)
    }

    /// Get an edge by id
    pub async fn get_edge(&self, id: &str) -> Result<KnowledgeEdge> {
        self.repository
            .get_edge(id)
            .await?
            .ok_or_else(|| Error::EdgeNotFound(id.to_string()))
    }

    /// Active edges leaving a node
    pub async fn outgoing_edges(
        &self,
        node_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<KnowledgeEdge>> {
        self.repository.outgoing_edges(node_id, relationship_type).await
    }

    /// Active edges arriving at a node
    pub async fn incoming_edges(
        &self,
        node_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<KnowledgeEdge>> {
        self.repository.incoming_edges(node_id, relationship_type).await
    }

    /// Breadth-first shortest path between two nodes
    ///
    /// Follows outgoing active edges, and incoming active edges flagged
    /// bidirectional. Each queue entry carries the path taken to reach it,
    /// so under BFS the first arrival at the target is a shortest path.
    /// Paths longer than `max_depth` nodes are pruned.
    pub async fn find_path(
        &self,
        source_node_id: &str,
        target_node_id: &str,
        max_depth: Option<usize>,
    ) -> Result<PathSearch> {
        let max_depth = max_depth.unwrap_or(DEFAULT_MAX_DEPTH);

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, Vec<String>)> = VecDeque::new();
        queue.push_back((
            source_node_id.to_string(),
            vec![source_node_id.to_string()],
        ));

        while let Some((node_id, path)) = queue.pop_front() {
            if path.len() > max_depth {
                continue;
            }
            if !visited.insert(node_id.clone()) {
                continue;
            }

            if node_id == target_node_id {
                debug!(
                    source = %source_node_id,
                    target = %target_node_id,
                    hops = path.len() - 1,
                    "Path found"
                );
                return Ok(PathSearch::Found(path));
            }

            for neighbor in self.repository.neighbor_ids(&node_id).await? {
                if !visited.contains(&neighbor) {
                    let mut next_path = path.clone();
                    next_path.push(neighbor.clone());
                    queue.push_back((neighbor, next_path));
                }
            }
        }

        debug!(source = %source_node_id, target = %target_node_id, max_depth, "No path found");
        Ok(PathSearch::NotFound)
    }

    /// Nodes similar to the given node, via `similar_to` edges in either
    /// direction, highest confidence first
    pub async fn similar_nodes(&self, node_id: &str, limit: usize) -> Result<Vec<KnowledgeNode>> {
        self.repository.similar_nodes(node_id, limit).await
    }

    /// Nodes that require the given node as a prerequisite,
    /// highest weight first
    pub async fn dependent_nodes(&self, node_id: &str, limit: usize) -> Result<Vec<KnowledgeNode>> {
        self.repository.dependent_nodes(node_id, limit).await
    }

    /// Apply a field-subset update to an edge
    pub async fn update_edge(&self, edge_id: &str, update: EdgeUpdate) -> Result<KnowledgeEdge> {
        let mut edge = self.get_edge(edge_id).await?;

        if let Some(weight) = update.weight {
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::InvalidInput(format!(
                    "weight must be between 0.0 and 1.0, got {}",
                    weight
                )));
            }
            edge.weight = weight;
        }
        if let Some(confidence) = update.confidence {
            if !(0..=100).contains(&confidence) {
                return Err(Error::InvalidInput(format!(
                    "confidence must be between 0 and 100, got {}",
                    confidence
                )));
            }
            edge.confidence = confidence;
        }
        if let Some(context) = update.context {
            edge.context = Some(context);
        }
        if let Some(reasoning) = update.reasoning {
            edge.reasoning = Some(reasoning);
        }
        if let Some(status) = update.status {
            edge.status = status;
        }
        edge.updated_at = chrono::Utc::now();

        self.repository.update_edge(&edge).await?;
        Ok(edge)
    }

    /// Deactivate an edge (status → inactive)
    pub async fn deactivate_edge(&self, edge_id: &str) -> Result<()> {
        if !self
            .repository
            .set_edge_status(edge_id, EdgeStatus::Inactive)
            .await?
        {
            return Err(Error::EdgeNotFound(edge_id.to_string()));
        }
        info!(edge_id = %edge_id, "Edge deactivated");
        Ok(())
    }

    /// Aggregate graph statistics
    pub async fn stats(&self) -> Result<GraphStats> {
        self.repository.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{Domain, DomainName, HierarchyRepository, Subdomain};
    use crate::domain::node::{KnowledgeNode, NodeRepository};
    use crate::infrastructure::graph::SqliteGraphRepository;
    use crate::infrastructure::hierarchy::SqliteHierarchyRepository;
    use crate::infrastructure::node::SqliteNodeRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;

    struct Fixture {
        service: GraphService<SqliteGraphRepository>,
        nodes: SqliteNodeRepository,
        subdomain_id: String,
    }

    async fn setup() -> Fixture {
        let pool: SqlitePool = SqlitePoolOptions::new()
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

        Fixture {
            service: GraphService::new(Arc::new(SqliteGraphRepository::new(pool.clone()))),
            nodes: SqliteNodeRepository::new(pool),
            subdomain_id: subdomain.id,
        }
    }

    async fn make_node(fixture: &Fixture, title: &str) -> KnowledgeNode {
        let node = KnowledgeNode::new(
            &fixture.subdomain_id,
            "Technique",
            title,
            "Body",
            "Summary",
            "tester",
        );
        fixture.nodes.create(&node).await.unwrap();
        node
    }

    #[tokio::test]
    async fn test_create_edge_requires_existing_endpoints() {
        let fixture = setup().await;
        let a = make_node(&fixture, "A").await;

        let err = fixture
            .service
            .create_edge(KnowledgeEdge::new(&a.id, "missing", RelationshipType::RelatedTo))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_self_edge_rejected() {
        let fixture = setup().await;
        let a = make_node(&fixture, "A").await;

        let err = fixture
            .service
            .create_edge(KnowledgeEdge::new(&a.id, &a.id, RelationshipType::RelatedTo))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_outgoing_and_incoming_sorted() {
        let fixture = setup().await;
        let a = make_node(&fixture, "A").await;
        let b = make_node(&fixture, "B").await;
        let c = make_node(&fixture, "C").await;

        fixture
            .service
            .create_edge(
                KnowledgeEdge::new(&a.id, &b.id, RelationshipType::RelatedTo).with_weight(0.3),
            )
            .await
            .unwrap();
        fixture
            .service
            .create_edge(
                KnowledgeEdge::new(&a.id, &c.id, RelationshipType::RelatedTo).with_weight(0.9),
            )
            .await
            .unwrap();

        let outgoing = fixture.service.outgoing_edges(&a.id, None).await.unwrap();
        assert_eq!(outgoing.len(), 2);
        assert_eq!(outgoing[0].target_node_id, c.id, "sorted by weight desc");

        let incoming = fixture.service.incoming_edges(&b.id, None).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].source_node_id, a.id);
    }

    #[tokio::test]
    async fn test_find_path_chain() {
        let fixture = setup().await;
        let a = make_node(&fixture, "A").await;
        let b = make_node(&fixture, "B").await;
        let c = make_node(&fixture, "C").await;

        fixture
            .service
            .create_edge(KnowledgeEdge::new(&a.id, &b.id, RelationshipType::PrerequisiteOf))
            .await
            .unwrap();
        fixture
            .service
            .create_edge(KnowledgeEdge::new(&b.id, &c.id, RelationshipType::PrerequisiteOf))
            .await
            .unwrap();

        let result = fixture.service.find_path(&a.id, &c.id, Some(5)).await.unwrap();
        let path = result.path().expect("path should exist");
        assert_eq!(path, &[a.id.clone(), b.id.clone(), c.id.clone()]);

        // Depth bound of 1 node-hop cannot reach C
        let result = fixture.service.find_path(&a.id, &c.id, Some(1)).await.unwrap();
        assert!(result.path().is_none());
    }

    #[tokio::test]
    async fn test_find_path_respects_direction_and_bidirectional_flag() {
        let fixture = setup().await;
        let a = make_node(&fixture, "A").await;
        let b = make_node(&fixture, "B").await;

        fixture
            .service
            .create_edge(KnowledgeEdge::new(&a.id, &b.id, RelationshipType::DependsOn))
            .await
            .unwrap();

        // Directed edge: reachable A→B, not B→A
        let forward = fixture.service.find_path(&a.id, &b.id, None).await.unwrap();
        assert!(forward.path().is_some());
        let backward = fixture.service.find_path(&b.id, &a.id, None).await.unwrap();
        assert!(backward.path().is_none());

        // A bidirectional edge is traversable both ways
        let c = make_node(&fixture, "C").await;
        fixture
            .service
            .create_edge(
                KnowledgeEdge::new(&b.id, &c.id, RelationshipType::RelatedTo).bidirectional(),
            )
            .await
            .unwrap();
        let reverse = fixture.service.find_path(&c.id, &b.id, None).await.unwrap();
        assert!(reverse.path().is_some());
    }

    #[tokio::test]
    async fn test_inactive_edges_not_traversed() {
        let fixture = setup().await;
        let a = make_node(&fixture, "A").await;
        let b = make_node(&fixture, "B").await;

        let edge = fixture
            .service
            .create_edge(KnowledgeEdge::new(&a.id, &b.id, RelationshipType::RelatedTo))
            .await
            .unwrap();

        fixture.service.deactivate_edge(&edge.id).await.unwrap();

        let result = fixture.service.find_path(&a.id, &b.id, None).await.unwrap();
        assert!(result.path().is_none());

        let outgoing = fixture.service.outgoing_edges(&a.id, None).await.unwrap();
        assert!(outgoing.is_empty());
    }

    #[tokio::test]
    async fn test_similar_nodes_either_direction() {
        let fixture = setup().await;
        let a = make_node(&fixture, "A").await;
        let b = make_node(&fixture, "B").await;
        let c = make_node(&fixture, "C").await;

        // A -similar_to-> B, C -similar_to-> A
        fixture
            .service
            .create_edge(
                KnowledgeEdge::new(&a.id, &b.id, RelationshipType::SimilarTo).with_confidence(60),
            )
            .await
            .unwrap();
        fixture
            .service
            .create_edge(
                KnowledgeEdge::new(&c.id, &a.id, RelationshipType::SimilarTo).with_confidence(90),
            )
            .await
            .unwrap();

        let similar = fixture.service.similar_nodes(&a.id, 10).await.unwrap();
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].id, c.id, "highest confidence first");
    }

    #[tokio::test]
    async fn test_dependent_nodes() {
        let fixture = setup().await;
        let base = make_node(&fixture, "Base").await;
        let dep1 = make_node(&fixture, "Dep1").await;
        let dep2 = make_node(&fixture, "Dep2").await;

        fixture
            .service
            .create_edge(
                KnowledgeEdge::new(&base.id, &dep1.id, RelationshipType::PrerequisiteOf)
                    .with_weight(0.4),
            )
            .await
            .unwrap();
        fixture
            .service
            .create_edge(
                KnowledgeEdge::new(&base.id, &dep2.id, RelationshipType::PrerequisiteOf)
                    .with_weight(0.8),
            )
            .await
            .unwrap();

        let dependents = fixture.service.dependent_nodes(&base.id, 10).await.unwrap();
        assert_eq!(dependents.len(), 2);
        assert_eq!(dependents[0].id, dep2.id, "highest weight first");
    }

    #[tokio::test]
    async fn test_update_edge_fields() {
        let fixture = setup().await;
        let a = make_node(&fixture, "A").await;
        let b = make_node(&fixture, "B").await;

        let edge = fixture
            .service
            .create_edge(KnowledgeEdge::new(&a.id, &b.id, RelationshipType::Extends))
            .await
            .unwrap();

        let updated = fixture
            .service
            .update_edge(
                &edge.id,
                EdgeUpdate {
                    weight: Some(0.75),
                    confidence: Some(88),
                    context: Some("expanded technique".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.weight, 0.75);
        assert_eq!(updated.confidence, 88);
        assert_eq!(updated.context.as_deref(), Some("expanded technique"));
    }

    #[tokio::test]
    async fn test_stats() {
        let fixture = setup().await;
        let a = make_node(&fixture, "A").await;
        let b = make_node(&fixture, "B").await;
        let c = make_node(&fixture, "C").await;

        fixture
            .service
            .create_edge(
                KnowledgeEdge::new(&a.id, &b.id, RelationshipType::RelatedTo)
                    .with_weight(0.4)
                    .with_confidence(40),
            )
            .await
            .unwrap();
        fixture
            .service
            .create_edge(
                KnowledgeEdge::new(&b.id, &c.id, RelationshipType::DependsOn)
                    .with_weight(0.8)
                    .with_confidence(80),
            )
            .await
            .unwrap();

        let stats = fixture.service.stats().await.unwrap();
        assert_eq!(stats.total_edges, 2);
        assert!((stats.average_weight - 0.6).abs() < 1e-9);
        assert!((stats.average_confidence - 60.0).abs() < 1e-9);
        assert!(
            stats
                .by_type
                .iter()
                .any(|(t, c)| *t == RelationshipType::RelatedTo && *c == 1)
        );
    }
}
