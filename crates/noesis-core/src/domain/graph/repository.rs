//! Repository trait for relationship graph persistence

use async_trait::async_trait;

use crate::domain::node::KnowledgeNode;
use crate::error::Result;

use super::entity::{EdgeStatus, KnowledgeEdge, RelationshipType};

/// Aggregate statistics over the edge table
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub total_edges: u64,
    /// Edge counts per relationship type
    pub by_type: Vec<(RelationshipType, u64)>,
    pub average_weight: f64,
    pub average_confidence: f64,
}

/// Repository trait for relationship graph persistence
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Insert a new edge; both endpoints must exist
    async fn create_edge(&self, edge: &KnowledgeEdge) -> Result<()>;

    /// Get an edge by id
    async fn get_edge(&self, id: &str) -> Result<Option<KnowledgeEdge>>;

    /// Active edges leaving a node, optionally filtered by type,
    /// sorted by weight desc then confidence desc
    async fn outgoing_edges(
        &self,
        node_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<KnowledgeEdge>>;

    /// Active edges arriving at a node, same filtering and ordering
    async fn incoming_edges(
        &self,
        node_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<KnowledgeEdge>>;

    /// Persist a full edge row
    async fn update_edge(&self, edge: &KnowledgeEdge) -> Result<()>;

    /// Change only the edge status; false when the edge is missing
    async fn set_edge_status(&self, id: &str, status: EdgeStatus) -> Result<bool>;

    /// Ids of nodes reachable from `node_id` in one hop over active edges:
    /// targets of outgoing edges, plus sources of incoming edges flagged
    /// bidirectional. Used by the BFS path search.
    async fn neighbor_ids(&self, node_id: &str) -> Result<Vec<String>>;

    /// Opposite endpoints of active `similar_to` edges touching the node
    /// in either direction, sorted by confidence desc, capped
    async fn similar_nodes(&self, node_id: &str, limit: usize) -> Result<Vec<KnowledgeNode>>;

    /// Targets of active outgoing `prerequisite_of` edges,
    /// sorted by weight desc, capped
    async fn dependent_nodes(&self, node_id: &str, limit: usize) -> Result<Vec<KnowledgeNode>>;

    /// Aggregate statistics over all edges
    async fn stats(&self) -> Result<GraphStats>;
}
