//! Relationship graph domain module
//!
//! Typed directed edges between knowledge nodes. Edges are first-class
//! records rather than adjacency lists embedded in nodes, so they can be
//! queried efficiently from either endpoint and their metadata (confidence,
//! provenance) evolves independently of the nodes they connect.
//!
//! Traversal queries (shortest path, similar, dependents) operate over
//! active edges only; edges flagged bidirectional are traversable in both
//! directions.

mod entity;
mod repository;
mod service;

pub use entity::{EdgeStatus, EdgeUpdate, KnowledgeEdge, RelationshipType};
pub use repository::{GraphRepository, GraphStats};
pub use service::{GraphService, PathSearch};
