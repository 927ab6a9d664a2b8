//! Knowledge node domain module
//!
//! Nodes are the atomic knowledge units feeding model training. Each node
//! belongs to one subdomain and carries content, provenance, a curation
//! workflow (pending → needs_review/approved/rejected, freely re-reviewable),
//! usage statistics, and versioned content history.
//!
//! The validation history and raw feedback entries live in append-only side
//! tables rather than embedded arrays, so concurrent appends never lose
//! entries; the node row holds only the current state and cached scores.

mod entity;
mod repository;
mod service;

pub use entity::{
    Confidentiality, ContentRevision, ContentType, Difficulty, FeedbackEntry, KnowledgeNode,
    NodeMetadata, SourceInfo, ValidationRecord, ValidationState, ValidationStatus,
};
pub use repository::{KeywordMatch, NodeFilter, NodeRepository};
pub use service::{NodeService, RankedNode, ValidationInput};
