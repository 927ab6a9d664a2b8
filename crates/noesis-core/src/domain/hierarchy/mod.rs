//! Knowledge hierarchy domain module
//!
//! Domains are top-level knowledge categories (cybersecurity, legal, audit,
//! osint, finance, general); subdomains subdivide them. Each level is an
//! independent entity referencing its parent by id, so counters and quality
//! scores can be recomputed without rewriting ancestors.
//!
//! `total_nodes`, `validated_nodes`, and `quality_score` are cached
//! aggregates: they are only ever written by the recompute operations, which
//! derive them from the node store and are safe to re-run.

mod entity;
mod repository;
mod service;

pub use entity::{Domain, DomainMetadata, DomainName, LifecycleStatus, Subdomain, SubdomainMetadata};
pub use repository::{HierarchyRepository, NodeCounts, SubdomainNodeBreakdown};
pub use service::{HierarchyService, SubdomainStats};
