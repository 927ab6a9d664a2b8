//! Graph edge entity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Types of relationships between knowledge nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Generic association
    RelatedTo,
    /// Source must be understood before target
    PrerequisiteOf,
    /// Source expands on target
    Extends,
    /// Source contradicts target
    Contradicts,
    /// Source is similar to target
    SimilarTo,
    /// Source is a case study of target
    CaseStudyOf,
    /// Source implements target
    Implements,
    /// Source cites target
    References,
    /// Source depends on target
    DependsOn,
}

impl RelationshipType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelatedTo => "related_to",
            Self::PrerequisiteOf => "prerequisite_of",
            Self::Extends => "extends",
            Self::Contradicts => "contradicts",
            Self::SimilarTo => "similar_to",
            Self::CaseStudyOf => "case_study_of",
            Self::Implements => "implements",
            Self::References => "references",
            Self::DependsOn => "depends_on",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "related_to" | "relatedto" => Some(Self::RelatedTo),
            "prerequisite_of" | "prerequisiteof" => Some(Self::PrerequisiteOf),
            "extends" => Some(Self::Extends),
            "contradicts" => Some(Self::Contradicts),
            "similar_to" | "similarto" => Some(Self::SimilarTo),
            "case_study_of" | "casestudyof" => Some(Self::CaseStudyOf),
            "implements" => Some(Self::Implements),
            "references" => Some(Self::References),
            "depends_on" | "dependson" => Some(Self::DependsOn),
            _ => None,
        }
    }

    /// Get all relationship types
    pub fn all() -> &'static [RelationshipType] {
        &[
            Self::RelatedTo,
            Self::PrerequisiteOf,
            Self::Extends,
            Self::Contradicts,
            Self::SimilarTo,
            Self::CaseStudyOf,
            Self::Implements,
            Self::References,
            Self::DependsOn,
        ]
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    Active,
    Inactive,
    Deprecated,
}

impl EdgeStatus {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Deprecated => "deprecated",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }
}

impl std::fmt::Display for EdgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, typed edge between two knowledge nodes
///
/// Stored as a single directed record; an edge flagged `bidirectional` is
/// logically traversable in both directions for query purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEdge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub relationship_type: RelationshipType,
    /// Relevance/strength (0.0-1.0)
    pub weight: f64,
    /// Confidence in the relationship (0-100)
    pub confidence: i64,
    /// Free-text context for the relationship
    pub context: Option<String>,
    pub bidirectional: bool,
    pub status: EdgeStatus,
    pub created_by: Option<String>,
    /// Why this relationship exists
    pub reasoning: Option<String>,
    /// URLs or references backing the relationship
    pub evidence: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEdge {
    /// Create a new active edge with default weight and confidence
    pub fn new(
        source_node_id: impl Into<String>,
        target_node_id: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source_node_id: source_node_id.into(),
            target_node_id: target_node_id.into(),
            relationship_type,
            weight: 0.5,
            confidence: 50,
            context: None,
            bidirectional: false,
            status: EdgeStatus::Active,
            created_by: None,
            reasoning: None,
            evidence: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the weight (clamped to 0.0-1.0)
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    /// Set the confidence (clamped to 0-100)
    pub fn with_confidence(mut self, confidence: i64) -> Self {
        self.confidence = confidence.clamp(0, 100);
        self
    }

    /// Set the context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Mark the edge as traversable in both directions
    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    /// Set the creator
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Set the reasoning
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Set the supporting evidence
    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// Field subset for edge updates
#[derive(Debug, Clone, Default)]
pub struct EdgeUpdate {
    pub weight: Option<f64>,
    pub confidence: Option<i64>,
    pub context: Option<String>,
    pub reasoning: Option<String>,
    pub status: Option<EdgeStatus>,
}
