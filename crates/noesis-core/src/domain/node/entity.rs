//! Knowledge node entity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of content a node carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Template,
    Checklist,
    Process,
    Rule,
    Pattern,
    Definition,
    Formula,
}

impl ContentType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Template => "template",
            Self::Checklist => "checklist",
            Self::Process => "process",
            Self::Rule => "rule",
            Self::Pattern => "pattern",
            Self::Definition => "definition",
            Self::Formula => "formula",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "template" => Some(Self::Template),
            "checklist" => Some(Self::Checklist),
            "process" => Some(Self::Process),
            "rule" => Some(Self::Rule),
            "pattern" => Some(Self::Pattern),
            "definition" => Some(Self::Definition),
            "formula" => Some(Self::Formula),
            _ => None,
        }
    }

    /// Get all content types
    pub fn all() -> &'static [ContentType] {
        &[
            Self::Text,
            Self::Template,
            Self::Checklist,
            Self::Process,
            Self::Rule,
            Self::Pattern,
            Self::Definition,
            Self::Formula,
        ]
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Curation state of a node
///
/// Any state may move to any other state via a validate call; approved and
/// rejected nodes remain re-reviewable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    NeedsReview,
    Approved,
    Rejected,
}

impl ValidationStatus {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::NeedsReview => "needs_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "needs_review" | "needsreview" => Some(Self::NeedsReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Difficulty classification for consumers of the knowledge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

/// Confidentiality classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidentiality {
    #[default]
    Public,
    Internal,
    Confidential,
}

/// Provenance of a node's content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Credibility of the source (0-100)
    #[serde(default = "default_credibility")]
    pub credibility: u8,
}

fn default_credibility() -> u8 {
    50
}

impl Default for SourceInfo {
    fn default() -> Self {
        Self {
            title: None,
            url: None,
            author: None,
            published_at: None,
            credibility: 50,
        }
    }
}

/// Free-form node metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub created_by: String,
    pub owner: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub confidentiality: Confidentiality,
}

fn default_language() -> String {
    "en".to_string()
}

impl NodeMetadata {
    pub fn new(created_by: impl Into<String>) -> Self {
        Self {
            created_by: created_by.into(),
            owner: None,
            tags: Vec::new(),
            language: default_language(),
            difficulty: Difficulty::default(),
            confidentiality: Confidentiality::default(),
        }
    }
}

/// Current validation state carried on the node row
///
/// The full history is an append-only log alongside, never discarded; the
/// current state is last-write-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationState {
    pub status: ValidationStatus,
    /// Latest validation score (0-100)
    pub score: i64,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl Default for ValidationState {
    fn default() -> Self {
        Self {
            status: ValidationStatus::Pending,
            score: 0,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
        }
    }
}

/// One entry in a node's append-only validation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub validated_by: String,
    pub validated_at: DateTime<Utc>,
    pub status: ValidationStatus,
    /// Score assigned by the rater (0-100)
    pub score: i64,
    pub comments: Option<String>,
}

/// One raw feedback entry on a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub user_id: String,
    /// Rating on a 0-5 scale
    pub rating: f64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An archived content snapshot, created before each content update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRevision {
    /// The version the archived content belonged to
    pub version: i64,
    pub content: String,
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
}

/// An atomic knowledge unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: String,
    /// Owning subdomain
    pub subdomain_id: String,
    /// Free-text category label (e.g. "CVSS Score", "Legal Template")
    pub category: String,
    pub title: String,
    /// Main content body (markdown allowed)
    pub content: String,
    /// Short summary for search and retrieval
    pub summary: String,
    pub keywords: Vec<String>,
    pub examples: Vec<String>,
    /// Ids of related nodes
    pub related_node_ids: Vec<String>,
    pub content_type: ContentType,
    /// Optional structured payload
    pub structured_data: Option<serde_json::Value>,
    pub source: Option<SourceInfo>,
    pub validation: ValidationState,
    pub effective_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub usage_in_models: i64,
    /// Cached aggregate of feedback ratings (0-100)
    pub feedback_score: i64,
    /// Content version, starts at 1 and increments by exactly 1 per update
    pub version: i64,
    pub metadata: NodeMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeNode {
    /// Create a new node in pending validation state
    pub fn new(
        subdomain_id: impl Into<String>,
        category: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        summary: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            subdomain_id: subdomain_id.into(),
            category: category.into(),
            title: title.into(),
            content: content.into(),
            summary: summary.into(),
            keywords: Vec::new(),
            examples: Vec::new(),
            related_node_ids: Vec::new(),
            content_type: ContentType::Text,
            structured_data: None,
            source: None,
            validation: ValidationState::default(),
            effective_date: now,
            expiry_date: None,
            view_count: 0,
            usage_in_models: 0,
            feedback_score: 0,
            version: 1,
            metadata: NodeMetadata::new(created_by),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the keywords
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Set the examples
    pub fn with_examples(mut self, examples: Vec<String>) -> Self {
        self.examples = examples;
        self
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Set the source provenance
    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the structured payload
    pub fn with_structured_data(mut self, data: serde_json::Value) -> Self {
        self.structured_data = Some(data);
        self
    }

    /// Set the expiry date
    pub fn with_expiry_date(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry);
        self
    }

    /// Set the related node ids
    pub fn with_related_nodes(mut self, ids: Vec<String>) -> Self {
        self.related_node_ids = ids;
        self
    }

    /// Apply a validation outcome to the current state
    ///
    /// History recording is the repository's job; this only updates the
    /// last-write-wins current state.
    pub fn apply_validation(&mut self, record: &ValidationRecord) {
        self.validation.status = record.status;
        self.validation.score = record.score;
        match record.status {
            ValidationStatus::Approved => {
                self.validation.approved_by = Some(record.validated_by.clone());
                self.validation.approved_at = Some(record.validated_at);
            }
            ValidationStatus::Rejected => {
                self.validation.rejection_reason = record.comments.clone();
            }
            _ => {}
        }
        self.updated_at = record.validated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_creation_defaults() {
        let node = KnowledgeNode::new(
            "subdomain-1",
            "OSINT Technique",
            "Passive DNS enumeration",
            "Use passive DNS databases to map infrastructure without touching the target.",
            "Passive DNS for recon",
            "analyst-1",
        );

        assert!(!node.id.is_empty());
        assert_eq!(node.version, 1);
        assert_eq!(node.validation.status, ValidationStatus::Pending);
        assert_eq!(node.validation.score, 0);
        assert_eq!(node.feedback_score, 0);
        assert_eq!(node.content_type, ContentType::Text);
        assert_eq!(node.metadata.created_by, "analyst-1");
        assert_eq!(node.metadata.language, "en");
    }

    #[test]
    fn test_content_type_round_trip() {
        for ct in ContentType::all() {
            assert_eq!(ContentType::parse(ct.as_str()), Some(*ct));
        }
        assert_eq!(ContentType::parse("video"), None);
        assert_eq!(ContentType::all().len(), 8);
    }

    #[test]
    fn test_validation_status_parsing() {
        assert_eq!(ValidationStatus::parse("pending"), Some(ValidationStatus::Pending));
        assert_eq!(ValidationStatus::parse("NEEDS_REVIEW"), Some(ValidationStatus::NeedsReview));
        assert_eq!(ValidationStatus::parse("done"), None);
    }

    #[test]
    fn test_apply_approval_stamps_approver() {
        let mut node = KnowledgeNode::new("s", "c", "t", "body", "sum", "creator");
        let record = ValidationRecord {
            validated_by: "curator-1".into(),
            validated_at: Utc::now(),
            status: ValidationStatus::Approved,
            score: 85,
            comments: Some("solid".into()),
        };

        node.apply_validation(&record);

        assert_eq!(node.validation.status, ValidationStatus::Approved);
        assert_eq!(node.validation.score, 85);
        assert_eq!(node.validation.approved_by.as_deref(), Some("curator-1"));
        assert!(node.validation.approved_at.is_some());
        assert!(node.validation.rejection_reason.is_none());
    }

    #[test]
    fn test_apply_rejection_stamps_reason() {
        let mut node = KnowledgeNode::new("s", "c", "t", "body", "sum", "creator");
        let record = ValidationRecord {
            validated_by: "curator-2".into(),
            validated_at: Utc::now(),
            status: ValidationStatus::Rejected,
            score: 20,
            comments: Some("outdated guidance".into()),
        };

        node.apply_validation(&record);

        assert_eq!(node.validation.status, ValidationStatus::Rejected);
        assert_eq!(
            node.validation.rejection_reason.as_deref(),
            Some("outdated guidance")
        );
    }

    #[test]
    fn test_revalidation_is_permitted() {
        let mut node = KnowledgeNode::new("s", "c", "t", "body", "sum", "creator");

        node.apply_validation(&ValidationRecord {
            validated_by: "a".into(),
            validated_at: Utc::now(),
            status: ValidationStatus::Approved,
            score: 90,
            comments: None,
        });
        node.apply_validation(&ValidationRecord {
            validated_by: "b".into(),
            validated_at: Utc::now(),
            status: ValidationStatus::NeedsReview,
            score: 50,
            comments: Some("re-check the references".into()),
        });

        assert_eq!(node.validation.status, ValidationStatus::NeedsReview);
        // Approval stamp from the earlier pass is retained
        assert_eq!(node.validation.approved_by.as_deref(), Some("a"));
    }

    #[test]
    fn test_source_info_default_credibility() {
        let source = SourceInfo::default();
        assert_eq!(source.credibility, 50);
    }

    #[test]
    fn test_builder_chain() {
        let node = KnowledgeNode::new("s", "c", "t", "body", "sum", "creator")
            .with_keywords(vec!["dns".into(), "recon".into()])
            .with_content_type(ContentType::Process)
            .with_examples(vec!["dig example.com".into()]);

        assert_eq!(node.keywords.len(), 2);
        assert_eq!(node.content_type, ContentType::Process);
        assert_eq!(node.examples.len(), 1);
    }
}
