//! Domain and subdomain entities
//!
//! Domains form the top level of the knowledge hierarchy; subdomains belong
//! to exactly one domain and carry a slug unique within it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level knowledge category, from a fixed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainName {
    Cybersecurity,
    Legal,
    Audit,
    Osint,
    Finance,
    General,
}

impl DomainName {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cybersecurity => "cybersecurity",
            Self::Legal => "legal",
            Self::Audit => "audit",
            Self::Osint => "osint",
            Self::Finance => "finance",
            Self::General => "general",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cybersecurity" => Some(Self::Cybersecurity),
            "legal" => Some(Self::Legal),
            "audit" => Some(Self::Audit),
            "osint" => Some(Self::Osint),
            "finance" => Some(Self::Finance),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    /// Get all domain names
    pub fn all() -> &'static [DomainName] {
        &[
            Self::Cybersecurity,
            Self::Legal,
            Self::Audit,
            Self::Osint,
            Self::Finance,
            Self::General,
        ]
    }
}

impl std::fmt::Display for DomainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status shared by domains and subdomains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Development,
    Beta,
    Active,
    Inactive,
}

impl LifecycleStatus {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Beta => "beta",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" => Some(Self::Development),
            "beta" => Some(Self::Beta),
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Free-form domain metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainMetadata {
    /// User responsible for curating this domain
    pub owner: Option<String>,
    /// Domain version tag (e.g. "1.0.0")
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Primary knowledge source
    pub source: Option<String>,
}

/// A top-level knowledge domain
///
/// `total_nodes` and `quality_score` are cached aggregates, recomputed from
/// the node store rather than mutated directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    /// Unique identifier
    pub id: String,
    /// Unique name from the fixed domain set
    pub name: DomainName,
    pub description: String,
    /// Icon/emoji for display
    pub icon: String,
    /// Hex color for display
    pub color: String,
    /// Weight in the model (1-10)
    pub priority: u8,
    pub status: LifecycleStatus,
    /// Cached count of nodes transitively owned by this domain
    pub total_nodes: i64,
    /// Cached quality score (0-100), mean feedback of approved nodes
    pub quality_score: i64,
    /// When a model last consumed this domain
    pub last_model_update: Option<DateTime<Utc>>,
    pub metadata: DomainMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    /// Create a new domain in development status
    pub fn new(name: DomainName, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description: description.into(),
            icon: String::new(),
            color: "#000000".to_string(),
            priority: 5,
            status: LifecycleStatus::Development,
            total_nodes: 0,
            quality_score: 0,
            last_model_update: None,
            metadata: DomainMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display icon
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Set the display color
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set the priority (clamped to 1-10)
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: DomainMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Free-form subdomain metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubdomainMetadata {
    pub owner: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ids of related subdomains
    #[serde(default)]
    pub related_subdomains: Vec<String>,
    /// URLs of external sources feeding this subdomain
    #[serde(default)]
    pub external_sources: Vec<String>,
}

/// A named subdivision of a domain
///
/// The (domain_id, slug) pair is unique. Counter and quality fields are
/// cached aggregates like the domain's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subdomain {
    pub id: String,
    /// Owning domain
    pub domain_id: String,
    pub name: String,
    pub description: Option<String>,
    /// URL-friendly identifier, lowercase, unique within the domain
    pub slug: String,
    pub icon: Option<String>,
    pub display_order: i64,
    /// Cached count of nodes in this subdomain
    pub total_nodes: i64,
    /// Cached count of approved nodes
    pub validated_nodes: i64,
    /// Cached quality score (0-100)
    pub quality_score: i64,
    pub status: LifecycleStatus,
    /// When data was last ingested into this subdomain
    pub last_ingestion_at: Option<DateTime<Utc>>,
    pub metadata: SubdomainMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subdomain {
    /// Create a new subdomain in development status; the slug is lowercased
    pub fn new(
        domain_id: impl Into<String>,
        name: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            domain_id: domain_id.into(),
            name: name.into(),
            description: None,
            slug: slug.into().to_lowercase(),
            icon: None,
            display_order: 0,
            total_nodes: 0,
            validated_nodes: 0,
            quality_score: 0,
            status: LifecycleStatus::Development,
            last_ingestion_at: None,
            metadata: SubdomainMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the display order
    pub fn with_display_order(mut self, order: i64) -> Self {
        self.display_order = order;
        self
    }

    /// Set the icon
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: SubdomainMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
