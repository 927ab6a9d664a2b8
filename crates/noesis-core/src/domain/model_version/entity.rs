//! Model version entity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a model version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Development,
    Beta,
    Stable,
    Deprecated,
    Retired,
}

impl VersionStatus {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Beta => "beta",
            Self::Stable => "stable",
            Self::Deprecated => "deprecated",
            Self::Retired => "retired",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" => Some(Self::Development),
            "beta" => Some(Self::Beta),
            "stable" => Some(Self::Stable),
            "deprecated" => Some(Self::Deprecated),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }

    /// Get all statuses
    pub fn all() -> &'static [VersionStatus] {
        &[
            Self::Development,
            Self::Beta,
            Self::Stable,
            Self::Deprecated,
            Self::Retired,
        ]
    }
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Statistics from the training run that produced a version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingStats {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_nodes_used: Option<i64>,
    pub validated_nodes_used: Option<i64>,
    pub duration_hours: Option<f64>,
    /// Human-readable dataset size (e.g. "2.5GB")
    pub dataset_size: Option<String>,
}

/// Measured model performance (accuracy on a 0-100 scale)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub accuracy: f64,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: Option<f64>,
}

/// Declared model parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Model family (e.g. "LLaMA-2")
    pub model_type: Option<String>,
    /// Parameter count tag (e.g. "7B", "70B")
    pub model_size: Option<String>,
    /// Quantization scheme (e.g. "int4", "fp16")
    pub quantization: Option<String>,
    pub context_length: Option<i64>,
    pub batch_size: Option<i64>,
    pub learning_rate: Option<f64>,
}

/// Inference characteristics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceStats {
    pub average_latency_ms: f64,
    pub tokens_per_second: f64,
    pub memory_required_gb: f64,
    #[serde(default)]
    pub gpu_required: bool,
    pub recommended_hardware: Option<String>,
}

/// Changes relative to the previous version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Changelog {
    #[serde(default)]
    pub major_changes: Vec<String>,
    #[serde(default)]
    pub bug_fixes: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

/// Compatibility declaration for a version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Compatibility {
    pub previous_version: Option<String>,
    pub breaking_changes: bool,
    #[serde(default)]
    pub breaking_changes_list: Vec<String>,
    pub rollback_supported: bool,
}

/// Distribution descriptors for a released version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub publicly_available: bool,
    pub api_endpoint: Option<String>,
    pub download_url: Option<String>,
    pub checksum_sha256: Option<String>,
}

/// Monitoring observations to record on a version
#[derive(Debug, Clone, Default)]
pub struct MonitoringUpdate {
    pub drift_score: Option<f64>,
    pub incidents_reported: Option<i64>,
    pub average_user_satisfaction: Option<f64>,
}

/// Slim projection of a version for history listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version_number: String,
    pub name: Option<String>,
    pub status: VersionStatus,
    pub release_date: Option<DateTime<Utc>>,
    /// Measured accuracy, when the version reports performance
    pub accuracy: Option<f64>,
}

/// Cross-version compatibility summary
#[derive(Debug, Clone)]
pub struct CompatibilitySummary {
    /// Whether the target version declares breaking changes
    pub breaking_changes: bool,
    pub breaking_changes_list: Vec<String>,
    /// Whether the source version supports rolling back to it
    pub rollback_supported: bool,
}

/// A versioned model snapshot referencing one or more domains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: String,
    /// Unique semver-like version string (e.g. "1.2.0")
    pub version_number: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Domains whose knowledge fed this version
    pub domain_ids: Vec<String>,
    pub training: Option<TrainingStats>,
    pub performance: Option<PerformanceMetrics>,
    pub parameters: Option<ModelParameters>,
    pub inference: Option<InferenceStats>,
    pub changelog: Option<Changelog>,
    pub compatibility: Compatibility,
    pub status: VersionStatus,
    pub release_date: Option<DateTime<Utc>>,
    pub sunset_date: Option<DateTime<Utc>>,
    pub distribution: Option<Distribution>,
    pub trained_by: String,
    pub drift_score: Option<f64>,
    pub incidents_reported: i64,
    pub average_user_satisfaction: Option<f64>,
    pub last_monitored_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelVersion {
    /// Create a new version in development status
    pub fn new(
        version_number: impl Into<String>,
        domain_ids: Vec<String>,
        trained_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            version_number: version_number.into(),
            name: None,
            description: None,
            domain_ids,
            training: None,
            performance: None,
            parameters: None,
            inference: None,
            changelog: None,
            compatibility: Compatibility::default(),
            status: VersionStatus::Development,
            release_date: None,
            sunset_date: None,
            distribution: None,
            trained_by: trained_by.into(),
            drift_score: None,
            incidents_reported: 0,
            average_user_satisfaction: None,
            last_monitored_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the training statistics
    pub fn with_training(mut self, training: TrainingStats) -> Self {
        self.training = Some(training);
        self
    }

    /// Set the model parameters
    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Set the changelog
    pub fn with_changelog(mut self, changelog: Changelog) -> Self {
        self.changelog = Some(changelog);
        self
    }

    /// Set the compatibility declaration
    pub fn with_compatibility(mut self, compatibility: Compatibility) -> Self {
        self.compatibility = compatibility;
        self
    }

    /// Set the distribution descriptors
    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }
}
