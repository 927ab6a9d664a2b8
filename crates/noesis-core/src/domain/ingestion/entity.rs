//! Ingestion record entity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::node::{ContentType, SourceInfo};

/// How a batch of knowledge entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionType {
    Manual,
    BulkUpload,
    Api,
    WebScraping,
    DatabaseSync,
    Import,
}

impl IngestionType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::BulkUpload => "bulk_upload",
            Self::Api => "api",
            Self::WebScraping => "web_scraping",
            Self::DatabaseSync => "database_sync",
            Self::Import => "import",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "bulk_upload" | "bulkupload" => Some(Self::BulkUpload),
            "api" => Some(Self::Api),
            "web_scraping" | "webscraping" => Some(Self::WebScraping),
            "database_sync" | "databasesync" => Some(Self::DatabaseSync),
            "import" => Some(Self::Import),
            _ => None,
        }
    }

    /// Get all ingestion types
    pub fn all() -> &'static [IngestionType] {
        &[
            Self::Manual,
            Self::BulkUpload,
            Self::Api,
            Self::WebScraping,
            Self::DatabaseSync,
            Self::Import,
        ]
    }
}

impl std::fmt::Display for IngestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    PartiallyFailed,
}

impl IngestionStatus {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PartiallyFailed => "partially_failed",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "inprogress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "partially_failed" | "partiallyfailed" => Some(Self::PartiallyFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Expected impact on the model of an ingested volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedImpact {
    Low,
    Medium,
    High,
}

impl EstimatedImpact {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One timestamped entry in an ingestion run's structured log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl IngestionLogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: message.into(),
            details: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Warning,
            message: message.into(),
            details: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message: message.into(),
            details: None,
        }
    }

    /// Attach a structured payload
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Descriptor of the external source a batch came from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: Option<String>,
    pub url: Option<String>,
    /// Data format (JSON, CSV, XML, PDF, ...)
    pub format: Option<String>,
    pub record_count: Option<i64>,
}

/// Processing counters for an ingestion run
///
/// `total` equals successful + failed + skipped at completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedCounts {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub skipped: i64,
}

/// Domain metric snapshot taken before/after an ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_nodes: i64,
    pub quality_score: i64,
}

/// A candidate node submitted to the ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateNode {
    pub category: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    pub content_type: Option<ContentType>,
    pub source: Option<SourceInfo>,
}

impl CandidateNode {
    /// Basic field validation; returns the first problem found
    pub fn validate(&self) -> Option<String> {
        for (field, value) in [
            ("category", &self.category),
            ("title", &self.title),
            ("content", &self.content),
            ("summary", &self.summary),
        ] {
            if value.trim().is_empty() {
                return Some(format!("'{}': missing {}", self.title, field));
            }
        }
        None
    }
}

/// Outcome of processing one batch
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub successful: i64,
    pub failed: i64,
    pub skipped: i64,
    /// Ids of the nodes created by this batch, in submission order
    pub node_ids: Vec<String>,
    pub errors: Vec<String>,
}

/// Bookkeeping record for one batch-intake run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub id: String,
    pub domain_id: String,
    pub subdomain_id: Option<String>,
    pub ingestion_type: IngestionType,
    pub source: Option<SourceDescriptor>,
    /// Ids of all nodes produced across the run's batches
    pub node_ids: Vec<String>,
    pub processed: ProcessedCounts,
    pub validation_passed: i64,
    pub validation_failed: i64,
    pub validation_errors: Vec<String>,
    pub duplicates_found: i64,
    pub requires_retraining: bool,
    pub estimated_impact: Option<EstimatedImpact>,
    pub status: IngestionStatus,
    pub executed_by: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub logs: Vec<IngestionLogEntry>,
    pub before: Option<MetricsSnapshot>,
    pub after: Option<MetricsSnapshot>,
    pub delta_nodes: Option<i64>,
    pub delta_quality_score: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionRecord {
    /// Open a new pending record with zeroed counters
    pub fn new(
        domain_id: impl Into<String>,
        subdomain_id: Option<String>,
        ingestion_type: IngestionType,
        executed_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            domain_id: domain_id.into(),
            subdomain_id,
            ingestion_type,
            source: None,
            node_ids: Vec::new(),
            processed: ProcessedCounts::default(),
            validation_passed: 0,
            validation_failed: 0,
            validation_errors: Vec::new(),
            duplicates_found: 0,
            requires_retraining: false,
            estimated_impact: None,
            status: IngestionStatus::Pending,
            executed_by: executed_by.into(),
            started_at: now,
            ended_at: None,
            duration_seconds: None,
            logs: Vec::new(),
            before: None,
            after: None,
            delta_nodes: None,
            delta_quality_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the source descriptor
    pub fn with_source(mut self, source: SourceDescriptor) -> Self {
        self.source = Some(source);
        self
    }

    /// Append a log entry
    pub fn log(&mut self, entry: IngestionLogEntry) {
        self.logs.push(entry);
        self.updated_at = Utc::now();
    }

    /// Fold one batch outcome into the run's accumulated counters
    pub fn absorb_batch(&mut self, batch_size: i64, outcome: &BatchOutcome) {
        self.node_ids.extend(outcome.node_ids.iter().cloned());
        self.processed.total += batch_size;
        self.processed.successful += outcome.successful;
        self.processed.failed += outcome.failed;
        self.processed.skipped += outcome.skipped;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation_defaults() {
        let record = IngestionRecord::new("domain-1", None, IngestionType::BulkUpload, "operator");

        assert_eq!(record.status, IngestionStatus::Pending);
        assert_eq!(record.processed, ProcessedCounts::default());
        assert!(record.node_ids.is_empty());
        assert!(!record.requires_retraining);
        assert!(record.ended_at.is_none());
    }

    #[test]
    fn test_ingestion_type_round_trip() {
        for it in IngestionType::all() {
            assert_eq!(IngestionType::parse(it.as_str()), Some(*it));
        }
        assert_eq!(IngestionType::all().len(), 6);
        assert_eq!(IngestionType::parse("carrier_pigeon"), None);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(IngestionStatus::parse("in_progress"), Some(IngestionStatus::InProgress));
        assert_eq!(
            IngestionStatus::parse("partially_failed"),
            Some(IngestionStatus::PartiallyFailed)
        );
        assert_eq!(IngestionStatus::parse("done"), None);
    }

    #[test]
    fn test_absorb_batch_accumulates() {
        let mut record = IngestionRecord::new("d", None, IngestionType::Api, "op");

        let outcome = BatchOutcome {
            successful: 2,
            failed: 0,
            skipped: 1,
            node_ids: vec!["n1".into(), "n2".into()],
            errors: vec!["duplicate: x".into()],
        };
        record.absorb_batch(3, &outcome);
        record.absorb_batch(3, &outcome);

        assert_eq!(record.processed.total, 6);
        assert_eq!(record.processed.successful, 4);
        assert_eq!(record.processed.skipped, 2);
        assert_eq!(record.node_ids.len(), 4);
        assert_eq!(
            record.processed.total,
            record.processed.successful + record.processed.failed + record.processed.skipped
        );
    }

    #[test]
    fn test_candidate_validation() {
        let good = CandidateNode {
            category: "Technique".into(),
            title: "T".into(),
            content: "C".into(),
            summary: "S".into(),
            keywords: vec![],
            examples: vec![],
            content_type: None,
            source: None,
        };
        assert!(good.validate().is_none());

        let mut bad = good.clone();
        bad.summary = "".into();
        assert!(bad.validate().is_some());
    }

    #[test]
    fn test_log_entry_builders() {
        let entry = IngestionLogEntry::warning("slow source")
            .with_details(serde_json::json!({"latency_ms": 1200}));
        assert_eq!(entry.level, LogLevel::Warning);
        assert!(entry.details.is_some());
    }
}
