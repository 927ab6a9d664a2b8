//! Model version registry domain module
//!
//! Versioned snapshots of trained models, each referencing the domains
//! whose curated knowledge fed it. Versions move through a lifecycle
//! (development → beta → stable → deprecated → retired); promotion to
//! stable is transactional so that at most one stable version exists at
//! any time.

mod entity;
mod repository;
mod service;

pub use entity::{
    Changelog, Compatibility, CompatibilitySummary, Distribution, InferenceStats, ModelParameters,
    ModelVersion, MonitoringUpdate, PerformanceMetrics, TrainingStats, VersionStatus,
    VersionSummary,
};
pub use repository::{ModelVersionRepository, ModelVersionStats};
pub use service::ModelVersionService;
