//! Database migrations
//!
//! This module manages SQLite schema migrations for noesis.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 3;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Knowledge hierarchy and node store
const MIGRATION_V1: &str = r#"
    -- Domains table: top-level knowledge categories
    CREATE TABLE IF NOT EXISTS domains (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE CHECK (name IN ('cybersecurity', 'legal', 'audit', 'osint', 'finance', 'general')),
        description TEXT NOT NULL,
        icon TEXT NOT NULL DEFAULT '',
        color TEXT NOT NULL DEFAULT '#000000',
        priority INTEGER NOT NULL DEFAULT 5 CHECK (priority BETWEEN 1 AND 10),
        status TEXT NOT NULL DEFAULT 'development' CHECK (status IN ('development', 'beta', 'active', 'inactive')),
        total_nodes INTEGER NOT NULL DEFAULT 0,
        quality_score INTEGER NOT NULL DEFAULT 0 CHECK (quality_score BETWEEN 0 AND 100),
        last_model_update TIMESTAMP,
        metadata TEXT,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_domains_status_priority ON domains(status, priority DESC);

    -- Subdomains table: named subdivisions of a domain
    CREATE TABLE IF NOT EXISTS subdomains (
        id TEXT PRIMARY KEY NOT NULL,
        domain_id TEXT NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        slug TEXT NOT NULL,
        icon TEXT,
        display_order INTEGER NOT NULL DEFAULT 0,
        total_nodes INTEGER NOT NULL DEFAULT 0,
        validated_nodes INTEGER NOT NULL DEFAULT 0,
        quality_score INTEGER NOT NULL DEFAULT 0 CHECK (quality_score BETWEEN 0 AND 100),
        status TEXT NOT NULL DEFAULT 'development' CHECK (status IN ('development', 'beta', 'active', 'inactive')),
        last_ingestion_at TIMESTAMP,
        metadata TEXT,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        UNIQUE(domain_id, slug)
    );

    CREATE INDEX IF NOT EXISTS idx_subdomains_domain_id ON subdomains(domain_id);
    CREATE INDEX IF NOT EXISTS idx_subdomains_status_quality ON subdomains(status, quality_score DESC);

    -- Knowledge nodes: atomic knowledge units
    CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY NOT NULL,
        subdomain_id TEXT NOT NULL REFERENCES subdomains(id) ON DELETE CASCADE,
        category TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        summary TEXT NOT NULL,
        keywords TEXT NOT NULL DEFAULT '[]',
        examples TEXT NOT NULL DEFAULT '[]',
        related_node_ids TEXT NOT NULL DEFAULT '[]',
        content_type TEXT NOT NULL DEFAULT 'text' CHECK (content_type IN (
            'text', 'template', 'checklist', 'process', 'rule', 'pattern', 'definition', 'formula'
        )),
        structured_data TEXT,
        source TEXT,
        validation_status TEXT NOT NULL DEFAULT 'pending' CHECK (validation_status IN (
            'pending', 'needs_review', 'approved', 'rejected'
        )),
        validation_score INTEGER NOT NULL DEFAULT 0 CHECK (validation_score BETWEEN 0 AND 100),
        approved_by TEXT,
        approved_at TIMESTAMP,
        rejection_reason TEXT,
        effective_date TIMESTAMP NOT NULL,
        expiry_date TIMESTAMP,
        view_count INTEGER NOT NULL DEFAULT 0,
        usage_in_models INTEGER NOT NULL DEFAULT 0,
        feedback_score INTEGER NOT NULL DEFAULT 0 CHECK (feedback_score BETWEEN 0 AND 100),
        version INTEGER NOT NULL DEFAULT 1,
        metadata TEXT,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_nodes_subdomain_status ON nodes(subdomain_id, validation_status);
    CREATE INDEX IF NOT EXISTS idx_nodes_status_feedback ON nodes(validation_status, feedback_score DESC);
    CREATE INDEX IF NOT EXISTS idx_nodes_subdomain_title ON nodes(subdomain_id, title);
    CREATE INDEX IF NOT EXISTS idx_nodes_expiry_date ON nodes(expiry_date);
    CREATE INDEX IF NOT EXISTS idx_nodes_created_at ON nodes(created_at);

    -- Validation history: append-only, one row per validate call
    CREATE TABLE IF NOT EXISTS node_validations (
        id TEXT PRIMARY KEY NOT NULL,
        node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        validated_by TEXT NOT NULL,
        validated_at TIMESTAMP NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('pending', 'needs_review', 'approved', 'rejected')),
        score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
        comments TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_node_validations_node_id ON node_validations(node_id, validated_at);

    -- Feedback entries: append-only raw ratings
    CREATE TABLE IF NOT EXISTS node_feedback (
        id TEXT PRIMARY KEY NOT NULL,
        node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        rating REAL NOT NULL CHECK (rating BETWEEN 0 AND 5),
        comment TEXT,
        created_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_node_feedback_node_id ON node_feedback(node_id, created_at);

    -- Content revisions: archived snapshots, one per content update
    CREATE TABLE IF NOT EXISTS node_revisions (
        id TEXT PRIMARY KEY NOT NULL,
        node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        version INTEGER NOT NULL,
        content TEXT NOT NULL,
        modified_by TEXT NOT NULL,
        modified_at TIMESTAMP NOT NULL,
        UNIQUE(node_id, version)
    );

    CREATE INDEX IF NOT EXISTS idx_node_revisions_node_id ON node_revisions(node_id, version);
"#;

/// Migration 2: Relationship graph
///
/// Edges are first-class records with two indexed foreign keys, queryable
/// from either endpoint, rather than adjacency lists embedded in nodes.
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS graph_edges (
        id TEXT PRIMARY KEY NOT NULL,
        source_node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        target_node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        relationship_type TEXT NOT NULL CHECK (relationship_type IN (
            'related_to', 'prerequisite_of', 'extends', 'contradicts', 'similar_to',
            'case_study_of', 'implements', 'references', 'depends_on'
        )),
        weight REAL NOT NULL DEFAULT 0.5 CHECK (weight BETWEEN 0.0 AND 1.0),
        confidence INTEGER NOT NULL DEFAULT 50 CHECK (confidence BETWEEN 0 AND 100),
        context TEXT,
        bidirectional INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive', 'deprecated')),
        created_by TEXT,
        reasoning TEXT,
        evidence TEXT NOT NULL DEFAULT '[]',
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_graph_edges_source_type ON graph_edges(source_node_id, relationship_type);
    CREATE INDEX IF NOT EXISTS idx_graph_edges_target_type ON graph_edges(target_node_id, relationship_type);
    CREATE INDEX IF NOT EXISTS idx_graph_edges_weight ON graph_edges(weight DESC, confidence DESC);
"#;

/// Migration 3: Ingestion records and model version registry
const MIGRATION_V3: &str = r#"
    -- Ingestion records: one row per batch-intake run
    CREATE TABLE IF NOT EXISTS ingestion_records (
        id TEXT PRIMARY KEY NOT NULL,
        domain_id TEXT NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
        subdomain_id TEXT REFERENCES subdomains(id) ON DELETE SET NULL,
        ingestion_type TEXT NOT NULL CHECK (ingestion_type IN (
            'manual', 'bulk_upload', 'api', 'web_scraping', 'database_sync', 'import'
        )),
        source TEXT,
        node_ids TEXT NOT NULL DEFAULT '[]',
        nodes_total INTEGER NOT NULL DEFAULT 0,
        nodes_successful INTEGER NOT NULL DEFAULT 0,
        nodes_failed INTEGER NOT NULL DEFAULT 0,
        nodes_skipped INTEGER NOT NULL DEFAULT 0,
        validation_passed INTEGER NOT NULL DEFAULT 0,
        validation_failed INTEGER NOT NULL DEFAULT 0,
        validation_errors TEXT NOT NULL DEFAULT '[]',
        duplicates_found INTEGER NOT NULL DEFAULT 0,
        requires_retraining INTEGER NOT NULL DEFAULT 0,
        estimated_impact TEXT CHECK (estimated_impact IN ('low', 'medium', 'high')),
        status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN (
            'pending', 'in_progress', 'completed', 'failed', 'partially_failed'
        )),
        executed_by TEXT NOT NULL,
        started_at TIMESTAMP NOT NULL,
        ended_at TIMESTAMP,
        duration_seconds INTEGER,
        logs TEXT NOT NULL DEFAULT '[]',
        before_total_nodes INTEGER,
        before_quality_score INTEGER,
        after_total_nodes INTEGER,
        after_quality_score INTEGER,
        delta_nodes INTEGER,
        delta_quality_score INTEGER,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_ingestion_records_domain ON ingestion_records(domain_id, created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_ingestion_records_status ON ingestion_records(status, created_at DESC);

    -- Model versions: versioned snapshots referencing domains
    CREATE TABLE IF NOT EXISTS model_versions (
        id TEXT PRIMARY KEY NOT NULL,
        version_number TEXT NOT NULL UNIQUE,
        name TEXT,
        description TEXT,
        domain_ids TEXT NOT NULL DEFAULT '[]',
        training TEXT,
        accuracy REAL,
        precision REAL,
        recall REAL,
        f1_score REAL,
        parameters TEXT,
        average_latency_ms REAL,
        tokens_per_second REAL,
        memory_required_gb REAL,
        inference_extras TEXT,
        changelog TEXT,
        previous_version TEXT,
        breaking_changes INTEGER NOT NULL DEFAULT 0,
        breaking_changes_list TEXT NOT NULL DEFAULT '[]',
        rollback_supported INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'development' CHECK (status IN (
            'development', 'beta', 'stable', 'deprecated', 'retired'
        )),
        release_date TIMESTAMP,
        sunset_date TIMESTAMP,
        distribution TEXT,
        trained_by TEXT NOT NULL,
        drift_score REAL,
        incidents_reported INTEGER NOT NULL DEFAULT 0,
        user_satisfaction REAL,
        last_monitored_at TIMESTAMP,
        metadata TEXT,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_model_versions_status ON model_versions(status, release_date DESC);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    // Get the latest version
    let row: Option<(i32,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Knowledge hierarchy and node store");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Relationship graph");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    if current_version < 3 {
        tracing::info!("Applying migration v3: Ingestion records and model versions");
        sqlx::raw_sql(MIGRATION_V3).execute(pool).await?;
        record_migration(pool, 3).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}
