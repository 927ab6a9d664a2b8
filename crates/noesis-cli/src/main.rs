//! Noesis CLI - curated-knowledge graph store

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use noesis_core::config::Config;
use noesis_core::domain::LifecycleStatus;
use noesis_core::domain::graph::{GraphService, KnowledgeEdge, RelationshipType};
use noesis_core::domain::hierarchy::{Domain, DomainName, HierarchyService, Subdomain};
use noesis_core::domain::ingestion::{CandidateNode, IngestionService, IngestionType};
use noesis_core::domain::model_version::{
    ModelVersion, ModelVersionService, PerformanceMetrics, VersionStatus,
};
use noesis_core::domain::node::{NodeFilter, NodeService, ValidationInput, ValidationStatus};
use noesis_core::infrastructure::graph::SqliteGraphRepository;
use noesis_core::infrastructure::hierarchy::SqliteHierarchyRepository;
use noesis_core::infrastructure::ingestion::SqliteIngestionRepository;
use noesis_core::infrastructure::model_version::SqliteModelVersionRepository;
use noesis_core::infrastructure::node::SqliteNodeRepository;
use noesis_core::storage::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "noesis")]
#[command(author, version, about = "Curated-knowledge graph store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Database file path (defaults to the configured location)
    #[arg(long, global = true)]
    database: Option<std::path::PathBuf>,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage knowledge domains
    Domains {
        #[command(subcommand)]
        action: DomainAction,
    },

    /// Manage subdomains
    Subdomains {
        #[command(subcommand)]
        action: SubdomainAction,
    },

    /// Manage knowledge nodes
    Nodes {
        #[command(subcommand)]
        action: NodeAction,
    },

    /// Manage the relationship graph
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Run and inspect ingestion batches
    Ingest {
        #[command(subcommand)]
        action: IngestAction,
    },

    /// Manage model versions
    Models {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum DomainAction {
    /// Create a domain
    Create {
        /// Domain name (cybersecurity, legal, audit, osint, finance, general)
        name: String,
        /// Description
        #[arg(short, long)]
        description: String,
        /// Priority (1-10)
        #[arg(short, long, default_value_t = 5)]
        priority: u8,
    },
    /// List domains
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show one domain
    Show { id: String },
    /// Recompute cached counters and quality score
    Recompute { id: String },
}

#[derive(Subcommand)]
enum SubdomainAction {
    /// Create a subdomain under a domain
    Create {
        domain_id: String,
        name: String,
        /// URL-friendly slug, unique within the domain
        #[arg(short, long)]
        slug: String,
    },
    /// List subdomains of a domain
    List { domain_id: String },
    /// Show live node statistics
    Stats { id: String },
    /// Recompute cached counters and quality score
    Recompute { id: String },
}

#[derive(Subcommand)]
enum NodeAction {
    /// Create a node
    Create {
        subdomain_id: String,
        title: String,
        #[arg(short, long)]
        category: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        summary: String,
        /// Comma-separated keywords
        #[arg(short, long)]
        keywords: Option<String>,
        #[arg(long, default_value = "cli")]
        created_by: String,
    },
    /// Show a node
    Show { id: String },
    /// List nodes of a subdomain
    List {
        subdomain_id: String,
        /// Filter by validation status
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Record a validation outcome
    Validate {
        id: String,
        /// Outcome (pending, needs_review, approved, rejected)
        status: String,
        #[arg(short, long)]
        score: i64,
        #[arg(short, long)]
        comments: Option<String>,
        #[arg(long, default_value = "cli")]
        validated_by: String,
    },
    /// Replace a node's content, archiving the prior version
    UpdateContent {
        id: String,
        content: String,
        #[arg(long, default_value = "cli")]
        modified_by: String,
    },
    /// Add a feedback rating (0-5)
    Feedback {
        id: String,
        rating: f64,
        #[arg(short, long)]
        comment: Option<String>,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Keyword search over approved nodes
    Search {
        /// Comma-separated keywords
        keywords: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Nodes expiring within N days
    Expiring {
        #[arg(default_value_t = 30)]
        days: i64,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Create an edge between two nodes
    Link {
        source: String,
        target: String,
        /// Relationship type (related_to, prerequisite_of, extends, ...)
        relationship: String,
        #[arg(short, long, default_value_t = 0.5)]
        weight: f64,
        #[arg(short, long, default_value_t = 50)]
        confidence: i64,
        /// Traversable in both directions
        #[arg(long)]
        bidirectional: bool,
    },
    /// Find a shortest path between two nodes
    Path {
        source: String,
        target: String,
        #[arg(short, long, default_value_t = 5)]
        max_depth: usize,
    },
    /// Nodes similar to a node
    Similar {
        id: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Nodes depending on a node as a prerequisite
    Dependents {
        id: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Deactivate an edge
    Deactivate { edge_id: String },
    /// Aggregate edge statistics
    Stats,
}

#[derive(Subcommand)]
enum IngestAction {
    /// Open an ingestion run
    Open {
        domain_id: String,
        #[arg(short, long)]
        subdomain_id: Option<String>,
        /// Ingestion type (manual, bulk_upload, api, web_scraping, database_sync, import)
        #[arg(short, long, default_value = "manual")]
        ingestion_type: String,
        #[arg(long, default_value = "cli")]
        executed_by: String,
    },
    /// Process a batch of candidates from a JSON file
    Batch {
        ingestion_id: String,
        subdomain_id: String,
        /// Path to a JSON array of candidate nodes
        file: std::path::PathBuf,
        #[arg(long, default_value = "cli")]
        executed_by: String,
    },
    /// Complete an ingestion run
    Complete { ingestion_id: String },
    /// Mark an ingestion run as failed
    Fail {
        ingestion_id: String,
        message: String,
    },
    /// Ingestion history for a domain
    History {
        domain_id: String,
        /// Page size (defaults to the configured history limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Aggregate ingestion statistics for a domain
    Stats { domain_id: String },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Register a model version
    Create {
        version: String,
        /// Comma-separated domain ids
        #[arg(short, long)]
        domains: Option<String>,
        #[arg(long, default_value = "cli")]
        trained_by: String,
    },
    /// List versions
    List {
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show the current stable version
    Stable,
    /// Release history, newest first
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Promote a version to stable
    Promote { version: String },
    /// Record performance metrics
    Performance {
        version: String,
        #[arg(long)]
        accuracy: f64,
        #[arg(long)]
        precision: Option<f64>,
        #[arg(long)]
        recall: Option<f64>,
        #[arg(long)]
        f1: Option<f64>,
    },
    /// Compatibility summary between two versions
    Compatibility { from: String, to: String },
    /// Aggregate statistics across versions
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("noesis=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    let db_config = match cli.database.clone().or(config.database.path.clone()) {
        Some(path) => DatabaseConfig::with_path(path),
        None => DatabaseConfig::default(),
    }
    .max_connections(config.database.max_connections);

    let db = Database::new(db_config).await?;
    let pool = db.pool().clone();

    let hierarchy = Arc::new(SqliteHierarchyRepository::new(pool.clone()));
    let nodes = Arc::new(SqliteNodeRepository::new(pool.clone()));
    let graph = Arc::new(SqliteGraphRepository::new(pool.clone()));
    let ingestions = Arc::new(SqliteIngestionRepository::new(pool.clone()));
    let models = Arc::new(SqliteModelVersionRepository::new(pool));

    let hierarchy_service = HierarchyService::new(hierarchy.clone());
    let node_service = NodeService::new(nodes.clone());
    let graph_service = GraphService::new(graph);
    let ingestion_service = IngestionService::new(ingestions, nodes, hierarchy);
    let model_service = ModelVersionService::new(models);

    let format = cli.format;

    match cli.command {
        Commands::Domains { action } => match action {
            DomainAction::Create {
                name,
                description,
                priority,
            } => {
                let name = DomainName::parse(&name)
                    .with_context(|| format!("Unknown domain name '{}'", name))?;
                let domain = hierarchy_service
                    .create_domain(Domain::new(name, description).with_priority(priority))
                    .await?;
                print_value(format, &domain, |d| {
                    format!("Created domain {} ({})", d.name, d.id)
                });
            }
            DomainAction::List { status } => {
                let status = parse_lifecycle(status.as_deref())?;
                let domains = hierarchy_service.list_domains(status, None).await?;
                print_value(format, &domains, |ds| {
                    ds.iter()
                        .map(|d| {
                            format!(
                                "{}  {:<14} priority={} nodes={} quality={} [{}]",
                                d.id, d.name, d.priority, d.total_nodes, d.quality_score, d.status
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                });
            }
            DomainAction::Show { id } => {
                let domain = hierarchy_service.get_domain(&id).await?;
                print_value(format, &domain, |d| format!("{:#?}", d));
            }
            DomainAction::Recompute { id } => {
                let counts = hierarchy_service.recompute_domain_counters(&id).await?;
                let quality = hierarchy_service.recompute_domain_quality(&id).await?;
                println!(
                    "Recomputed: total_nodes={} validated={} quality_score={}",
                    counts.total, counts.validated, quality
                );
            }
        },

        Commands::Subdomains { action } => match action {
            SubdomainAction::Create {
                domain_id,
                name,
                slug,
            } => {
                let subdomain = hierarchy_service
                    .create_subdomain(Subdomain::new(domain_id, name, slug))
                    .await?;
                print_value(format, &subdomain, |s| {
                    format!("Created subdomain {} ({})", s.slug, s.id)
                });
            }
            SubdomainAction::List { domain_id } => {
                let subdomains = hierarchy_service.list_subdomains(&domain_id, None).await?;
                print_value(format, &subdomains, |ss| {
                    ss.iter()
                        .map(|s| {
                            format!(
                                "{}  {:<20} nodes={}/{} quality={} [{}]",
                                s.id, s.slug, s.validated_nodes, s.total_nodes, s.quality_score, s.status
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                });
            }
            SubdomainAction::Stats { id } => {
                let stats = hierarchy_service.subdomain_stats(&id).await?;
                println!(
                    "total={} validated={} pending={} rejected={} validation_rate={:.1}% quality={}",
                    stats.total,
                    stats.validated,
                    stats.pending,
                    stats.rejected,
                    stats.validation_rate,
                    stats.quality_score
                );
            }
            SubdomainAction::Recompute { id } => {
                let counts = hierarchy_service.recompute_subdomain_counters(&id).await?;
                let quality = hierarchy_service.recompute_subdomain_quality(&id).await?;
                println!(
                    "Recomputed: total_nodes={} validated={} quality_score={}",
                    counts.total, counts.validated, quality
                );
            }
        },

        Commands::Nodes { action } => match action {
            NodeAction::Create {
                subdomain_id,
                title,
                category,
                content,
                summary,
                keywords,
                created_by,
            } => {
                let mut node = noesis_core::domain::node::KnowledgeNode::new(
                    subdomain_id,
                    category,
                    title,
                    content,
                    summary,
                    created_by,
                );
                if let Some(keywords) = keywords {
                    node = node.with_keywords(split_csv(&keywords));
                }
                let node = node_service.create_node(node).await?;
                print_value(format, &node, |n| format!("Created node {} ({})", n.title, n.id));
            }
            NodeAction::Show { id } => {
                let node = node_service.get_node(&id).await?;
                node_service.record_view(&id).await?;
                print_value(format, &node, |n| format!("{:#?}", n));
            }
            NodeAction::List {
                subdomain_id,
                status,
            } => {
                let filter = NodeFilter {
                    status: status
                        .as_deref()
                        .map(|s| {
                            ValidationStatus::parse(s)
                                .with_context(|| format!("Unknown validation status '{}'", s))
                        })
                        .transpose()?,
                    ..Default::default()
                };
                let nodes = node_service.list_nodes(&subdomain_id, filter).await?;
                print_value(format, &nodes, |ns| {
                    ns.iter()
                        .map(|n| {
                            format!(
                                "{}  {:<40} [{}] score={} v{}",
                                n.id, n.title, n.validation.status, n.feedback_score, n.version
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                });
            }
            NodeAction::Validate {
                id,
                status,
                score,
                comments,
                validated_by,
            } => {
                let status = ValidationStatus::parse(&status)
                    .with_context(|| format!("Unknown validation status '{}'", status))?;
                let node = node_service
                    .validate_node(
                        &id,
                        ValidationInput {
                            status,
                            score,
                            comments,
                            validated_by,
                        },
                    )
                    .await?;
                println!(
                    "Node {} is now {} (score {})",
                    node.id, node.validation.status, node.validation.score
                );
            }
            NodeAction::UpdateContent {
                id,
                content,
                modified_by,
            } => {
                let node = node_service.update_content(&id, &content, &modified_by).await?;
                println!("Node {} now at version {}", node.id, node.version);
            }
            NodeAction::Feedback {
                id,
                rating,
                comment,
                user,
            } => {
                let score = node_service.add_feedback(&id, &user, rating, comment).await?;
                println!("Feedback recorded; node score is now {}", score);
            }
            NodeAction::Search { keywords, limit } => {
                let results = node_service
                    .search_by_keywords(&split_csv(&keywords), limit)
                    .await?;
                for hit in results {
                    println!(
                        "{:.2}  {}  {}",
                        hit.relevance, hit.node.id, hit.node.title
                    );
                }
            }
            NodeAction::Expiring { days } => {
                let nodes = node_service.expiring_nodes(days).await?;
                for node in nodes {
                    println!(
                        "{}  {}  expires {}",
                        node.id,
                        node.title,
                        node.expiry_date.map(|d| d.to_rfc3339()).unwrap_or_default()
                    );
                }
            }
        },

        Commands::Graph { action } => match action {
            GraphAction::Link {
                source,
                target,
                relationship,
                weight,
                confidence,
                bidirectional,
            } => {
                let relationship = RelationshipType::parse(&relationship)
                    .with_context(|| format!("Unknown relationship type '{}'", relationship))?;
                let mut edge = KnowledgeEdge::new(source, target, relationship)
                    .with_weight(weight)
                    .with_confidence(confidence)
                    .with_created_by("cli");
                if bidirectional {
                    edge = edge.bidirectional();
                }
                let edge = graph_service.create_edge(edge).await?;
                println!("Created edge {} ({})", edge.id, edge.relationship_type);
            }
            GraphAction::Path {
                source,
                target,
                max_depth,
            } => {
                let result = graph_service
                    .find_path(&source, &target, Some(max_depth))
                    .await?;
                match result.path() {
                    Some(path) => println!("{}", path.join(" -> ")),
                    None => println!("No path found"),
                }
            }
            GraphAction::Similar { id, limit } => {
                let nodes = graph_service.similar_nodes(&id, limit).await?;
                for node in nodes {
                    println!("{}  {}", node.id, node.title);
                }
            }
            GraphAction::Dependents { id, limit } => {
                let nodes = graph_service.dependent_nodes(&id, limit).await?;
                for node in nodes {
                    println!("{}  {}", node.id, node.title);
                }
            }
            GraphAction::Deactivate { edge_id } => {
                graph_service.deactivate_edge(&edge_id).await?;
                println!("Edge {} deactivated", edge_id);
            }
            GraphAction::Stats => {
                let stats = graph_service.stats().await?;
                println!(
                    "edges={} avg_weight={:.2} avg_confidence={:.1}",
                    stats.total_edges, stats.average_weight, stats.average_confidence
                );
                for (relationship, count) in stats.by_type {
                    println!("  {:<16} {}", relationship, count);
                }
            }
        },

        Commands::Ingest { action } => match action {
            IngestAction::Open {
                domain_id,
                subdomain_id,
                ingestion_type,
                executed_by,
            } => {
                let ingestion_type = IngestionType::parse(&ingestion_type)
                    .with_context(|| format!("Unknown ingestion type '{}'", ingestion_type))?;
                let record = ingestion_service
                    .open(&domain_id, subdomain_id, ingestion_type, None, &executed_by)
                    .await?;
                println!("Opened ingestion {}", record.id);
            }
            IngestAction::Batch {
                ingestion_id,
                subdomain_id,
                file,
                executed_by,
            } => {
                let contents = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let candidates: Vec<CandidateNode> = serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse {}", file.display()))?;
                let outcome = ingestion_service
                    .process_batch(&ingestion_id, &subdomain_id, &candidates, &executed_by)
                    .await?;
                println!(
                    "successful={} failed={} skipped={}",
                    outcome.successful, outcome.failed, outcome.skipped
                );
                for error in outcome.errors {
                    println!("  {}", error);
                }
            }
            IngestAction::Complete { ingestion_id } => {
                let record = ingestion_service.complete(&ingestion_id).await?;
                println!(
                    "Completed: {} nodes (+{}), retraining={}",
                    record.processed.successful,
                    record.delta_nodes.unwrap_or(0),
                    record.requires_retraining
                );
            }
            IngestAction::Fail {
                ingestion_id,
                message,
            } => {
                ingestion_service.fail(&ingestion_id, &message).await?;
                println!("Ingestion {} marked failed", ingestion_id);
            }
            IngestAction::History { domain_id, limit } => {
                let limit = limit.unwrap_or(config.ingestion.history_limit);
                let records = ingestion_service.history(&domain_id, limit).await?;
                for record in records {
                    println!(
                        "{}  {:<14} [{}] total={} ok={} failed={} skipped={}",
                        record.id,
                        record.ingestion_type,
                        record.status,
                        record.processed.total,
                        record.processed.successful,
                        record.processed.failed,
                        record.processed.skipped
                    );
                }
            }
            IngestAction::Stats { domain_id } => {
                let stats = ingestion_service.stats(&domain_id).await?;
                println!(
                    "runs={} completed={} failed={} success_rate={:.1}% nodes_ingested={}",
                    stats.total,
                    stats.completed,
                    stats.failed,
                    stats.success_rate,
                    stats.total_nodes_ingested
                );
                for (ingestion_type, count) in stats.by_type {
                    println!("  {:<14} {}", ingestion_type, count);
                }
            }
        },

        Commands::Models { action } => match action {
            ModelAction::Create {
                version,
                domains,
                trained_by,
            } => {
                let domain_ids = domains.map(|d| split_csv(&d)).unwrap_or_default();
                let version = model_service
                    .create_version(ModelVersion::new(version, domain_ids, trained_by))
                    .await?;
                println!("Created model version {}", version.version_number);
            }
            ModelAction::List { status, limit } => {
                let status = status
                    .as_deref()
                    .map(|s| {
                        VersionStatus::parse(s)
                            .with_context(|| format!("Unknown version status '{}'", s))
                    })
                    .transpose()?;
                let versions = model_service.list_versions(status, limit).await?;
                for version in versions {
                    println!(
                        "{:<12} [{}] accuracy={} released={}",
                        version.version_number,
                        version.status,
                        version
                            .performance
                            .as_ref()
                            .map(|p| p.accuracy.to_string())
                            .unwrap_or_else(|| "-".into()),
                        version
                            .release_date
                            .map(|d| d.to_rfc3339())
                            .unwrap_or_else(|| "-".into())
                    );
                }
            }
            ModelAction::Stable => match model_service.stable_version().await? {
                Some(version) => println!("{}", version.version_number),
                None => println!("No stable version"),
            },
            ModelAction::History { limit } => {
                let history = model_service.version_history(limit).await?;
                for entry in history {
                    println!(
                        "{:<12} [{}] {} released={}",
                        entry.version_number,
                        entry.status,
                        entry.name.as_deref().unwrap_or("-"),
                        entry
                            .release_date
                            .map(|d| d.to_rfc3339())
                            .unwrap_or_else(|| "-".into())
                    );
                }
            }
            ModelAction::Promote { version } => {
                let promoted = model_service.promote_to_stable(&version).await?;
                println!(
                    "{} is now stable (released {})",
                    promoted.version_number,
                    promoted
                        .release_date
                        .map(|d| d.to_rfc3339())
                        .unwrap_or_default()
                );
            }
            ModelAction::Performance {
                version,
                accuracy,
                precision,
                recall,
                f1,
            } => {
                model_service
                    .record_performance(
                        &version,
                        PerformanceMetrics {
                            accuracy,
                            precision,
                            recall,
                            f1_score: f1,
                        },
                    )
                    .await?;
                println!("Recorded performance for {}", version);
            }
            ModelAction::Compatibility { from, to } => {
                let summary = model_service.compatibility(&from, &to).await?;
                println!(
                    "breaking_changes={} rollback_supported={}",
                    summary.breaking_changes, summary.rollback_supported
                );
                for change in summary.breaking_changes_list {
                    println!("  {}", change);
                }
            }
            ModelAction::Stats => {
                let stats = model_service.stats().await?;
                println!(
                    "versions={} avg_accuracy={:.1} avg_latency_ms={:.1}",
                    stats.total, stats.average_accuracy, stats.average_latency_ms
                );
                for (status, count) in stats.by_status {
                    println!("  {:<12} {}", status, count);
                }
            }
        },

        Commands::Doctor => {
            db.health_check().await?;
            let status = db.migration_status().await?;
            println!(
                "Database OK at {} (schema v{}/{})",
                db.path().display(),
                status.current_version,
                status.target_version
            );
        }
    }

    Ok(())
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_lifecycle(s: Option<&str>) -> anyhow::Result<Option<LifecycleStatus>> {
    s.map(|s| {
        LifecycleStatus::parse(s)
            .ok_or_else(|| anyhow::anyhow!("Unknown lifecycle status '{}'", s))
    })
    .transpose()
}

fn print_value<T: serde::Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T) -> String,
) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).unwrap_or_default())
        }
        OutputFormat::Text => println!("{}", text(value)),
    }
}
