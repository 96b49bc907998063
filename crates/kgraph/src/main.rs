//! CLI entry point for kgraph.
//!
//! Property maps are read from stdin as JSON in their tagged form
//! (`{"name": {"type": "string", "value": "Alice"}}`); results are written
//! to stdout as JSON.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use kgraph::{EntityFilter, KnowledgeGraph, PropertyMap, PropertyValue, RelationQuery, Settings};
use kgraph_ontology::Ontology;

#[derive(Parser)]
#[command(name = "kgraph")]
#[command(about = "Ontology-governed knowledge graph over Neo4j or TerminusDB")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: kgraph).
    #[arg(short, long, default_value = "kgraph", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Load the hierarchy and data model and report what they declare.
    Check,
    /// Create an entity (properties from stdin).
    Create {
        #[arg(long)]
        kind: String,
        /// Use this identifier instead of allocating one.
        #[arg(long)]
        id: Option<String>,
    },
    /// Print an entity.
    Get {
        id: String,
        /// Read the state at this RFC 3339 instant instead of the current one.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Merge properties into an entity (properties from stdin).
    Update { id: String },
    /// Delete an entity.
    Delete {
        id: String,
        /// Remove physically instead of closing it out.
        #[arg(long)]
        hard: bool,
    },
    /// Create a relationship.
    Relate {
        relation_type: String,
        source: String,
        target: String,
        /// Relationship properties as tagged JSON.
        #[arg(long)]
        properties: Option<String>,
    },
    /// List relationships.
    Relations {
        #[arg(long)]
        relation_type: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        target: Option<String>,
    },
    /// Search entities of a kind and its descendants.
    Search {
        kind: String,
        /// `name=value` string equality, repeatable.
        #[arg(long = "eq")]
        equals: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    if let Command::Check = cli.command {
        let ontology = Ontology::load(
            &settings.ontology.hierarchy_path,
            &settings.ontology.data_model_path,
        )?;
        let report = serde_json::json!({
            "kinds": ontology.hierarchy().kinds().collect::<Vec<_>>(),
            "relations": ontology.model().relation_rules().count(),
        });
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    let graph = kgraph::connect(&settings).await?;
    run(&graph, cli.command).await
}

async fn run(graph: &KnowledgeGraph, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Check => {}
        Command::Create { kind, id } => {
            let properties = read_properties()?;
            let entity = match id {
                Some(id) => graph.create_entity_with_id(&id, &kind, &properties).await?,
                None => graph.create_entity(&kind, &properties).await?,
            };
            println!("{}", serde_json::to_string(&entity)?);
        }
        Command::Get { id, at } => {
            let entity = match at {
                Some(at) => graph.get_entity_at(&id, at).await?,
                None => graph.get_entity(&id).await?,
            };
            println!("{}", serde_json::to_string(&entity)?);
        }
        Command::Update { id } => {
            let properties = read_properties()?;
            let entity = graph.update_entity(&id, &properties).await?;
            println!("{}", serde_json::to_string(&entity)?);
        }
        Command::Delete { id, hard } => {
            let outcome = graph.delete_entity(&id, hard).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Command::Relate {
            relation_type,
            source,
            target,
            properties,
        } => {
            let properties: PropertyMap = match properties {
                Some(json) => serde_json::from_str(&json).context("invalid --properties")?,
                None => PropertyMap::new(),
            };
            let relationship = graph
                .create_relation(&relation_type, &source, &target, &properties)
                .await?;
            println!("{}", serde_json::to_string(&relationship)?);
        }
        Command::Relations {
            relation_type,
            source,
            target,
        } => {
            let query = RelationQuery {
                relation_type,
                source_id: source,
                target_id: target,
            };
            for relationship in graph.find_relations(&query).await? {
                println!("{}", serde_json::to_string(&relationship)?);
            }
        }
        Command::Search { kind, equals } => {
            let mut filter = EntityFilter::new();
            for condition in &equals {
                let (name, value) = condition
                    .split_once('=')
                    .with_context(|| format!("expected name=value, got {condition:?}"))?;
                filter = filter.eq(name, PropertyValue::from(value));
            }
            let mut cursor = graph.search(&kind, filter)?;
            while let Some(entity) = cursor.next().await? {
                println!("{}", serde_json::to_string(&entity)?);
            }
        }
    }
    Ok(())
}

fn read_properties() -> anyhow::Result<PropertyMap> {
    let input = std::io::read_to_string(std::io::stdin())?;
    if input.trim().is_empty() {
        return Ok(PropertyMap::new());
    }
    serde_json::from_str(&input).context("stdin is not a JSON property map")
}
