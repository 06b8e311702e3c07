//! Knowgraph command-line interface
//!
//! Each invocation restores the last checkpoint, runs one command and
//! checkpoints again when the command changed the graph.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{ContentArrangement, Table};
use knowgraph::graph::{Node, PropertyMap, PropertyValue, RelKey, RelType, Relationship};
use knowgraph::loader::{NODE_TEMPLATE, RELATIONSHIP_TEMPLATE};
use knowgraph::{EngineConfig, GraphDb, InitMode, NodeId};
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser)]
#[command(name = "knowgraph", version, about = "Knowgraph property graph engine")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "KNOWGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides the configuration file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the whole graph
    Graph,
    /// Node, relationship and label counts
    Stats,
    /// Search node names (case-insensitive substring) and ids
    Search { query: String },
    /// Shortest directed path between two nodes (ID or name)
    Path {
        start: String,
        end: String,
        /// Only follow relationships of this type
        #[arg(long = "type")]
        rel_type: Option<String>,
    },
    /// Node operations
    #[command(subcommand)]
    Node(NodeCommand),
    /// Label operations
    #[command(subcommand)]
    Label(LabelCommand),
    /// Relationship operations
    #[command(subcommand)]
    Rel(RelCommand),
    /// Property operations
    #[command(subcommand)]
    Prop(PropCommand),
    /// Bulk import CSV files
    Import {
        #[arg(long)]
        nodes: Option<PathBuf>,
        #[arg(long)]
        relationships: Option<PathBuf>,
        /// Clear the graph first
        #[arg(long)]
        replace: bool,
    },
    /// Export the graph as import-compatible CSV files
    Export {
        #[arg(long)]
        nodes: PathBuf,
        #[arg(long)]
        relationships: PathBuf,
    },
    /// Print an example import file
    Template { kind: TemplateKind },
    /// Checkpoint the current graph
    Save,
    /// Reset the graph. Unsaved changes are lost.
    Init {
        /// Start from an empty graph instead of the last checkpoint
        #[arg(long, conflicts_with = "baseline")]
        empty: bool,
        /// Restore the configured baseline files, ignoring the checkpoint
        #[arg(long)]
        baseline: bool,
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum NodeCommand {
    Get { node: String },
    Create {
        name: String,
        #[arg(long = "label", required = true)]
        labels: Vec<String>,
        /// key=value, repeatable
        #[arg(long = "prop")]
        props: Vec<String>,
    },
    Update { node: String, name: String },
    Delete { node: String },
}

#[derive(Subcommand)]
enum LabelCommand {
    Add { node: String, label: String },
    Remove { node: String, label: String },
}

#[derive(Subcommand)]
enum RelCommand {
    Create {
        source: String,
        target: String,
        rel_type: String,
        #[arg(long = "prop")]
        props: Vec<String>,
    },
    /// Delete one relationship, or all from source to target when no type is given
    Delete {
        source: String,
        target: String,
        rel_type: Option<String>,
    },
}

#[derive(Subcommand)]
enum PropCommand {
    SetNode {
        node: String,
        key: String,
        value: String,
    },
    DeleteNode {
        node: String,
        key: String,
    },
    SetRel {
        source: String,
        target: String,
        rel_type: String,
        key: String,
        value: String,
    },
    DeleteRel {
        source: String,
        target: String,
        rel_type: String,
        key: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TemplateKind {
    Nodes,
    Relationships,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }

    if let Commands::Template { kind } = cli.command {
        match kind {
            TemplateKind::Nodes => print!("{}", NODE_TEMPLATE),
            TemplateKind::Relationships => print!("{}", RELATIONSHIP_TEMPLATE),
        }
        return Ok(());
    }

    if let Commands::Init {
        empty,
        baseline,
        yes,
    } = cli.command
    {
        if !yes {
            bail!("init discards the current graph; pass --yes to confirm");
        }
        let mode = if empty {
            InitMode::Empty
        } else if baseline {
            InitMode::Baseline
        } else {
            InitMode::Checkpoint
        };
        warn!("Discarding the current graph ({:?})", mode);
        let db = GraphDb::new(config);
        let outcome = db.init(mode).await?;
        // The checkpoint slot now reflects the reset
        db.save().await?;
        return emit(cli.format, &outcome, |o| {
            println!(
                "Graph initialized from {:?}: {} nodes, {} relationships",
                o.source, o.node_count, o.relationship_count
            )
        });
    }

    let (db, _) = GraphDb::open(config)
        .await
        .context("failed to restore the checkpoint")?;
    let format = cli.format;
    let mutated = run(&db, cli.command, format).await?;
    if mutated {
        db.save().await.context("failed to save the checkpoint")?;
    }
    Ok(())
}

/// Run a command; returns whether the graph changed
async fn run(db: &GraphDb, command: Commands, format: OutputFormat) -> Result<bool> {
    match command {
        Commands::Graph => {
            let graph = db.get_graph().await;
            emit(format, &graph, |g| {
                print_nodes(&g.nodes);
                print_relationships(&g.relationships);
            })?;
            Ok(false)
        }
        Commands::Stats => {
            let stats = db.statistics().await;
            emit(format, &stats, |s| {
                println!("Nodes:         {}", s.node_count);
                println!("Relationships: {}", s.relationship_count);
                for (label, count) in &s.labels {
                    println!("  :{:<20} {}", label, count);
                }
                for (rel_type, count) in &s.relationship_types {
                    println!("  [{:<19}] {}", rel_type, count);
                }
            })?;
            Ok(false)
        }
        Commands::Search { query } => {
            let nodes = db.search(&query).await;
            emit(format, &nodes, |n| print_nodes(n))?;
            Ok(false)
        }
        Commands::Path {
            start,
            end,
            rel_type,
        } => {
            let path = db.find_path(&start, &end, rel_type.as_deref()).await?;
            emit(format, &path, |p| {
                let names: Vec<String> = p
                    .nodes
                    .iter()
                    .map(|n| format!("({}) {}", n.id, n.name))
                    .collect();
                println!("{}", names.join(" -> "));
                println!("{} hop(s)", p.len());
            })?;
            Ok(false)
        }
        Commands::Node(cmd) => run_node(db, cmd, format).await,
        Commands::Label(cmd) => {
            let node = match cmd {
                LabelCommand::Add { node, label } => {
                    let id = db.resolve(&node).await?;
                    db.add_label(id, &label).await?
                }
                LabelCommand::Remove { node, label } => {
                    let id = db.resolve(&node).await?;
                    db.remove_label(id, &label).await?
                }
            };
            emit(format, &node, |n| print_nodes(std::slice::from_ref(n)))?;
            Ok(true)
        }
        Commands::Rel(cmd) => run_rel(db, cmd, format).await,
        Commands::Prop(cmd) => run_prop(db, cmd, format).await,
        Commands::Import {
            nodes,
            relationships,
            replace,
        } => {
            if nodes.is_none() && relationships.is_none() {
                bail!("nothing to import: pass --nodes and/or --relationships");
            }
            let report = db
                .import_csv(
                    nodes.as_deref(),
                    relationships.as_deref(),
                    db.import_options(replace),
                )
                .await?;
            emit(format, &report, |r| {
                println!(
                    "{} nodes, {} relationships created, {} updated, {} endpoint nodes added",
                    r.nodes_created,
                    r.relationships_created,
                    r.relationships_updated,
                    r.endpoints_created
                );
                for failure in &r.failures {
                    println!("  {} row {}: {}", failure.stream, failure.row, failure.reason);
                }
            })?;
            Ok(true)
        }
        Commands::Export {
            nodes,
            relationships,
        } => {
            db.export_csv(&nodes, &relationships).await?;
            println!("Exported to {:?} and {:?}", nodes, relationships);
            Ok(false)
        }
        Commands::Save => {
            let outcome = db.save().await?;
            emit(format, &outcome, |o| {
                println!(
                    "Saved {} nodes, {} relationships to {:?}",
                    o.node_count, o.relationship_count, o.path
                )
            })?;
            Ok(false)
        }
        Commands::Template { .. } | Commands::Init { .. } => Ok(false),
    }
}

async fn run_node(db: &GraphDb, cmd: NodeCommand, format: OutputFormat) -> Result<bool> {
    let (node, mutated) = match cmd {
        NodeCommand::Get { node } => {
            let id = db.resolve(&node).await?;
            (db.get_node(id).await?, false)
        }
        NodeCommand::Create {
            name,
            labels,
            props,
        } => {
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            let node = db.create_node(&name, &labels, parse_props(&props)?).await?;
            (node, true)
        }
        NodeCommand::Update { node, name } => {
            let id = db.resolve(&node).await?;
            (db.update_node(id, Some(&name)).await?, true)
        }
        NodeCommand::Delete { node } => {
            let id = db.resolve(&node).await?;
            let deleted = db.delete_node(id).await?;
            emit(format, &deleted, |d| {
                println!(
                    "Deleted node {} '{}' and {} relationship(s)",
                    d.node.id,
                    d.node.name,
                    d.relationships.len()
                )
            })?;
            return Ok(true);
        }
    };
    emit(format, &node, |n| print_nodes(std::slice::from_ref(n)))?;
    Ok(mutated)
}

async fn run_rel(db: &GraphDb, cmd: RelCommand, format: OutputFormat) -> Result<bool> {
    match cmd {
        RelCommand::Create {
            source,
            target,
            rel_type,
            props,
        } => {
            let source = db.resolve(&source).await?;
            let target = db.resolve(&target).await?;
            let (upsert, rel) = db
                .create_relationship(source, target, &rel_type, parse_props(&props)?)
                .await?;
            emit(format, &rel, |r| {
                println!("{:?}:", upsert);
                print_relationships(std::slice::from_ref(r));
            })?;
        }
        RelCommand::Delete {
            source,
            target,
            rel_type,
        } => {
            let source = db.resolve(&source).await?;
            let target = db.resolve(&target).await?;
            let removed = match rel_type {
                Some(rel_type) => {
                    let key = RelKey::new(source, target, normalized_type(&rel_type)?);
                    let rel = db.get_relationship(&key).await?;
                    db.delete_relationship(&key).await;
                    vec![rel]
                }
                None => db.delete_relationships_between(source, target).await,
            };
            emit(format, &removed, |r| {
                println!("Deleted {} relationship(s)", r.len())
            })?;
        }
    }
    Ok(true)
}

async fn run_prop(db: &GraphDb, cmd: PropCommand, format: OutputFormat) -> Result<bool> {
    match cmd {
        PropCommand::SetNode { node, key, value } => {
            let id = db.resolve(&node).await?;
            let node = db.set_node_property(id, &key, parse_value(&value)?).await?;
            emit(format, &node, |n| print_nodes(std::slice::from_ref(n)))?;
        }
        PropCommand::DeleteNode { node, key } => {
            let id = db.resolve(&node).await?;
            let node = db.delete_node_property(id, &key).await?;
            emit(format, &node, |n| print_nodes(std::slice::from_ref(n)))?;
        }
        PropCommand::SetRel {
            source,
            target,
            rel_type,
            key,
            value,
        } => {
            let rel_key = rel_key(db, &source, &target, &rel_type).await?;
            let rel = db
                .set_relationship_property(&rel_key, &key, parse_value(&value)?)
                .await?;
            emit(format, &rel, |r| print_relationships(std::slice::from_ref(r)))?;
        }
        PropCommand::DeleteRel {
            source,
            target,
            rel_type,
            key,
        } => {
            let rel_key = rel_key(db, &source, &target, &rel_type).await?;
            let rel = db.delete_relationship_property(&rel_key, &key).await?;
            emit(format, &rel, |r| print_relationships(std::slice::from_ref(r)))?;
        }
    }
    Ok(true)
}

async fn rel_key(db: &GraphDb, source: &str, target: &str, rel_type: &str) -> Result<RelKey> {
    let source: NodeId = db.resolve(source).await?;
    let target: NodeId = db.resolve(target).await?;
    Ok(RelKey::new(source, target, normalized_type(rel_type)?))
}

fn normalized_type(raw: &str) -> Result<RelType> {
    RelType::normalized(raw).context("relationship type must not be blank")
}

/// Parse a scalar: JSON numbers and booleans keep their type, anything else is a string
fn parse_value(raw: &str) -> Result<PropertyValue> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) if !json.is_null() => {
            PropertyValue::from_json(&json).map_err(|e| anyhow::anyhow!("{}: {}", raw, e))
        }
        _ => Ok(PropertyValue::String(raw.to_string())),
    }
}

fn parse_props(pairs: &[String]) -> Result<PropertyMap> {
    let mut props = PropertyMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{}'", pair))?;
        props.insert(key.trim().to_string(), parse_value(value.trim())?);
    }
    Ok(props)
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, table: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Table => table(value),
    }
    Ok(())
}

fn format_properties<'a>(props: impl Iterator<Item = (&'a String, &'a PropertyValue)>) -> String {
    props
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_nodes(nodes: &[Node]) {
    if nodes.is_empty() {
        println!("(no nodes)");
        return;
    }
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["id", "name", "labels", "properties"]);
    for node in nodes {
        let labels: Vec<&str> = node.labels.iter().map(|l| l.as_str()).collect();
        table.add_row(vec![
            node.id.to_string(),
            node.name.clone(),
            labels.join(", "),
            format_properties(node.properties.iter()),
        ]);
    }
    println!("{}", table);
}

fn print_relationships(relationships: &[Relationship]) {
    if relationships.is_empty() {
        println!("(no relationships)");
        return;
    }
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["source", "type", "target", "properties"]);
    for rel in relationships {
        table.add_row(vec![
            rel.source.to_string(),
            rel.rel_type.to_string(),
            rel.target.to_string(),
            format_properties(rel.properties.iter()),
        ]);
    }
    println!("{}", table);
}
