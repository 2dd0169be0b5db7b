mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use msm_core::{AccessLayer, MemoryGraph, QueryKind, QueryResponse};
use msm_store::{Store, load_policy, open_store, resolve_base_dir};
use rmcp::{ServiceExt, transport::stdio};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "msm", about = "Read gateway over market-structure memory")]
struct Cli {
    /// Data directory (defaults to MSM_DATA_DIR, then ~/.market-structure-memory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Guard policy TOML file (defaults to MSM_POLICY, then <data-dir>/policy.toml)
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio transport
    Serve,

    /// Run one query and print the normalized result as JSON
    Query {
        /// Query type, e.g. SPATIAL_GROUP
        query_type: String,

        /// Parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Print the field contract of one query type, or of all of them
    Schema {
        query_type: Option<String>,
    },

    /// Show store statistics
    Stats,

    /// Replace the stored memory with a JSON snapshot
    Import {
        /// Input file path
        path: PathBuf,
    },

    /// Write the stored memory to a JSON snapshot
    Export {
        /// Output file path
        path: PathBuf,
    },
}

fn base_dir(cli: &Cli) -> PathBuf {
    resolve_base_dir(cli.data_dir.as_deref())
}

fn open(cli: &Cli) -> Result<Store> {
    let base = base_dir(cli);
    open_store(&base).with_context(|| format!("failed to open store in {}", base.display()))
}

fn open_gateway(cli: &Cli) -> Result<AccessLayer<MemoryGraph>> {
    let base = base_dir(cli);
    let store = open(cli)?;
    let graph = store.load_graph().context("failed to load memory graph")?;

    let policy_path = cli
        .policy
        .clone()
        .or_else(|| std::env::var_os("MSM_POLICY").map(PathBuf::from));
    let policy = load_policy(policy_path.as_deref(), &base).context("failed to load guard policy")?;

    AccessLayer::with_policy(Arc::new(graph), policy)
        .map_err(|e| anyhow!("{}: {e}", e.kind()))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::Query { query_type, params } => cmd_query(&cli, query_type, params),
        Commands::Schema { query_type } => cmd_schema(query_type.as_deref()),
        Commands::Stats => cmd_stats(&cli),
        Commands::Import { path } => cmd_import(&cli, path),
        Commands::Export { path } => cmd_export(&cli, path),
    }
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let gateway = open_gateway(cli)?;
    tracing::info!(
        nodes = gateway.store().len(),
        "starting MCP server for {}",
        base_dir(cli).display()
    );

    let server = server::MsmServer::new(gateway);
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;

    tokio::select! {
        quit = service.waiting() => {
            quit.context("MCP server task failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
    }
    Ok(())
}

fn cmd_query(cli: &Cli, query_type: &str, params: &str) -> Result<()> {
    let params: Value = serde_json::from_str(params).context("PARAMS is not valid JSON")?;
    let gateway = open_gateway(cli)?;

    let response = gateway
        .execute(query_type, &params)
        .map_err(|e| anyhow!("{}: {e}", e.kind()))?;

    if let QueryResponse::NotWired(kind) = &response {
        eprintln!(
            "{} is not wired to stored traversal history; no result",
            kind.name()
        );
    }
    let json = serde_json::to_string_pretty(&response.into_json())
        .context("failed to serialize result")?;
    println!("{json}");
    Ok(())
}

fn cmd_schema(query_type: Option<&str>) -> Result<()> {
    let described = match query_type {
        Some(name) => QueryKind::resolve(name)
            .map_err(|e| anyhow!("{}: {e}", e.kind()))?
            .describe(),
        None => Value::Array(QueryKind::ALL.iter().map(|k| k.describe()).collect()),
    };
    println!("{}", serde_json::to_string_pretty(&described)?);
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let store = open(cli)?;
    let nodes = store.node_count().context("failed to count nodes")?;
    let observations = store
        .observation_count()
        .context("failed to count observations")?;

    println!("data_dir:     {}", base_dir(cli).display());
    println!("nodes:        {nodes}");
    println!("observations: {observations}");
    println!("query_types:  {}", QueryKind::ALL.len());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let store = open(cli)?;
    let count = store
        .import_json_file(path)
        .context("failed to import JSON")?;
    println!("imported {count} nodes from {}", path.display());
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let store = open(cli)?;
    store
        .export_json_file(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    let count = store.node_count().context("failed to count nodes")?;
    println!("exported {count} nodes to {}", path.display());
    Ok(())
}
