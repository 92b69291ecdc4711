//! Workflow engine server and command line runner

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use workflow_core::{GraphDefinition, State};
use workflow_server::{build_app, build_engine, create_router, ServerConfig};

#[derive(Parser)]
#[command(name = "workflow-server")]
#[command(about = "Run workflow graphs over HTTP or from the command line", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $WORKFLOW_CONFIG, then config/workflow-server.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve,

    /// Execute a graph file to completion and print the run
    Run {
        /// Graph definition (JSON, or YAML with a .yaml/.yml extension)
        file: PathBuf,

        /// Initial state as a JSON object
        #[arg(short, long)]
        state: Option<String>,
    },

    /// Check a graph file without running it
    Validate {
        /// Graph definition (JSON or YAML)
        file: PathBuf,
    },

    /// List the built-in tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Run { file, state } => run(&config, &file, state.as_deref()).await,
        Commands::Validate { file } => validate(&file),
        Commands::Tools => {
            let (engine, _) = build_engine(&config);
            for (name, description) in engine.tools().describe() {
                println!("{:<20} {}", name, description);
            }
            Ok(())
        }
    }
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config: ServerConfig) -> Result<()> {
    let addr = config.socket_addr()?;
    tracing::info!(
        name = %config.server.name,
        max_iterations = config.engine.max_iterations,
        routing = ?config.engine.routing,
        "Configuration loaded"
    );

    let app = create_router(build_app(&config));

    tracing::info!("Starting workflow server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Workflow server shut down gracefully");
    Ok(())
}

async fn run(config: &ServerConfig, file: &Path, state: Option<&str>) -> Result<()> {
    let definition = read_definition(file)?;
    let initial_state: State = match state {
        Some(raw) => serde_json::from_str(raw).context("--state must be a JSON object")?,
        None => State::new(),
    };

    let (engine, _) = build_engine(config);
    let graph = engine.create_graph(definition).await?;
    let run = engine.run_to_completion(&graph.id, initial_state).await?;

    println!("{}", serde_json::to_string_pretty(&run)?);
    if run.status != workflow_core::RunStatus::Completed {
        bail!("Run {} finished with status {}", run.run_id, run.status);
    }
    Ok(())
}

fn validate(file: &Path) -> Result<()> {
    let mut definition = read_definition(file)?;
    definition
        .validate()
        .with_context(|| format!("{} is not a valid graph", file.display()))?;
    println!(
        "{}: ok ({} nodes, {} edges, start '{}')",
        file.display(),
        definition.nodes.len(),
        definition.edges.len(),
        definition.start_node
    );
    Ok(())
}

fn read_definition(file: &Path) -> Result<GraphDefinition> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let is_yaml = matches!(
        file.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let definition: GraphDefinition = if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", file.display()))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", file.display()))?
    };
    Ok(definition)
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received CTRL-C signal, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down");
        }
    }
}
