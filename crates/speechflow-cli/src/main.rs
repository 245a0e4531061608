//! SpeechFlow process entry point: loads engine configuration, reads a
//! graph description, runs it to completion through the executor while
//! the control surface and shutdown orchestrator run alongside, and exits
//! with the shutdown reason's code (spec §4.9).

mod graph_description;

use anyhow::{Context, Result};
use clap::Parser;
use graph_description::GraphDescription;
use speechflow_core::engine::{Engine, EngineConfig};
use speechflow_core::shutdown::{ShutdownReason, Stoppable};
use speechflow_control::ControlServer;
use std::path::PathBuf;
use std::sync::Arc;

/// SpeechFlow graph execution engine.
#[derive(Parser, Debug)]
#[command(name = "speechflow")]
#[command(version, about = "Runs a SpeechFlow node graph to completion", long_about = None)]
struct Args {
    /// Path to the graph description YAML file.
    graph: PathBuf,

    /// Path to an EngineConfig YAML file; built-in defaults are used for
    /// anything it omits, and entirely if this flag is absent.
    #[arg(short, long, env = "SPEECHFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Override the control surface's bind address.
    #[arg(long, env = "SPEECHFLOW_CONTROL_ADDR")]
    control_addr: Option<std::net::SocketAddr>,

    /// Arguments forwarded to the graph description's `argv.<n>` variable
    /// lookups.
    #[arg(trailing_var_arg = true)]
    argv: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(addr) = args.control_addr {
        config.control_surface_addr = addr;
    }

    let engine = Arc::new(Engine::new(config));
    engine.shutdown.install_signal_handlers();

    let description = GraphDescription::load(&args.graph)
        .with_context(|| format!("loading graph description {}", args.graph.display()))?;
    let resolver = graph_description::EnvArgvResolver::new(args.argv);
    // Sidechain wiring is per-node (each compressor/expander instance picks
    // its own bus by name at construction, spec §4.7); the description
    // reader doesn't need a bus handed to it up front.
    let graph = graph_description::build_graph(&description, &resolver, None)
        .context("constructing graph from description")?;

    let (notify_tx, _notify_rx) = tokio::sync::broadcast::channel(256);

    let control_server = ControlServer::new();
    let control_addr = engine.config.control_surface_addr;
    let serve_nodes = Arc::clone(&engine.nodes);
    let serve_notify = notify_tx.clone();
    let serve_handle = {
        let control_server = Arc::clone(&control_server);
        tokio::spawn(async move {
            if let Err(err) = control_server.serve(control_addr, serve_nodes, serve_notify).await {
                tracing::error!(error = %err, "control surface exited with an error");
            }
        })
    };

    let control_surfaces: Vec<Arc<dyn Stoppable>> = vec![control_server];
    let exit_code = speechflow_core::executor::execute(
        graph,
        Arc::clone(&engine.shutdown),
        control_surfaces,
        Arc::clone(&engine.nodes),
        Some(notify_tx),
    )
    .await
    .context("running graph to completion")?;

    let _ = serve_handle.await;

    let reason = engine.shutdown.reason().unwrap_or(ShutdownReason::Finished);
    tracing::info!(?reason, exit_code, "speechflow exiting");
    std::process::exit(exit_code);
}
