//! workflowd - Application workflow engine daemon
//!
//! Serves the administrative structural API and the workflow orchestration
//! API over HTTP on top of an in-memory engine.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workflow_server::{Server, WorkflowdConfig};

/// workflowd CLI
#[derive(Parser)]
#[command(name = "workflowd")]
#[command(about = "Application workflow engine daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short, long, env = "WORKFLOW_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "WORKFLOW_LISTEN_ADDR")]
    listen: Option<SocketAddr>,

    /// Log level or filter directive
    #[arg(long, env = "WORKFLOW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "WORKFLOW_LOG_JSON")]
    json: bool,

    /// Seed file with definitions to create at startup
    #[arg(long, env = "WORKFLOW_SEED")]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = WorkflowdConfig::load(cli.config.as_deref())
        .with_context(|| "failed to load configuration")?;

    // Override with CLI args
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        max_automatic_chain = config.engine.max_automatic_chain,
        "Starting workflowd"
    );

    let server = Server::new(config).context("failed to initialise server")?;
    server.run().await.context("server terminated with an error")
}
