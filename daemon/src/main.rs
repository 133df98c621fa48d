//! Lattice daemon — entry point for running a lattice node.

use std::path::PathBuf;

use clap::Parser;
use lattice_node::{init_logging, LogFormat, Node, NodeConfig};

#[derive(Parser)]
#[command(name = "lattice-daemon", about = "Lattice peer-to-peer node daemon")]
struct Cli {
    /// Address to bind the UDP socket to.
    #[arg(long, env = "LATTICE_LISTEN")]
    listen: Option<String>,

    /// Data directory for the identity key and peer cache.
    #[arg(long, env = "LATTICE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Bootstrap peer addresses (comma-separated: "1.2.3.4:7600,5.6.7.8:7600").
    #[arg(long, env = "LATTICE_BOOTSTRAP_PEERS", value_delimiter = ',')]
    bootstrap_peers: Vec<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "LATTICE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. File settings are used as the
    /// base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(&path.display().to_string())?,
        None => NodeConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if !cli.bootstrap_peers.is_empty() {
        config.bootstrap_peers = cli.bootstrap_peers;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    let format = match config.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Human,
    };
    init_logging(format, &config.log_level);

    let mut node = Node::start(config).await?;
    tracing::info!(id = %node.local_id(), "lattice daemon up");

    tokio::select! {
        result = node.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
    }
    node.shutdown();
    Ok(())
}
