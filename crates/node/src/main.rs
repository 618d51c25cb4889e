//! MiniChain validator node binary.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use minichain::Node;
use minichain_config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minichain", about = "MiniChain validator node", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "minichain.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let node = Node::start(config).await.context("starting node")?;
    info!(
        node_id = node.node_id(),
        addr = %node.local_addr(),
        height = node.height(),
        "node running, press ctrl-c to stop"
    );

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for ctrl-c")?;
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {
                if node.consensus_halted() {
                    tracing::error!("consensus halted by fatal error, shutting down");
                    node.stop().await;
                    std::process::exit(1);
                }
            }
        }
    }
    node.stop().await;
    Ok(())
}
