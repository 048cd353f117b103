mod allocation;
mod config;
mod orchestrator;
mod registry;
mod routes;
mod state;

use clap::Parser;
use config::DirectoryConfig;
use orchestrator::{LocalProcessOrchestrator, Orchestrator};
use state::DirectoryState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// The onion overlay's circuit controller: allocates routes, tracks per-hop
/// notifications, and orchestrates hop processes.
#[derive(Parser, Debug)]
#[command(name = "onion-directory", about = "Onion-routing circuit controller")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, default_value = "directory.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all logging except warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = DirectoryConfig::load(&cli.config)?;
    tracing::info!(
        bind = %config.bind_address,
        port = config.port,
        node_url_template = %config.node_url_template,
        "starting directory"
    );

    let orchestrator: Arc<dyn Orchestrator> =
        Arc::new(LocalProcessOrchestrator::new(config.hop_binary_path.clone()));
    let state = Arc::new(DirectoryState::new(config, orchestrator));

    routes::run(state).await?;

    Ok(())
}
