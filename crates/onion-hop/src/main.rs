mod config;
mod forward;
mod notify;
mod server;
mod state;

use clap::Parser;
use config::HopConfig;
use state::HopState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A single onion-routing hop: wraps/unwraps one layer of a circuit and
/// forwards the peeled payload to the next hop or origin service.
#[derive(Parser, Debug)]
#[command(name = "onion-hop", about = "Onion-routing relay hop")]
struct Cli {
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

    let config = HopConfig::from_env()?;
    tracing::info!(
        this_node = %config.this_node,
        directory_node = %config.directory_node,
        tracking_id = %config.tracking_id,
        "starting hop"
    );

    let state = Arc::new(HopState::new(config)?);
    server::run(state).await?;

    Ok(())
}
