use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Client driver for the onion routing overlay, standing in for the
/// out-of-scope HTML form (§6).
#[derive(Parser, Debug)]
#[command(name = "onion-originator", about = "Onion-routing client driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v = debug, -vv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request a circuit and relay one request through it
    Connect {
        /// Destination service URL
        #[arg(long)]
        service: String,

        /// Directory controller base URL
        #[arg(long)]
        directory: String,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Command::Connect { service, directory } = cli.command;

    match onion_originator::connect(&directory, &service).await {
        Ok(result) => {
            println!("{}", json!({"status": true, "data": {"result": result}}));
        }
        Err(e) => {
            println!("{}", json!({"status": false, "error": e.to_string()}));
            std::process::exit(1);
        }
    }
}
