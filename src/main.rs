//! sandboxd - sandbox control plane with HTTP API.
//!
//! Usage:
//!   sandboxd serve [--port 8080]      # Start HTTP server
//!   sandboxd exec -- <command>        # Run one command and exit

mod browser;
mod code;
mod config;
mod desktop;
mod error;
mod http_server;
mod recorder;
mod runner;
mod state;

use std::collections::HashMap;
use std::process::exit;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::runner::RunRequest;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "sandboxd")]
#[command(about = "Sandbox control plane with HTTP API")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single shell command and exit with its status
    Exec {
        /// Wall-clock timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Command to run through `sh -c`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();

    match args.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            let state = AppState::new(config);
            if let Err(e) = http_server::run_server(state).await {
                error!(error = %e, "server failed");
                exit(1);
            }
        }
        Commands::Exec { timeout, command } => {
            let outcome = runner::run(RunRequest {
                command: command.join(" "),
                cwd: config.workspace,
                timeout: Duration::from_secs(timeout),
                env: HashMap::new(),
            })
            .await;
            match outcome {
                Ok(outcome) => {
                    print!("{}", outcome.stdout);
                    eprint!("{}", outcome.stderr);
                    exit(outcome.exit_code);
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    exit(1);
                }
            }
        }
    }
}
