//! crmsync CLI
//!
//! Command-line tools for crmsync.
//!
//! # Commands
//!
//! - `serve` - Run the sync server over an in-memory repository
//! - `resolve` - Resolve a conflict between two JSON records offline
//! - `sync` - Run one client sync cycle against a server

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// crmsync command-line tools.
#[derive(Parser)]
#[command(name = "crmsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Largest accepted push batch
        #[arg(long, default_value = "500")]
        max_push_batch: usize,

        /// Pull page size when the client names none
        #[arg(long, default_value = "100")]
        pull_limit: usize,
    },

    /// Resolve a conflict between a server and a client record
    Resolve {
        /// JSON file holding the server record
        #[arg(long)]
        server: PathBuf,

        /// JSON file holding the client record
        #[arg(long)]
        client: PathBuf,

        /// Strategy (server_wins, client_wins, merge, newest_wins, manual)
        #[arg(short, long, default_value = "server_wins")]
        strategy: String,
    },

    /// Run one sync cycle for a local replica file
    Sync {
        /// Base URL of the sync server
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        url: String,

        /// Replica snapshot; created if missing
        #[arg(short, long)]
        replica: PathBuf,

        /// Conflict strategy
        #[arg(short, long, default_value = "server_wins")]
        strategy: String,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            max_push_batch,
            pull_limit,
        } => {
            commands::serve::run(bind, max_push_batch, pull_limit).await?;
        }
        Commands::Resolve {
            server,
            client,
            strategy,
        } => {
            let output = commands::resolve::run(&server, &client, &strategy.parse()?)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Sync {
            url,
            replica,
            strategy,
            timeout,
        } => {
            let status = commands::sync::run(&url, &replica, strategy.parse()?, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Version => {
            println!("crmsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
