//! RelayDesk CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: write a default config
//! - `serve`: run the chat gateway and admin API
//! - `ingest`: load a document into an owner's knowledge base
//! - `doctor`: check configuration and storage

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "relaydesk",
    about = "RelayDesk: live customer chat with a grounded AI responder",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "RELAYDESK_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Start the chat gateway and admin API
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ingest a PDF, JSON or text file for an owner
    Ingest {
        /// Owner whose knowledge base receives the document
        #[arg(short, long)]
        owner: String,

        /// Override the detected content type
        #[arg(long)]
        content_type: Option<String>,

        file: PathBuf,
    },

    /// Diagnose configuration and storage
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ingest {
            owner,
            content_type,
            file,
        } => commands::ingest::run(owner, file, content_type).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
