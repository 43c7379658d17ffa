//! fhirsync
//!
//! Keeps a local SQLite copy of a FHIR server in sync: pending local
//! changes are uploaded, configured resource types are downloaded.
//!
//! # Configuration
//!
//! Environment variables:
//! - `FHIRSYNC_DATABASE_PATH`: SQLite database path
//! - `FHIRSYNC_SERVER_URL`: FHIR server base URL
//! - `RUST_LOG`: log filter (default: `fhirsync=info,fhir_sync_core=info`)
//!
//! # Config File Format
//!
//! ```yaml
//! database_path: fhirsync.db
//! sync:
//!   server_url: "https://fhir.example.org/baseR4"
//!   poll_period_ms: 900000
//!   params:
//!     Patient:
//!       address-city: NAIROBI
//!     Observation: {}
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod db;
mod remote;

use commands::{ChangesCommand, ConfigCommand, PollCommand, SyncCommand};
use config::Config;
use db::{init_db, SqliteStore};

#[derive(Parser)]
#[command(name = "fhirsync")]
#[command(version)]
#[command(about = "Synchronize a local store with a FHIR server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single sync pass
    Sync(SyncCommand),

    /// Sync periodically until interrupted
    Poll(PollCommand),

    /// Manage pending local changes
    Changes(ChangesCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fhirsync=info,fhir_sync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Sync(cmd)) => {
            cmd.run(&config).await?;
        }
        Some(Commands::Poll(cmd)) => {
            cmd.run(&config).await?;
        }
        Some(Commands::Changes(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            let store = SqliteStore::new(pool);
            cmd.run(&store).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
