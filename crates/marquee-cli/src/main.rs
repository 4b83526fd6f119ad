//! Marquee command-line client.
//!
//! Usage:
//!   # Join a group and add a movie to its backlog
//!   marquee group join G1 --name "Friday Club"
//!   marquee movie add "Tampopo" --year 1985 --backlog
//!
//!   # Pull everything from the shared store
//!   marquee sync --force
//!
//! Local state lives under the data directory; the "remote" is a SQLite file
//! that several devices (or data directories) can point at.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use marquee_remote::{RemoteStore, SqliteRemote};
use marquee_sync::{BlobStore, FileBlobStore, SyncConfig, SyncEngine};
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

use commands::Command;

/// Shared movie log with offline-first group sync.
#[derive(Parser, Debug)]
#[command(name = "marquee")]
#[command(about = "Shared movie log with offline-first group sync")]
struct Args {
    /// Local data directory (default: <data_local_dir>/marquee)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Shared remote database (default: <data-dir>/remote.db)
    #[arg(long, global = true)]
    remote: Option<PathBuf>,

    /// RON config file (default: <config_dir>/marquee/config.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the number of concurrent push operations
    #[arg(long, global = true)]
    push_concurrency: Option<usize>,

    /// Log sync activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marquee")
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("marquee").join("config.ron"))
}

fn load_config(args: &Args) -> Result<SyncConfig> {
    let mut config = match args.config.clone().or_else(default_config_path) {
        Some(path) => SyncConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SyncConfig::default(),
    };
    if let Some(n) = args.push_concurrency {
        config.push_concurrency = n.max(1);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout is for command output.
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = load_config(&args)?;
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let remote_path = args
        .remote
        .clone()
        .unwrap_or_else(|| data_dir.join("remote.db"));

    tracing::debug!(data_dir = %data_dir.display(), remote = %remote_path.display(), "opening");
    let remote: Arc<dyn RemoteStore> = Arc::new(
        SqliteRemote::open(&remote_path)
            .with_context(|| format!("opening remote {}", remote_path.display()))?,
    );
    let blobs: Arc<dyn BlobStore> = Arc::new(FileBlobStore::open(data_dir.join("local")).await?);
    let engine = SyncEngine::open(remote, blobs, config).await?;

    let mut stdout = std::io::stdout().lock();
    let result = commands::run(&engine, args.command, &mut stdout).await;

    // Whatever was written locally goes out before exit, even on error.
    engine.settle().await;
    result
}
