//! # stockroom
//!
//! Operator CLI for stockroom's local state, undo history and sync.
//!
//! ## Commands
//!
//! - `init`: Initialize a data directory and device identity
//! - `get` / `set` / `rm` / `list`: Read and write local keys
//! - `undo` / `redo` / `history`: Walk the audit history
//! - `push` / `pull`: Sync once
//! - `status`: Show device and sync status
//! - `watch`: Run the sync engine until Ctrl-C
//!
//! ## Example
//!
//! ```bash
//! # Initialize and point two devices at one shared database
//! stockroom --data-dir ./a init
//! stockroom --data-dir ./b init
//! export STOCKROOM_REMOTE_SQLITE=./shared.db
//!
//! # Record a change on device A and push it
//! stockroom --data-dir ./a set inventory.bolt 10 --action add-item
//! stockroom --data-dir ./a push
//!
//! # Device B pulls it
//! stockroom --data-dir ./b pull
//! stockroom --data-dir ./b get inventory.bolt
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use sync_types::ActionKind;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{history, init, keys, pull, push, status, watch, Session};
use config::{Config, CONFIG_FILE};

/// Operator CLI for stockroom sync.
#[derive(Parser, Debug)]
#[command(name = "stockroom")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: stockroom.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for local state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the data directory and device identity
    Init,

    /// Print the value of a key
    Get {
        /// Key to read
        key: String,
    },

    /// Set a key, recording an undoable entry
    Set {
        /// Key to write
        key: String,

        /// Value to store
        value: String,

        /// Kind of change (add-item, delete-item, edit-item, adjust-qty, move-qty, add-to-location)
        #[arg(long, default_value = "edit-item")]
        action: ActionKind,

        /// Who made the change
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Remove a key, recording an undoable entry
    Rm {
        /// Key to remove
        key: String,

        /// Who made the change
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// List local keys (* marks replicated keys)
    List,

    /// Undo the most recent change
    Undo,

    /// Redo the most recently undone change
    Redo,

    /// Show the audit history
    History {
        /// Maximum number of entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Push local state to the remote once
    Push,

    /// Pull the remote snapshot once
    Pull,

    /// Show device and sync status
    Status,

    /// Run the sync engine until Ctrl-C
    Watch {
        /// Stop after this many milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let fallback_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    let mut config = Config::locate(cli.config.as_deref(), &fallback_dir.join(CONFIG_FILE))?;
    config.apply_overrides(|name| std::env::var(name).ok())?;

    // --data-dir wins over the file
    let data_dir = match (cli.data_dir, &config.data_dir) {
        (Some(dir), _) => dir,
        (None, Some(dir)) => dir.clone(),
        (None, None) => fallback_dir,
    };

    let open = || Session::open(&data_dir, config);

    match cli.command {
        Commands::Init => init::run(&data_dir).await?,
        Commands::Get { key } => keys::get(&open()?, &key)?,
        Commands::Set {
            key,
            value,
            action,
            actor,
        } => keys::set(&open()?, &key, &value, action, &actor)?,
        Commands::Rm { key, actor } => keys::remove(&open()?, &key, &actor)?,
        Commands::List => keys::list(&open()?)?,
        Commands::Undo => history::undo(&open()?)?,
        Commands::Redo => history::redo(&open()?)?,
        Commands::History { limit } => history::show(&open()?, limit)?,
        Commands::Push => push::run(&open()?).await?,
        Commands::Pull => pull::run(&open()?).await?,
        Commands::Status => status::run(&open()?).await?,
        Commands::Watch { duration_ms } => {
            let session = open()?;
            watch::run(&session, duration_ms.map(Duration::from_millis)).await?
        }
    }

    Ok(())
}

/// Logs go to stderr so command output stays scriptable.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for stockroom.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("app", "stockroom", "stockroom")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
