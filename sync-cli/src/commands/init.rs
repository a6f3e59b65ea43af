//! Initialize a data directory.

use anyhow::{Context, Result};
use std::path::Path;
use sync_client::{load_or_create_device_id, FileStore};

use super::STATE_FILE;
use crate::config::{self, CONFIG_FILE};

/// Run the init command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let state_path = data_dir.join(STATE_FILE);
    if state_path.exists() {
        anyhow::bail!(
            "Already initialized. Delete {} to reinitialize.",
            state_path.display()
        );
    }

    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;

    let store = FileStore::open(&state_path).context("Failed to create local state")?;
    let device_id = load_or_create_device_id(&store).context("Failed to create device id")?;

    let config_path = data_dir.join(CONFIG_FILE);
    let wrote_config = if config_path.exists() {
        false
    } else {
        tokio::fs::write(&config_path, config::template())
            .await
            .context("Failed to write default configuration")?;
        true
    };

    println!("Initialized successfully!");
    println!();
    println!("  Device ID: {device_id}");
    println!("  Data dir:  {}", data_dir.display());
    if wrote_config {
        println!("  Config:    {}", config_path.display());
    }
    println!();
    println!("Next steps:");
    println!("  1. Point [remote] at a REST endpoint or a shared SQLite file");
    println!("  2. Record a change: stockroom set inventory.bolt 10");
    println!("  3. Sync: stockroom push, or stockroom watch");

    Ok(())
}
