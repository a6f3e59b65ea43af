//! Show sync status.

use anyhow::Result;
use std::fmt::Write;
use sync_client::StateStore;
use sync_remote::SqliteBackend;

use super::{format_timestamp, Session};

/// Run the status command.
pub async fn run(session: &Session) -> Result<()> {
    print!("{}", report(session).await?);
    Ok(())
}

async fn report(session: &Session) -> Result<String> {
    let engine = session.engine().await?;
    let status = engine.status();
    let spec = session.config.key_spec()?;
    let keys = session.store.keys()?;
    let tracked = spec.filter(&keys);
    let log = session.audit()?;

    let mut out = String::new();
    writeln!(out, "=== stockroom status ===")?;
    writeln!(out)?;
    writeln!(out, "Device:")?;
    writeln!(out, "  ID:       {}", status.device_id)?;
    writeln!(out, "  Data dir: {}", session.data_dir.display())?;
    writeln!(out)?;
    writeln!(out, "Sync:")?;
    writeln!(out, "  Remote:   {}", session.config.remote_label())?;
    if status.enabled {
        writeln!(out, "  Space:    {}", engine.config().space)?;
        writeln!(out, "  Interval: {}ms", engine.config().tick_interval().as_millis())?;
        if let Some(spaces) = sqlite_spaces(session).await {
            let listed = if spaces.is_empty() {
                "none".to_string()
            } else {
                spaces.join(", ")
            };
            writeln!(out, "  Spaces:   {listed}")?;
        }
    } else {
        writeln!(out, "  Status:   DISABLED")?;
    }
    writeln!(out, "  Tracked:  {} keys", tracked.len())?;
    writeln!(out, "  Synced:   {}", format_timestamp(status.last_synced_at))?;
    if let Some(signature) = status.last_signature {
        writeln!(out, "  Signature: {}", &signature[..signature.len().min(16)])?;
    }
    writeln!(out)?;
    writeln!(out, "History:")?;
    writeln!(out, "  Entries:  {}", log.entries().len())?;
    writeln!(out, "  Undone:   {}", log.redo_entries().len())?;

    Ok(out)
}

/// Spaces stored in a SQLite remote, or `None` for other remotes.
async fn sqlite_spaces(session: &Session) -> Option<Vec<String>> {
    let path = session.config.remote.sqlite.as_ref()?;
    let listed = match SqliteBackend::new(path, &session.config.remote.table).await {
        Ok(backend) => backend.spaces().await,
        Err(e) => Err(e),
    };
    match listed {
        Ok(spaces) => Some(spaces),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not list spaces");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::STATE_FILE;
    use crate::config::Config;
    use tempfile::tempdir;

    #[tokio::test]
    async fn status_without_remote() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), "{}").unwrap();
        let session = Session::open(dir.path(), Config::default()).unwrap();

        let out = report(&session).await.unwrap();
        assert!(out.contains("DISABLED"));
        assert!(!out.contains("Spaces:"));
        assert!(run(&session).await.is_ok());
    }

    #[tokio::test]
    async fn status_with_sqlite_remote() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), "{}").unwrap();
        let mut config = Config::default();
        config.remote.sqlite = Some(dir.path().join("remote.db"));
        let session = Session::open(dir.path(), config).unwrap();
        session.store.set("inventory.a", "1").unwrap();

        let out = report(&session).await.unwrap();
        assert!(out.contains("Spaces:   none"));
        assert!(out.contains("Tracked:  1 keys"));

        crate::commands::push::run(&session).await.unwrap();
        let out = report(&session).await.unwrap();
        assert!(out.contains("Spaces:   default"));
    }
}
