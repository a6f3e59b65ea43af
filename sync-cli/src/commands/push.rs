//! Push local tracked state once.

use anyhow::Result;
use sync_client::PushOutcome;

use super::Session;

/// Run the push command.
pub async fn run(session: &Session) -> Result<()> {
    let engine = session.engine().await?;
    if !engine.is_enabled() {
        println!("Sync disabled: no remote configured.");
        return Ok(());
    }

    match engine.push().await {
        PushOutcome::Pushed { updated_at, keys } => {
            println!("Pushed {keys} keys at {}", updated_at.to_rfc3339());
        }
        PushOutcome::Unchanged => println!("Up to date."),
        PushOutcome::Failed(reason) => anyhow::bail!("Push failed: {reason}"),
        other => println!("Nothing pushed ({other:?})."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::STATE_FILE;
    use crate::config::Config;
    use sync_client::StateStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn push_without_remote_is_ok() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), "{}").unwrap();
        let session = Session::open(dir.path(), Config::default()).unwrap();
        assert!(run(&session).await.is_ok());
    }

    #[tokio::test]
    async fn push_to_sqlite_remote() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), "{}").unwrap();
        let mut config = Config::default();
        config.remote.sqlite = Some(dir.path().join("remote.db"));
        let session = Session::open(dir.path(), config).unwrap();
        session.store.set("inventory.bolt", "10").unwrap();

        run(&session).await.unwrap();

        let engine = session.engine().await.unwrap();
        assert_eq!(engine.push().await, PushOutcome::Unchanged);
    }
}
