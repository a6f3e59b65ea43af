//! Run the sync engine until interrupted.

use anyhow::Result;
use std::time::Duration;
use sync_client::StateChange;
use tokio::sync::broadcast::error::RecvError;

use super::{format_timestamp, Session};

/// Run the watch command.
///
/// Stops on Ctrl-C (or after `duration`, when given) and lets the engine
/// perform its final pull and push before exiting.
pub async fn run(session: &Session, duration: Option<Duration>) -> Result<()> {
    let engine = session.engine().await?;
    let mut events = engine.subscribe();
    if !engine.start() {
        println!("Sync disabled: no remote configured.");
        return Ok(());
    }

    println!(
        "Watching space {} via {} (Ctrl-C to stop)",
        engine.config().space,
        session.config.remote_label()
    );

    let shutdown = shutdown_signal(duration);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(StateChange::RemoteApplied { updated_at, updated_by }) => {
                    println!(
                        "Applied remote snapshot from {updated_by} at {}",
                        format_timestamp(updated_at)
                    );
                }
                Ok(StateChange::Invalidated { .. }) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Missed state events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    println!("Stopping...");
    engine.stop().await;
    let status = engine.status();
    println!("Last synced: {}", format_timestamp(status.last_synced_at));
    Ok(())
}

async fn shutdown_signal(duration: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    match duration {
        Some(duration) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = tokio::time::sleep(duration) => {}
            }
        }
        None => ctrl_c.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::STATE_FILE;
    use crate::config::Config;
    use sync_client::StateStore;
    use tempfile::tempdir;

    fn session(dir: &std::path::Path, config: Config) -> Session {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(STATE_FILE), "{}").unwrap();
        Session::open(dir, config).unwrap()
    }

    #[tokio::test]
    async fn watch_without_remote_returns() {
        let dir = tempdir().unwrap();
        let session = session(dir.path(), Config::default());
        assert!(run(&session, None).await.is_ok());
    }

    #[tokio::test]
    async fn watch_pushes_on_exit() {
        let dir = tempdir().unwrap();
        let remote = dir.path().join("remote.db");
        let mut config = Config::default();
        config.remote.sqlite = Some(remote.clone());
        config.sync.interval_ms = 20;

        let a = session(&dir.path().join("a"), config.clone());
        a.store.set("job.j1", "open").unwrap();
        run(&a, Some(Duration::from_millis(60))).await.unwrap();

        let b = session(&dir.path().join("b"), config);
        crate::commands::pull::run(&b).await.unwrap();
        assert_eq!(b.store.get("job.j1").unwrap().as_deref(), Some("open"));
    }
}
