//! Pull the remote snapshot once.

use anyhow::Result;
use sync_client::PullOutcome;

use super::Session;

/// Run the pull command.
pub async fn run(session: &Session) -> Result<()> {
    let engine = session.engine().await?;
    if !engine.is_enabled() {
        println!("Sync disabled: no remote configured.");
        return Ok(());
    }

    match engine.pull().await {
        PullOutcome::Applied {
            updated_at,
            written,
            removed,
        } => {
            println!(
                "Applied snapshot from {}: {written} written, {removed} removed",
                updated_at.to_rfc3339()
            );
        }
        PullOutcome::NoSnapshot => println!("Remote has no snapshot yet."),
        PullOutcome::NotNewer | PullOutcome::Echo => println!("Up to date."),
        PullOutcome::Malformed => anyhow::bail!("Remote snapshot is malformed"),
        PullOutcome::Failed(reason) => anyhow::bail!("Pull failed: {reason}"),
        other => println!("Nothing pulled ({other:?})."),
    }
    Ok(())
}
