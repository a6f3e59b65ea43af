//! Undo, redo and the audit history.

use anyhow::Result;
use sync_types::AuditEntry;

use super::{format_timestamp, Session};

/// Run the undo command.
pub fn undo(session: &Session) -> Result<()> {
    let log = session.audit()?;
    let target = log.entries().into_iter().next();
    if log.undo_last()? {
        if let Some(entry) = target {
            println!("Undid {}", describe(&entry));
        }
    } else {
        println!("Nothing to undo.");
    }
    Ok(())
}

/// Run the redo command.
pub fn redo(session: &Session) -> Result<()> {
    let log = session.audit()?;
    let target = log.redo_entries().into_iter().next();
    if log.redo_last()? {
        if let Some(entry) = target {
            println!("Redid {}", describe(&entry));
        }
    } else {
        println!("Nothing to redo.");
    }
    Ok(())
}

/// Run the history command.
pub fn show(session: &Session, limit: usize) -> Result<()> {
    let log = session.audit()?;
    let entries = log.entries();
    let redo = log.redo_entries();

    if entries.is_empty() && redo.is_empty() {
        println!("No history.");
        return Ok(());
    }

    for entry in entries.iter().take(limit) {
        let marker = if entry.is_reversible() { " " } else { "!" };
        println!(
            "{marker} {}  {}",
            format_timestamp(entry.ts),
            describe(entry)
        );
    }
    if entries.len() > limit {
        println!("  ... {} older", entries.len() - limit);
    }
    if !redo.is_empty() {
        println!();
        println!("{} undone (stockroom redo)", redo.len());
    }
    Ok(())
}

fn describe(entry: &AuditEntry) -> String {
    let subject = entry
        .subject
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    if subject.is_empty() {
        format!("{} by {}", entry.action, entry.actor)
    } else {
        format!("{} by {} ({subject})", entry.action, entry.actor)
    }
}
