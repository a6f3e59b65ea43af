//! Read and write local keys.
//!
//! Writes go through the audit log so they can be undone.

use anyhow::Result;
use sync_client::StateStore;
use sync_core::BOOKKEEPING_KEYS;
use sync_types::{ActionKind, NewEntry};

use super::Session;

/// Run the get command.
pub fn get(session: &Session, key: &str) -> Result<()> {
    match session.store.get(key)? {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => anyhow::bail!("{key} is not set"),
    }
}

/// Run the set command.
pub fn set(
    session: &Session,
    key: &str,
    value: &str,
    action: ActionKind,
    actor: &str,
) -> Result<()> {
    let log = session.audit()?;
    let entry = NewEntry::new(actor, action).with_subject("key", key);
    log.record(entry, [key], |store| store.set(key, value))?;
    println!("{key} = {value}");
    Ok(())
}

/// Run the rm command.
pub fn remove(session: &Session, key: &str, actor: &str) -> Result<()> {
    if session.store.get(key)?.is_none() {
        anyhow::bail!("{key} is not set");
    }
    let log = session.audit()?;
    let entry = NewEntry::new(actor, ActionKind::DeleteItem).with_subject("key", key);
    log.record(entry, [key], |store| store.remove(key))?;
    println!("Removed {key}");
    Ok(())
}

/// Run the list command. Bookkeeping keys are hidden.
pub fn list(session: &Session) -> Result<()> {
    let spec = session.config.key_spec()?;
    let mut keys = session.store.keys()?;
    keys.retain(|k| !BOOKKEEPING_KEYS.contains(&k.as_str()));
    keys.sort();

    if keys.is_empty() {
        println!("No keys.");
        return Ok(());
    }
    for key in keys {
        let Some(value) = session.store.get(&key)? else {
            continue;
        };
        let marker = if spec.is_tracked(&key) { "*" } else { " " };
        println!("{marker} {key} = {value}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::STATE_FILE;
    use crate::config::Config;
    use tempfile::tempdir;

    fn session(dir: &std::path::Path) -> Session {
        std::fs::write(dir.join(STATE_FILE), "{}").unwrap();
        Session::open(dir, Config::default()).unwrap()
    }

    #[test]
    fn set_records_undoable_entry() {
        let dir = tempdir().unwrap();
        let session = session(dir.path());

        set(&session, "inventory.bolt", "10", ActionKind::AddItem, "alice").unwrap();
        assert_eq!(
            session.store.get("inventory.bolt").unwrap().as_deref(),
            Some("10")
        );

        let log = session.audit().unwrap();
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor, "alice");
        assert_eq!(entries[0].subject["key"], "inventory.bolt");
        assert!(log.undo_last().unwrap());
        assert_eq!(session.store.get("inventory.bolt").unwrap(), None);
    }

    #[test]
    fn remove_requires_existing_key() {
        let dir = tempdir().unwrap();
        let session = session(dir.path());

        assert!(remove(&session, "inventory.none", "cli").is_err());
        set(&session, "inventory.nut", "1", ActionKind::AddItem, "cli").unwrap();
        remove(&session, "inventory.nut", "cli").unwrap();
        assert_eq!(session.store.get("inventory.nut").unwrap(), None);
        assert_eq!(session.audit().unwrap().entries().len(), 2);
    }

    #[test]
    fn get_missing_key_fails() {
        let dir = tempdir().unwrap();
        let session = session(dir.path());
        assert!(get(&session, "inventory.none").is_err());
        assert!(list(&session).is_ok());
    }
}
