//! Device identity persistence.

use crate::store::{StateStore, StoreError};
use sync_core::DEVICE_ID_KEY;
use sync_types::DeviceId;

/// Load this device's id, generating and persisting one on first use.
///
/// A stored value that no longer parses is replaced with a fresh id.
pub fn load_or_create_device_id(store: &dyn StateStore) -> Result<DeviceId, StoreError> {
    if let Some(stored) = store.get(DEVICE_ID_KEY)? {
        match stored.parse::<DeviceId>() {
            Ok(id) => return Ok(id),
            Err(e) => tracing::warn!(error = %e, "Stored device id is invalid, regenerating"),
        }
    }

    let id = DeviceId::random();
    store.set(DEVICE_ID_KEY, &id.to_string())?;
    tracing::info!(device = %id, "Generated device id");
    Ok(id)
}
