use std::path::Path;

use tracing::debug;

use crate::admin::error::AdminError;
use crate::admin::Result;
use crate::storage::MemoryStore;

/// Loads the snapshot at `path`, failing with
/// [`AdminError::MissingSnapshot`] when the file does not exist.
pub fn open_snapshot(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        return Err(AdminError::missing_snapshot(path));
    }
    let store = MemoryStore::load(path)?;
    debug!(path = %path.display(), "admin.snapshot.opened");
    Ok(store)
}
