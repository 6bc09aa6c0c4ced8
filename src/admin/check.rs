use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::admin::options::AdminCheckOptions;
use crate::admin::util::open_snapshot;
use crate::admin::Result;
use crate::check::{ConsistencyChecker, ConsistencySummary};
use crate::storage::StoreAccess;

/// Checks the consistency of a store snapshot.
///
/// Loads the snapshot at `path` and runs every phase enabled in
/// `opts.check`. Inconsistencies are returned in the summary; they are not
/// errors.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be loaded, if the configuration is
/// rejected, or if reading the store fails mid-run. In the last case the
/// error carries the partial summary.
pub fn check_snapshot(path: impl AsRef<Path>, opts: &AdminCheckOptions) -> Result<ConsistencySummary> {
    let path = path.as_ref();
    let started = Instant::now();
    let store = open_snapshot(path)?;
    info!(path = %path.display(), "admin.check.started");
    let access = StoreAccess::from_store(Arc::new(store));
    let summary = ConsistencyChecker::new(access, opts.check.clone())
        .with_progress(opts.progress.clone())
        .run()?;
    info!(
        path = %path.display(),
        violations = summary.total_violations,
        duration_ms = started.elapsed().as_millis() as u64,
        "admin.check.completed"
    );
    Ok(summary)
}
