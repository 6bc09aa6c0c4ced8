use std::sync::Arc;

use crate::check::CheckConfig;
use crate::primitives::concurrency::{NoProgress, ProgressListener};

/// Options used when checking a snapshot from an administrative command.
#[derive(Clone)]
pub struct AdminCheckOptions {
    /// Engine configuration.
    pub check: CheckConfig,
    /// Receives chunk progress; the CLI plugs its progress bar in here.
    pub progress: Arc<dyn ProgressListener>,
}

impl Default for AdminCheckOptions {
    fn default() -> Self {
        Self {
            check: CheckConfig::default(),
            progress: Arc::new(NoProgress),
        }
    }
}

impl std::fmt::Debug for AdminCheckOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCheckOptions")
            .field("check", &self.check)
            .finish_non_exhaustive()
    }
}
