use thiserror::Error;

use crate::types::StoreError;

use super::report::ConsistencySummary;

/// Fatal failures of a check run.
///
/// Inconsistencies are never errors; they accumulate in the summary.
#[derive(Debug, Error)]
pub enum CheckError {
    /// A store accessor failed; the run stopped early.
    ///
    /// `summary` holds everything reported up to the abort and has
    /// `completed == false`.
    #[error("scan aborted during {phase}: {source}")]
    ScanAborted {
        /// Phase that was running.
        phase: &'static str,
        /// Accessor failure.
        #[source]
        source: StoreError,
        /// Partial results.
        summary: Box<ConsistencySummary>,
    },
    /// Not even one cache record fits the memory budget.
    #[error("memory budget of {budget} bytes cannot hold one {bytes_per_record}-byte cache record")]
    MemoryBudget {
        /// Size of a single cache record.
        bytes_per_record: u64,
        /// Effective budget.
        budget: u64,
    },
    /// Configuration values outside their valid range.
    #[error("invalid check configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias for check operations.
pub type Result<T> = std::result::Result<T, CheckError>;

/// Accessor failure tagged with the phase it interrupted, before the partial
/// summary is attached.
#[derive(Debug)]
pub(crate) struct PhaseFailure {
    pub(crate) phase: &'static str,
    pub(crate) source: StoreError,
}

impl PhaseFailure {
    pub(crate) fn new(phase: &'static str, source: StoreError) -> Self {
        Self { phase, source }
    }
}
