use serde::{Deserialize, Serialize};

use crate::primitives::concurrency::{default_workers, ParallelExecution};

use super::error::{CheckError, Result};

/// Which groups of checks a run performs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyFlags {
    /// Node, relationship and group record checks.
    pub check_graph: bool,
    /// Label set versus label scan index, both directions.
    pub check_label_index: bool,
    /// Property chains and blocks.
    pub check_properties: bool,
    /// Schema descriptors and index entries.
    pub check_indexes: bool,
    /// Observed versus stored aggregate counts.
    pub check_counts: bool,
}

impl ConsistencyFlags {
    /// Every check enabled.
    pub const ALL: ConsistencyFlags = ConsistencyFlags {
        check_graph: true,
        check_label_index: true,
        check_properties: true,
        check_indexes: true,
        check_counts: true,
    };
}

impl Default for ConsistencyFlags {
    fn default() -> Self {
        Self::ALL
    }
}

/// Tuning and scope of one check run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Checks to perform.
    pub flags: ConsistencyFlags,
    /// Worker threads per phase.
    pub workers: usize,
    /// Ids handed to a worker at a time.
    pub ids_per_chunk: u64,
    /// Hard cap on cache memory, in bytes.
    pub memory_ceiling: Option<u64>,
    /// Memory considered available; probed from the OS when unset.
    pub available_memory: Option<u64>,
    /// Violations kept in the summary; counters are exact regardless.
    pub max_retained_violations: Option<usize>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            flags: ConsistencyFlags::default(),
            workers: default_workers(),
            ids_per_chunk: ParallelExecution::DEFAULT_IDS_PER_CHUNK,
            memory_ceiling: None,
            available_memory: None,
            max_retained_violations: None,
        }
    }
}

impl CheckConfig {
    /// Rejects values that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(CheckError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.ids_per_chunk == 0 {
            return Err(CheckError::InvalidConfig(
                "ids_per_chunk must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
