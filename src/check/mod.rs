//! Parallel consistency checking.
//!
//! [`ConsistencyChecker`] splits the node id space into memory windows
//! planned by [`MemoryLimiter`], runs the windowed phases against a shared
//! [`CacheAccess`], then the windowless record, property, schema and counts
//! phases. Every inconsistency goes to the [`ConsistencyReporter`]; only
//! accessor failures abort a run.

pub mod cache;
mod checker;
mod config;
pub mod counts;
mod error;
mod group;
pub mod limiter;
mod node;
mod property;
mod relationship;
pub mod report;
mod schema;

pub use cache::{CacheAccess, CacheClient, SlotSizes};
pub use checker::{CheckKind, ConsistencyChecker};
pub use config::{CheckConfig, ConsistencyFlags};
pub use counts::CountsState;
pub use error::{CheckError, Result};
pub use limiter::{compute_window_size, MemoryLimiter};
pub use report::{ConsistencyReporter, ConsistencySummary, EntityKind, Violation, ViolationKind};
