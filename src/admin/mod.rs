#![forbid(unsafe_code)]

//! Snapshot-level administration: consistency checks and store inspection.
//!
//! These entry points load a store snapshot from disk and hand it to the
//! checker or summarize it, so callers never wire accessors themselves.

mod check;
mod error;
mod inspect;
mod options;
mod util;

/// Loads a snapshot and runs a full consistency check over it.
pub use check::check_snapshot;

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Summary of a snapshot's id spaces, tokens and schema.
pub use inspect::{inspect, IndexSummary, InspectReport, TokenCounts};

/// Options controlling an administrative check.
pub use options::AdminCheckOptions;

/// Opens a snapshot file as an in-memory store.
pub use util::open_snapshot;
