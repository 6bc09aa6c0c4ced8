//! Splits the node id space into windows whose cache records fit in memory.

use std::fs;
use std::ops::Range;

use tracing::debug;

use super::error::{CheckError, Result};

/// Cache line size assumed when aligning window boundaries.
pub const CACHE_LINE_SIZE_BYTES: u64 = 64;

/// Memory assumed available when the platform does not say.
pub const FALLBACK_AVAILABLE_MEMORY: u64 = 1 << 30;

/// Computes the number of ids whose cache records fit `available_bytes`.
///
/// The result never exceeds `high_id`. When the id space does not fit, the
/// size is rounded down so that each window's records fill whole cache lines,
/// unless that rounding would leave nothing. Zero means a single record does
/// not fit.
pub fn compute_window_size(available_bytes: u64, high_id: u64, bytes_per_record: u64) -> u64 {
    let bytes_per_record = bytes_per_record.max(1);
    let fitting = available_bytes / bytes_per_record;
    if fitting >= high_id {
        return high_id;
    }
    let align = ids_per_cache_line_group(bytes_per_record);
    if fitting >= align {
        fitting - fitting % align
    } else {
        fitting
    }
}

/// Smallest id count whose records end on a cache line boundary.
fn ids_per_cache_line_group(bytes_per_record: u64) -> u64 {
    CACHE_LINE_SIZE_BYTES / gcd(CACHE_LINE_SIZE_BYTES, bytes_per_record)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Plans the sequence of windows one pass over the node id space takes.
#[derive(Clone, Debug)]
pub struct MemoryLimiter {
    high_id: u64,
    window_size: u64,
    budget: u64,
    bytes_per_record: u64,
}

impl MemoryLimiter {
    /// Plans windows for `high_id` ids under `min(available, ceiling)` bytes.
    ///
    /// Fails when not even one record fits; that is a configuration error
    /// raised before anything is scanned.
    pub fn new(available: u64, ceiling: Option<u64>, bytes_per_record: u64, high_id: u64) -> Result<Self> {
        let budget = ceiling.map_or(available, |c| c.min(available));
        let window_size = compute_window_size(budget, high_id, bytes_per_record);
        if window_size == 0 && high_id > 0 {
            return Err(CheckError::MemoryBudget {
                bytes_per_record,
                budget,
            });
        }
        let limiter = Self {
            high_id,
            window_size,
            budget,
            bytes_per_record,
        };
        debug!(
            high_id,
            window_size,
            budget,
            bytes_per_record,
            windows = limiter.number_of_windows(),
            "check.limiter.planned"
        );
        Ok(limiter)
    }

    /// Ids per window.
    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Effective byte budget.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Bytes one cache record takes.
    pub fn bytes_per_record(&self) -> u64 {
        self.bytes_per_record
    }

    /// `ceil(high_id / window_size)`, zero for an empty id space.
    pub fn number_of_windows(&self) -> u64 {
        if self.high_id == 0 {
            0
        } else {
            self.high_id.div_ceil(self.window_size)
        }
    }

    /// Whether the whole id space fits in a single window.
    pub fn is_single_pass(&self) -> bool {
        self.number_of_windows() <= 1
    }

    /// Windows in increasing id order, covering `[0, high_id)` exactly once.
    pub fn windows(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        (0..self.number_of_windows()).map(move |index| {
            let start = index * self.window_size;
            start..(start + self.window_size).min(self.high_id)
        })
    }
}

/// Memory the OS reports as available, or [`FALLBACK_AVAILABLE_MEMORY`].
pub fn available_memory() -> u64 {
    fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|info| parse_mem_available(&info))
        .unwrap_or(FALLBACK_AVAILABLE_MEMORY)
}

fn parse_mem_available(meminfo: &str) -> Option<u64> {
    let line = meminfo
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    kib.checked_mul(1024)
}
