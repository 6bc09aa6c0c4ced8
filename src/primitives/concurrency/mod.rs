#![forbid(unsafe_code)]

//! Chunked parallel execution over id ranges.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::debug;

/// Receives progress notifications while chunks complete.
///
/// Implementations are called from worker threads and must not block for
/// long; they sit outside the correctness contract of a run.
pub trait ProgressListener: Send + Sync {
    /// A named unit of work with `total_chunks` chunks is starting.
    fn phase_started(&self, _phase: &str, _total_chunks: u64) {}
    /// `completed` chunks have finished since the executor was created.
    fn chunks_completed(&self, _completed: u64) {}
    /// The named unit of work has finished.
    fn phase_finished(&self, _phase: &str) {}
}

/// Listener that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {}

/// Runs a per-chunk task over an id range on a bounded pool of threads.
///
/// Workers claim chunks from a shared atomic cursor until the range is
/// exhausted, so sparse and dense regions balance out without a scheduler.
/// The first failing chunk stops further claims; chunks already running are
/// allowed to finish and the failure is returned.
pub struct ParallelExecution {
    workers: usize,
    ids_per_chunk: u64,
    completed: AtomicU64,
    progress: Arc<dyn ProgressListener>,
}

impl ParallelExecution {
    /// Default number of ids handed to a worker at a time.
    pub const DEFAULT_IDS_PER_CHUNK: u64 = 100;

    /// Creates an executor. Zero values are raised to one.
    pub fn new(workers: usize, ids_per_chunk: u64) -> Self {
        Self {
            workers: workers.max(1),
            ids_per_chunk: ids_per_chunk.max(1),
            completed: AtomicU64::new(0),
            progress: Arc::new(NoProgress),
        }
    }

    /// Reports completed chunks to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressListener>) -> Self {
        self.progress = progress;
        self
    }

    /// Size of the worker pool.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Ids per chunk.
    pub fn ids_per_chunk(&self) -> u64 {
        self.ids_per_chunk
    }

    /// Chunks completed across every run of this executor.
    pub fn completed_chunks(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Number of chunks `range` splits into.
    pub fn chunk_count(&self, range: &Range<u64>) -> u64 {
        let len = range.end.saturating_sub(range.start);
        len.div_ceil(self.ids_per_chunk)
    }

    /// Runs `task` once for every chunk of `range`.
    ///
    /// Returns the first error any chunk produced. A panicking task
    /// propagates the panic to the caller once all workers have stopped.
    pub fn run<E, F>(&self, name: &str, range: Range<u64>, task: F) -> Result<(), E>
    where
        E: Send,
        F: Fn(Range<u64>) -> Result<(), E> + Sync,
    {
        let total = self.chunk_count(&range);
        self.progress.phase_started(name, total);
        if total == 0 {
            self.progress.phase_finished(name);
            return Ok(());
        }

        let cursor = AtomicU64::new(0);
        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<E>> = Mutex::new(None);
        let size = self.ids_per_chunk;

        let worker = || loop {
            if failed.load(Ordering::Acquire) {
                break;
            }
            let chunk = cursor.fetch_add(1, Ordering::Relaxed);
            if chunk >= total {
                break;
            }
            let start = range.start + chunk * size;
            let end = start.saturating_add(size).min(range.end);
            match task(start..end) {
                Ok(()) => {
                    let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
                    self.progress.chunks_completed(done);
                }
                Err(err) => {
                    failed.store(true, Ordering::Release);
                    let mut slot = first_error.lock();
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                    break;
                }
            }
        };

        let threads = (self.workers as u64).min(total) as usize;
        debug!(
            phase = name,
            chunks = total,
            threads,
            start = range.start,
            end = range.end,
            "executor.run"
        );
        if threads <= 1 {
            worker();
        } else {
            thread::scope(|scope| {
                for _ in 0..threads {
                    scope.spawn(&worker);
                }
            });
        }

        self.progress.phase_finished(name);
        match first_error.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Worker count matching the hardware parallelism, or one if unknown.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
