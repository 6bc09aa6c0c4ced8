//! Low-level building blocks shared by the checker.

/// Chunked parallel execution and progress reporting.
///
/// Splits id ranges into chunks and runs them across a bounded worker pool.
pub mod concurrency;
