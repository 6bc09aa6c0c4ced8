//! Parallel consistency checker for record-oriented graph stores.
//!
//! The [`check`] module holds the engine, [`storage`] the record model and the
//! read traits it consumes, and [`admin`] the snapshot-level entry point the
//! `graphcheck` binary drives.

#![warn(missing_docs)]

pub mod admin;
pub mod check;
pub mod primitives;
pub mod storage;
pub mod types;
