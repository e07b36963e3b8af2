//! Fund Core Library
//!
//! Shared types, collaborator traits, storage backends and the bounded
//! worker pool used by the metrics, scoring, backtest and coverage crates.

pub mod config;
pub mod db;
pub mod error;
pub mod pool;
pub mod store;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use pool::{CancelFlag, TaskOutcome, WorkerPool};
pub use types::*;
