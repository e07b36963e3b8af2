//! fundscope: fund universe metrics, composite scoring, peer ranking and
//! point-in-time backtesting.
//!
//! This is the root crate that provides integration test and benchmark access
//! to the workspace crates. For actual functionality, use the individual
//! crates directly:
//!
//! - `fund-core`: Shared types, errors, configuration, collaborator traits, stores, worker pool
//! - `fund-metrics`: Return and risk metrics over a value series
//! - `fund-scoring`: Threshold ladders, composite scoring, tiers, peer ranking
//! - `backtester`: Point-in-time backtest engine
//! - `coverage-controller`: Batched scoring passes with progressive relaxation
//! - `fund-cli`: The `fundscope` binary

// Re-export for integration tests and benchmarks
pub use backtester as backtest;
pub use coverage_controller as coverage;
pub use fund_core as core;
pub use fund_metrics as metrics;
pub use fund_scoring as scoring;
