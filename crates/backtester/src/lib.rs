//! Backtester
//!
//! Point-in-time simulation of fund selection strategies.
//!
//! At each rebalance date the universe is scored and ranked using only
//! values dated on or before that date, a [`SelectionRule`] picks the
//! holdings, and the resulting [`fund_core::PortfolioSnapshot`] is held
//! until the next date to measure its realized return.
//!
//! # Example
//!
//! ```ignore
//! use backtester::{BacktestConfig, BacktestEngine, SelectionRule};
//! use fund_core::CancelFlag;
//!
//! let engine = BacktestEngine::from_store(store);
//! let config = BacktestConfig::new(start, end, SelectionRule::TopN { n: 10 });
//!
//! let result = engine.run(&config, &CancelFlag::new()).await?;
//! println!("Return: {:.2}%", result.total_return * 100.0);
//! ```

pub mod config;
pub mod engine;
pub mod result;
pub mod selection;

pub use config::{BacktestConfig, Cadence, PeerFilter, SelectionRule};
pub use engine::{BacktestEngine, BASE_NAV};
pub use result::{benchmark_relative, BacktestResult, BenchmarkRelative, PeriodRecord};
pub use selection::{select, Candidate, SelectionState};
