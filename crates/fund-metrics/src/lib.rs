//! Fund Metrics
//!
//! Pure return and risk computations over a [`fund_core::ValueSeries`].
//!
//! Every function only looks at points dated on or before the requested
//! as-of date and returns the same output for the same input. A metric that
//! cannot be computed is reported as insufficient for that metric alone;
//! degenerate ratios resolve to documented neutral values.

pub mod calculator;
pub mod period;
pub mod risk;

pub use calculator::{series_from_f64, FundMetrics, MetricsCalculator};
pub use period::{ReturnMetrics, ReturnPeriod};
pub use risk::{Capture, Drawdown, RiskMeasure, RiskMetrics};
