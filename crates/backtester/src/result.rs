//! Per-period log and aggregate result of a backtest run.

use chrono::{DateTime, NaiveDate, Utc};
use fund_core::{NavPoint, PortfolioSnapshot, ValueSeries};
use fund_metrics::FundMetrics;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use uuid::Uuid;

use crate::config::BacktestConfig;

/// One rebalance period: what was held and how it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub rebalance_date: NaiveDate,
    pub period_end: NaiveDate,
    pub snapshot: PortfolioSnapshot,
    /// Entities scored successfully at the rebalance date.
    pub scored: usize,
    pub scoring_failures: usize,
    pub portfolio_return: f64,
    pub benchmark_return: Option<f64>,
    pub degraded: bool,
}

/// Portfolio behaviour against the configured benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRelative {
    /// Annualized Jensen's alpha.
    pub alpha: f64,
    pub beta: f64,
    /// Annualized standard deviation of active returns.
    pub tracking_error: f64,
    /// Fraction of periods in which the portfolio beat the benchmark.
    pub hit_rate: f64,
    pub paired_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub run_id: Uuid,
    pub config: BacktestConfig,
    pub periods: Vec<PeriodRecord>,
    /// Portfolio value over time, starting at [`crate::engine::BASE_NAV`].
    pub equity_curve: Vec<NavPoint>,
    /// Return and risk metrics of the equity curve as a value series.
    pub metrics: FundMetrics,
    pub total_return: f64,
    pub relative: Option<BenchmarkRelative>,
    pub degraded_periods: usize,
    /// Set when the run stopped early; `periods` holds the completed ones.
    pub cancelled: bool,
    pub persisted: bool,
    pub completed_at: DateTime<Utc>,
}

impl BacktestResult {
    pub fn final_value(&self) -> Option<f64> {
        self.equity_curve.last().and_then(|p| p.value.to_f64())
    }

    pub fn holdings_at(&self, rebalance_date: NaiveDate) -> Option<&PortfolioSnapshot> {
        self.periods
            .iter()
            .find(|p| p.rebalance_date == rebalance_date)
            .map(|p| &p.snapshot)
    }
}

/// Alpha, beta and tracking error from the equity curve against `benchmark`,
/// plus the hit rate over completed periods.
///
/// Benchmark values are aligned to the curve dates by taking the latest
/// benchmark point on or before each date. Returns `None` when fewer than
/// two paired returns exist.
pub fn benchmark_relative(
    curve: &ValueSeries,
    benchmark: &ValueSeries,
    periods: &[PeriodRecord],
    risk_free_rate: f64,
    periods_per_year: f64,
) -> Option<BenchmarkRelative> {
    let mut portfolio = Vec::new();
    let mut reference = Vec::new();

    for w in curve.points().windows(2) {
        let (Some(b0), Some(b1)) = (
            benchmark.latest_on_or_before(w[0].date),
            benchmark.latest_on_or_before(w[1].date),
        ) else {
            continue;
        };
        let p = ((w[1].value - w[0].value) / w[0].value).to_f64();
        let b = ((b1.value - b0.value) / b0.value).to_f64();
        if let (Some(p), Some(b)) = (p, b) {
            portfolio.push(p);
            reference.push(b);
        }
    }

    if portfolio.len() < 2 {
        return None;
    }

    let variance = reference.iter().variance();
    let beta = if variance > f64::EPSILON {
        portfolio.iter().covariance(reference.iter()) / variance
    } else {
        0.0
    };

    let rf = risk_free_rate / periods_per_year;
    let alpha = ((portfolio.iter().mean() - rf) - beta * (reference.iter().mean() - rf))
        * periods_per_year;

    let active: Vec<f64> = portfolio.iter().zip(&reference).map(|(p, b)| p - b).collect();
    let tracking_error = active.iter().std_dev() * periods_per_year.sqrt();

    let compared: Vec<bool> = periods
        .iter()
        .filter_map(|p| p.benchmark_return.map(|b| p.portfolio_return > b))
        .collect();
    let hit_rate = if compared.is_empty() {
        0.0
    } else {
        compared.iter().filter(|won| **won).count() as f64 / compared.len() as f64
    };

    Some(BenchmarkRelative {
        alpha,
        beta,
        tracking_error,
        hit_rate,
        paired_samples: portfolio.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn series(id: &str, values: &[i64]) -> ValueSeries {
        ValueSeries::daily(id, start(), values.iter().map(|v| Decimal::new(*v, 0))).unwrap()
    }

    fn period(portfolio: f64, benchmark: Option<f64>) -> PeriodRecord {
        PeriodRecord {
            rebalance_date: start(),
            period_end: start(),
            snapshot: PortfolioSnapshot::cash(start()),
            scored: 0,
            scoring_failures: 0,
            portfolio_return: portfolio,
            benchmark_return: benchmark,
            degraded: false,
        }
    }

    #[test]
    fn test_identical_series_has_unit_beta() {
        let curve = series("p", &[100, 102, 101, 105, 104]);
        let bench = series("b", &[100, 102, 101, 105, 104]);
        let rel = benchmark_relative(&curve, &bench, &[], 0.0, 252.0).unwrap();

        assert!((rel.beta - 1.0).abs() < 1e-9);
        assert!(rel.alpha.abs() < 1e-9);
        assert!(rel.tracking_error.abs() < 1e-9);
        assert_eq!(rel.paired_samples, 4);
    }

    #[test]
    fn test_double_leverage_beta() {
        let curve = series("p", &[1000, 1040, 1000, 1080]);
        let bench = series("b", &[1000, 1020, 1000, 1040]);
        let rel = benchmark_relative(&curve, &bench, &[], 0.0, 252.0).unwrap();

        assert!(rel.beta > 1.5);
        assert!(rel.tracking_error > 0.0);
    }

    #[test]
    fn test_hit_rate_counts_periods_with_benchmark() {
        let curve = series("p", &[100, 101, 102]);
        let bench = series("b", &[100, 100, 100]);
        let periods = vec![
            period(0.05, Some(0.01)),
            period(-0.02, Some(0.01)),
            period(0.03, None),
            period(0.04, Some(0.02)),
        ];
        let rel = benchmark_relative(&curve, &bench, &periods, 0.0, 252.0).unwrap();

        assert!((rel.hit_rate - 2.0 / 3.0).abs() < 1e-12);
        // flat benchmark has no variance
        assert_eq!(rel.beta, 0.0);
    }

    #[test]
    fn test_too_few_pairs() {
        let curve = series("p", &[100, 101]);
        let bench = series("b", &[100, 101]);
        assert!(benchmark_relative(&curve, &bench, &[], 0.0, 252.0).is_none());
    }
}
