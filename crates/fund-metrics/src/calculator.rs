//! Metrics calculator over a single value series.

use chrono::{Duration, NaiveDate};
use fund_core::config::MetricsConfig;
use fund_core::types::{point_returns, ValueSeries};
use fund_core::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::period::{ReturnMetrics, ReturnPeriod};
use crate::risk::{self, ratio_or_zero, std_dev, RiskMeasure, RiskMetrics};

/// Return and risk metrics for one entity as of one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundMetrics {
    pub entity_id: String,
    pub as_of: NaiveDate,
    pub returns: ReturnMetrics,
    pub risk: RiskMetrics,
}

/// Trailing-window statistics shared by volatility, Sharpe and Sortino.
struct WindowStats {
    samples: usize,
    volatility: f64,
    downside_deviation: f64,
    annualized_return: f64,
}

/// Stateless calculator parameterized by [`MetricsConfig`].
#[derive(Debug, Clone, Default)]
pub struct MetricsCalculator {
    config: MetricsConfig,
}

impl MetricsCalculator {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Return for one trailing period ending at `as_of`.
    ///
    /// The start value is the latest point on or before the period boundary;
    /// the end value is the latest point on or before `as_of`.
    pub fn period_return(
        &self,
        series: &ValueSeries,
        as_of: NaiveDate,
        period: ReturnPeriod,
    ) -> Result<f64> {
        let end = series
            .latest_on_or_before(as_of)
            .ok_or_else(|| Error::insufficient(format!("no value on or before {}", as_of)))?;
        let boundary = period
            .start_boundary(as_of)
            .ok_or_else(|| Error::insufficient(format!("{} boundary out of range", period)))?;
        let start = series.latest_on_or_before(boundary).ok_or_else(|| {
            Error::insufficient(format!(
                "{} return needs a value on or before {}",
                period, boundary
            ))
        })?;

        if end.date <= start.date {
            return Err(Error::insufficient(format!(
                "{} return has no value after {}",
                period, start.date
            )));
        }

        if period.is_annualized() {
            let days = (end.date - start.date).num_days();
            Ok(risk::annualize(start.value, end.value, days))
        } else {
            Ok(((end.value - start.value) / start.value)
                .to_f64()
                .unwrap_or(0.0))
        }
    }

    /// Every period in [`ReturnPeriod::ALL`]; one period failing does not affect the others.
    pub fn return_metrics(&self, series: &ValueSeries, as_of: NaiveDate) -> ReturnMetrics {
        let mut metrics = ReturnMetrics::default();
        for period in ReturnPeriod::ALL {
            metrics.record(period, self.period_return(series, as_of, period));
        }
        metrics
    }

    fn window_start(&self, as_of: NaiveDate) -> NaiveDate {
        as_of - Duration::days(self.config.volatility_lookback_days)
    }

    /// Daily returns inside the trailing window ending at `as_of`.
    fn window_returns(&self, series: &ValueSeries, as_of: NaiveDate) -> Vec<(NaiveDate, f64)> {
        point_returns(series.range(self.window_start(as_of), as_of))
    }

    fn window_stats(&self, series: &ValueSeries, as_of: NaiveDate) -> Result<WindowStats> {
        let window = series.range(self.window_start(as_of), as_of);
        let returns: Vec<f64> = point_returns(window).into_iter().map(|(_, r)| r).collect();
        let required = self.config.required_samples();

        if returns.len() < required {
            return Err(Error::insufficient(format!(
                "{} daily returns in window, {} required",
                returns.len(),
                required
            )));
        }

        let annualization = self.config.trading_periods_per_year.sqrt();
        let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();

        let annualized_return = match (window.first(), window.last()) {
            (Some(first), Some(last)) => {
                risk::annualize(first.value, last.value, (last.date - first.date).num_days())
            }
            _ => 0.0,
        };

        Ok(WindowStats {
            samples: returns.len(),
            volatility: std_dev(&returns) * annualization,
            downside_deviation: std_dev(&negatives) * annualization,
            annualized_return,
        })
    }

    /// Annualized volatility of daily returns over the trailing window.
    pub fn volatility(&self, series: &ValueSeries, as_of: NaiveDate) -> Result<f64> {
        self.window_stats(series, as_of).map(|s| s.volatility)
    }

    /// `(annualized return - risk-free rate) / volatility`, 0 when volatility is 0.
    pub fn sharpe_ratio(&self, series: &ValueSeries, as_of: NaiveDate) -> Result<f64> {
        let stats = self.window_stats(series, as_of)?;
        Ok(ratio_or_zero(
            stats.annualized_return - self.config.risk_free_rate,
            stats.volatility,
        ))
    }

    /// Like Sharpe with downside deviation as the denominator.
    pub fn sortino_ratio(&self, series: &ValueSeries, as_of: NaiveDate) -> Result<f64> {
        let stats = self.window_stats(series, as_of)?;
        Ok(ratio_or_zero(
            stats.annualized_return - self.config.risk_free_rate,
            stats.downside_deviation,
        ))
    }

    pub fn max_drawdown(&self, series: &ValueSeries, as_of: NaiveDate) -> Result<risk::Drawdown> {
        risk::max_drawdown(series.truncated(as_of).points())
    }

    /// Capture figures over the trailing window; neutral when degenerate.
    pub fn capture(
        &self,
        series: &ValueSeries,
        benchmark: &ValueSeries,
        as_of: NaiveDate,
    ) -> risk::Capture {
        risk::capture(
            &self.window_returns(series, as_of),
            &self.window_returns(benchmark, as_of),
        )
    }

    pub fn capture_ratio(&self, series: &ValueSeries, benchmark: &ValueSeries, as_of: NaiveDate) -> f64 {
        self.capture(series, benchmark, as_of).ratio
    }

    /// `(up_capture, down_capture)`.
    pub fn up_down_capture(
        &self,
        series: &ValueSeries,
        benchmark: &ValueSeries,
        as_of: NaiveDate,
    ) -> (f64, f64) {
        let capture = self.capture(series, benchmark, as_of);
        (capture.up_capture, capture.down_capture)
    }

    /// All risk metrics; unavailable ones are listed in `insufficient`.
    pub fn risk_metrics(
        &self,
        series: &ValueSeries,
        as_of: NaiveDate,
        benchmark: Option<&ValueSeries>,
    ) -> RiskMetrics {
        let mut metrics = RiskMetrics::default();

        match self.window_stats(series, as_of) {
            Ok(stats) => {
                let excess = stats.annualized_return - self.config.risk_free_rate;
                metrics.samples = stats.samples;
                metrics.volatility = Some(stats.volatility);
                metrics.downside_deviation = Some(stats.downside_deviation);
                metrics.window_return = Some(stats.annualized_return);
                metrics.sharpe = Some(ratio_or_zero(excess, stats.volatility));
                metrics.sortino = Some(ratio_or_zero(excess, stats.downside_deviation));
            }
            Err(e) => {
                let reason = e.to_string();
                for measure in [RiskMeasure::Volatility, RiskMeasure::Sharpe, RiskMeasure::Sortino] {
                    metrics.insufficient.insert(measure, reason.clone());
                }
            }
        }

        match self.max_drawdown(series, as_of) {
            Ok(dd) => metrics.max_drawdown = Some(dd),
            Err(e) => {
                metrics.insufficient.insert(RiskMeasure::MaxDrawdown, e.to_string());
            }
        }

        if let Some(benchmark) = benchmark {
            metrics.capture = Some(self.capture(series, benchmark, as_of));
        }

        metrics
    }

    /// Return and risk metrics using only points dated on or before `as_of`.
    pub fn compute(
        &self,
        series: &ValueSeries,
        as_of: NaiveDate,
        benchmark: Option<&ValueSeries>,
    ) -> Result<FundMetrics> {
        let visible = series.truncated(as_of);
        if visible.is_empty() {
            return Err(Error::insufficient(format!(
                "{} has no values on or before {}",
                series.entity_id(),
                as_of
            )));
        }
        let benchmark = benchmark.map(|b| b.truncated(as_of));

        let returns = self.return_metrics(&visible, as_of);
        let risk = self.risk_metrics(&visible, as_of, benchmark.as_ref());

        debug!(
            entity = series.entity_id(),
            %as_of,
            returns = returns.returns.len(),
            risk_gaps = risk.insufficient.len(),
            "Computed metrics"
        );

        Ok(FundMetrics {
            entity_id: series.entity_id().to_string(),
            as_of,
            returns,
            risk,
        })
    }
}

/// Convenience used by tests and benches: a daily series from f64 values.
pub fn series_from_f64(entity_id: &str, start: NaiveDate, values: &[f64]) -> Result<ValueSeries> {
    let decimals = values
        .iter()
        .map(|v| Decimal::from_f64_retain(*v).ok_or_else(|| Error::invalid(format!("bad value {}", v))))
        .collect::<Result<Vec<_>>>()?;
    ValueSeries::daily(entity_id, start, decimals)
}
