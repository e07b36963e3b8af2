//! Risk metric types and the pure helpers behind them.

use chrono::NaiveDate;
use fund_core::types::NavPoint;
use fund_core::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};
use std::collections::{BTreeMap, HashMap};

/// Neutral capture value used when a ratio is degenerate.
pub const NEUTRAL_CAPTURE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMeasure {
    Volatility,
    Sharpe,
    Sortino,
    MaxDrawdown,
    Capture,
}

/// Largest peak-to-trough decline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
    /// Fraction of the peak, in `[0, 1]`.
    pub magnitude: f64,
    pub peak_date: NaiveDate,
    pub trough_date: NaiveDate,
}

/// Fund behaviour relative to a benchmark over paired daily returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    /// Mean fund return on benchmark-up days over the mean fund return on
    /// benchmark-down days. Negative for a fund that rises with the
    /// benchmark and falls with it.
    pub ratio: f64,
    pub up_capture: f64,
    pub down_capture: f64,
    pub paired_samples: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Annualized standard deviation of daily returns.
    pub volatility: Option<f64>,
    /// Annualized standard deviation of the negative daily returns.
    pub downside_deviation: Option<f64>,
    /// Annualized return across the volatility window.
    pub window_return: Option<f64>,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub max_drawdown: Option<Drawdown>,
    /// `None` when no benchmark was supplied.
    pub capture: Option<Capture>,
    /// Daily returns inside the volatility window.
    pub samples: usize,
    pub insufficient: BTreeMap<RiskMeasure, String>,
}

impl RiskMetrics {
    pub fn capture_ratio(&self) -> Option<f64> {
        self.capture.map(|c| c.ratio)
    }

    pub fn drawdown_magnitude(&self) -> Option<f64> {
        self.max_drawdown.map(|d| d.magnitude)
    }
}

/// Sample standard deviation, 0 for fewer than two values.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    Data::new(values.to_vec()).std_dev().unwrap_or(0.0)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Data::new(values.to_vec()).mean()
}

/// `(excess / denominator)`, or 0 when the denominator is 0.
pub(crate) fn ratio_or_zero(excess: f64, denominator: f64) -> f64 {
    if denominator.abs() <= f64::EPSILON || !denominator.is_finite() {
        0.0
    } else {
        excess / denominator
    }
}

/// Single pass over the points tracking the running peak.
pub fn max_drawdown(points: &[NavPoint]) -> Result<Drawdown> {
    let first = points
        .first()
        .ok_or_else(|| Error::insufficient("max drawdown needs at least one point"))?;

    let mut peak = *first;
    let mut worst = Drawdown {
        magnitude: 0.0,
        peak_date: first.date,
        trough_date: first.date,
    };

    for point in points {
        if point.value > peak.value {
            peak = *point;
        }
        let drawdown = ((peak.value - point.value) / peak.value)
            .to_f64()
            .unwrap_or(0.0);
        if drawdown > worst.magnitude {
            worst = Drawdown {
                magnitude: drawdown,
                peak_date: peak.date,
                trough_date: point.date,
            };
        }
    }

    worst.magnitude = worst.magnitude.clamp(0.0, 1.0);
    Ok(worst)
}

/// Pair fund and benchmark daily returns by date and compute capture figures.
pub fn capture(fund: &[(NaiveDate, f64)], benchmark: &[(NaiveDate, f64)]) -> Capture {
    let bench_by_date: HashMap<NaiveDate, f64> = benchmark.iter().copied().collect();

    let mut fund_up = Vec::new();
    let mut fund_down = Vec::new();
    let mut bench_up = Vec::new();
    let mut bench_down = Vec::new();

    for (date, fund_return) in fund {
        let Some(bench_return) = bench_by_date.get(date) else {
            continue;
        };
        if *bench_return > 0.0 {
            fund_up.push(*fund_return);
            bench_up.push(*bench_return);
        } else if *bench_return < 0.0 {
            fund_down.push(*fund_return);
            bench_down.push(*bench_return);
        }
    }

    let ratio = match (mean(&fund_up), mean(&fund_down)) {
        (Some(up), Some(down)) if down != 0.0 => up / down,
        _ => NEUTRAL_CAPTURE,
    };
    let relative = |f: &[f64], b: &[f64]| match (mean(f), mean(b)) {
        (Some(f), Some(b)) if b != 0.0 => f / b,
        _ => NEUTRAL_CAPTURE,
    };

    Capture {
        ratio,
        up_capture: relative(&fund_up, &bench_up),
        down_capture: relative(&fund_down, &bench_down),
        paired_samples: fund_up.len() + fund_down.len(),
    }
}

/// Compound annualized growth between two points.
pub fn annualize(start: Decimal, end: Decimal, days: i64) -> f64 {
    if days <= 0 || start <= Decimal::ZERO {
        return 0.0;
    }
    if start == end {
        return 0.0;
    }
    let growth = (end / start).to_f64().unwrap_or(1.0);
    growth.powf(365.25 / days as f64) - 1.0
}
