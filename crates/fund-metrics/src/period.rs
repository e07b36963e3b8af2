//! Trailing return periods and per-period return results.

use chrono::{Datelike, Months, NaiveDate};
use fund_core::{Error, Result, ScoreInput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Trailing return period ending at the as-of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnPeriod {
    ThreeMonth,
    SixMonth,
    OneYear,
    ThreeYear,
    FiveYear,
    Ytd,
}

impl ReturnPeriod {
    pub const ALL: [ReturnPeriod; 6] = [
        ReturnPeriod::ThreeMonth,
        ReturnPeriod::SixMonth,
        ReturnPeriod::OneYear,
        ReturnPeriod::ThreeYear,
        ReturnPeriod::FiveYear,
        ReturnPeriod::Ytd,
    ];

    /// Calendar months covered, `None` for year-to-date.
    pub fn months(&self) -> Option<u32> {
        match self {
            ReturnPeriod::ThreeMonth => Some(3),
            ReturnPeriod::SixMonth => Some(6),
            ReturnPeriod::OneYear => Some(12),
            ReturnPeriod::ThreeYear => Some(36),
            ReturnPeriod::FiveYear => Some(60),
            ReturnPeriod::Ytd => None,
        }
    }

    /// Date the start value must be on or before.
    pub fn start_boundary(&self, as_of: NaiveDate) -> Option<NaiveDate> {
        match self.months() {
            Some(m) => as_of.checked_sub_months(Months::new(m)),
            None => NaiveDate::from_ymd_opt(as_of.year() - 1, 12, 31),
        }
    }

    /// Periods longer than one year are annualized.
    pub fn is_annualized(&self) -> bool {
        self.months().is_some_and(|m| m > 12)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReturnPeriod::ThreeMonth => "3m",
            ReturnPeriod::SixMonth => "6m",
            ReturnPeriod::OneYear => "1y",
            ReturnPeriod::ThreeYear => "3y",
            ReturnPeriod::FiveYear => "5y",
            ReturnPeriod::Ytd => "ytd",
        }
    }

    /// Ladder input scored from this period's return.
    pub fn score_input(&self) -> ScoreInput {
        match self {
            ReturnPeriod::ThreeMonth => ScoreInput::Return3m,
            ReturnPeriod::SixMonth => ScoreInput::Return6m,
            ReturnPeriod::OneYear => ScoreInput::Return1y,
            ReturnPeriod::ThreeYear => ScoreInput::Return3y,
            ReturnPeriod::FiveYear => ScoreInput::Return5y,
            ReturnPeriod::Ytd => ScoreInput::ReturnYtd,
        }
    }
}

impl fmt::Display for ReturnPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-period returns for one entity as of one date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnMetrics {
    pub returns: BTreeMap<ReturnPeriod, f64>,
    /// Periods that could not be computed, with the reason.
    pub insufficient: BTreeMap<ReturnPeriod, String>,
}

impl ReturnMetrics {
    pub fn get(&self, period: ReturnPeriod) -> Result<f64> {
        match self.returns.get(&period) {
            Some(value) => Ok(*value),
            None => Err(Error::insufficient(
                self.insufficient
                    .get(&period)
                    .cloned()
                    .unwrap_or_else(|| format!("{} return not computed", period)),
            )),
        }
    }

    pub fn value(&self, period: ReturnPeriod) -> Option<f64> {
        self.returns.get(&period).copied()
    }

    pub(crate) fn record(&mut self, period: ReturnPeriod, result: Result<f64>) {
        match result {
            Ok(value) => {
                self.returns.insert(period, value);
            }
            Err(e) => {
                self.insufficient.insert(period, e.to_string());
            }
        }
    }
}
