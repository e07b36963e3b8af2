//! Backtest configuration and rebalance schedule.

use chrono::{Months, NaiveDate};
use fund_core::{Error, FundAttributes, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// How often the portfolio is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl Cadence {
    pub fn months(&self) -> u32 {
        match self {
            Cadence::Monthly => 1,
            Cadence::Quarterly => 3,
            Cadence::SemiAnnual => 6,
            Cadence::Annual => 12,
        }
    }
}

/// Rule turning a scored, ranked universe into holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionRule {
    /// Highest total scores across the filtered universe.
    TopN { n: usize },
    /// Highest total scores within each peer group.
    TopNPerPeerGroup { n: usize },
    /// Total score within `[min, max]`.
    ScoreRange { min: f64, max: f64 },
    /// Peer quartile in the given set (1 = top).
    Quartiles { quartiles: Vec<u8> },
    /// A fixed set of holdings, kept while they remain scoreable.
    FixedHoldings { entity_ids: Vec<String> },
    /// Apply rules in order; an entity chosen by an earlier rule is not chosen again.
    Union { rules: Vec<SelectionRule> },
}

impl SelectionRule {
    fn validate(&self) -> Result<()> {
        match self {
            SelectionRule::TopN { n } | SelectionRule::TopNPerPeerGroup { n } if *n == 0 => {
                Err(Error::config("selection rule n must be greater than zero"))
            }
            SelectionRule::ScoreRange { min, max } if min > max => {
                Err(Error::config("score range min exceeds max"))
            }
            SelectionRule::Quartiles { quartiles }
                if quartiles.is_empty() || quartiles.iter().any(|q| !(1..=4).contains(q)) =>
            {
                Err(Error::config("quartile filter must list quartiles 1-4"))
            }
            SelectionRule::Union { rules } => {
                if rules.is_empty() {
                    return Err(Error::config("union rule has no members"));
                }
                rules.iter().try_for_each(|r| r.validate())
            }
            _ => Ok(()),
        }
    }
}

/// Peer-group filter applied before any selection rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerFilter {
    /// Allowed categories; empty allows all.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Allowed subcategories; empty allows all.
    #[serde(default)]
    pub subcategories: Vec<String>,
}

impl PeerFilter {
    pub fn matches(&self, attributes: &FundAttributes) -> bool {
        let key = &attributes.peer_key;
        let category_ok = self.categories.is_empty() || self.categories.contains(&key.category);
        let subcategory_ok = self.subcategories.is_empty()
            || key
                .subcategory
                .as_ref()
                .is_some_and(|s| self.subcategories.contains(s));
        category_ok && subcategory_ok
    }
}

/// Configuration for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub run_id: Uuid,
    /// Human-readable key stored with the result.
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub cadence: Cadence,
    pub rule: SelectionRule,
    #[serde(default)]
    pub peer_filter: PeerFilter,
    /// Sum of holding weights; the remainder is held as cash.
    pub gross_exposure: Decimal,
    /// Reference index for benchmark-relative figures.
    #[serde(default)]
    pub benchmark_id: Option<String>,
    /// Per-period scoring deadline.
    #[serde(default)]
    pub period_timeout_secs: Option<u64>,
}

impl BacktestConfig {
    pub fn new(start: NaiveDate, end: NaiveDate, rule: SelectionRule) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            label: "backtest".to_string(),
            start,
            end,
            cadence: Cadence::Quarterly,
            rule,
            peer_filter: PeerFilter::default(),
            gross_exposure: Decimal::ONE,
            benchmark_id: None,
            period_timeout_secs: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn peer_filter(mut self, filter: PeerFilter) -> Self {
        self.peer_filter = filter;
        self
    }

    pub fn gross_exposure(mut self, exposure: Decimal) -> Self {
        self.gross_exposure = exposure;
        self
    }

    pub fn benchmark(mut self, benchmark_id: impl Into<String>) -> Self {
        self.benchmark_id = Some(benchmark_id.into());
        self
    }

    pub fn period_timeout(&self) -> Option<Duration> {
        self.period_timeout_secs.map(Duration::from_secs)
    }

    /// Rebalance dates `start, start + cadence, ...` strictly before `end`.
    pub fn rebalance_schedule(&self) -> Vec<NaiveDate> {
        let step = self.cadence.months();
        let mut dates = Vec::new();
        for k in 0u32.. {
            match self.start.checked_add_months(Months::new(k * step)) {
                Some(date) if date < self.end => dates.push(date),
                _ => break,
            }
        }
        dates
    }

    /// Configuration errors are fatal to the whole run.
    pub fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(Error::config(format!(
                "backtest end {} must be after start {}",
                self.end, self.start
            )));
        }
        if self.gross_exposure <= Decimal::ZERO {
            return Err(Error::config("gross exposure must be positive"));
        }
        if self.rebalance_schedule().is_empty() {
            return Err(Error::config("rebalance schedule is empty"));
        }
        self.rule.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fund_core::PeerKey;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_quarterly_schedule() {
        let config = BacktestConfig::new(date(2023, 1, 31), date(2024, 1, 1), SelectionRule::TopN { n: 5 });
        assert_eq!(
            config.rebalance_schedule(),
            vec![date(2023, 1, 31), date(2023, 4, 30), date(2023, 7, 31), date(2023, 10, 31)]
        );
    }

    #[test]
    fn test_monthly_schedule_excludes_end() {
        let config = BacktestConfig::new(date(2024, 1, 1), date(2024, 4, 1), SelectionRule::TopN { n: 1 })
            .cadence(Cadence::Monthly);
        assert_eq!(config.rebalance_schedule().len(), 3);
    }

    #[test]
    fn test_end_before_start_is_fatal() {
        let config = BacktestConfig::new(date(2024, 1, 1), date(2024, 1, 1), SelectionRule::TopN { n: 1 });
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_rule_validation() {
        let base = BacktestConfig::new(date(2023, 1, 1), date(2024, 1, 1), SelectionRule::TopN { n: 0 });
        assert!(base.validate().is_err());

        let quartiles = BacktestConfig {
            rule: SelectionRule::Quartiles { quartiles: vec![5] },
            ..base.clone()
        };
        assert!(quartiles.validate().is_err());

        let range = BacktestConfig {
            rule: SelectionRule::ScoreRange { min: 80.0, max: 60.0 },
            ..base.clone()
        };
        assert!(range.validate().is_err());

        let ok = BacktestConfig {
            rule: SelectionRule::Union {
                rules: vec![
                    SelectionRule::FixedHoldings { entity_ids: vec!["a".into()] },
                    SelectionRule::TopN { n: 3 },
                ],
            },
            ..base
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_zero_exposure_is_fatal() {
        let config = BacktestConfig::new(date(2023, 1, 1), date(2024, 1, 1), SelectionRule::TopN { n: 1 })
            .gross_exposure(Decimal::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_peer_filter() {
        let filter = PeerFilter {
            categories: vec!["equity".into()],
            subcategories: vec![],
        };
        let equity = FundAttributes::new("a", PeerKey::new("equity").with_subcategory("mid_cap"));
        let debt = FundAttributes::new("b", PeerKey::new("debt"));
        assert!(filter.matches(&equity));
        assert!(!filter.matches(&debt));
        assert!(PeerFilter::default().matches(&debt));
    }

    #[test]
    fn test_config_json() {
        let json = r#"{
            "run_id": "6a2f41a3-c54c-fce8-32d2-0324e1c32e22",
            "label": "top-decile",
            "start": "2020-01-01",
            "end": "2023-01-01",
            "cadence": "semi_annual",
            "rule": { "type": "top_n", "n": 10 },
            "gross_exposure": "0.95"
        }"#;
        let config: BacktestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cadence, Cadence::SemiAnnual);
        assert_eq!(config.rule, SelectionRule::TopN { n: 10 });
        assert_eq!(config.rebalance_schedule().len(), 6);
        assert!(config.validate().is_ok());
    }
}
