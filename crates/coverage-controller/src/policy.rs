//! Progressive relaxation of eligibility requirements.

use fund_core::config::{CoverageConfig, MetricsConfig, RelaxationStep};
use fund_core::{Error, Result, ValueSeries};

/// Ordered eligibility steps, strictest first.
///
/// Pass `i` uses step `i`; passes beyond the last step keep using it.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxationPolicy {
    steps: Vec<RelaxationStep>,
}

impl RelaxationPolicy {
    pub fn new(steps: Vec<RelaxationStep>) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::config("relaxation policy has no steps"));
        }
        if let Some(w) = steps
            .windows(2)
            .find(|w| w[1].min_history_days > w[0].min_history_days || w[1].min_points > w[0].min_points)
        {
            return Err(Error::config(format!(
                "relaxation step {:?} is stricter than the step before it",
                w[1]
            )));
        }
        Ok(Self { steps })
    }

    pub fn from_config(config: &CoverageConfig) -> Result<Self> {
        Self::new(config.relaxation.clone())
    }

    pub fn steps(&self) -> &[RelaxationStep] {
        &self.steps
    }

    pub fn step(&self, pass: usize) -> RelaxationStep {
        let last = self.steps.len() - 1;
        self.steps[pass.min(last)]
    }

    /// Whether `pass` already uses the loosest step.
    pub fn is_loosest(&self, pass: usize) -> bool {
        pass + 1 >= self.steps.len()
    }

    /// `InsufficientData` unless `series` meets the step's history requirements.
    pub fn check_eligible(step: &RelaxationStep, series: &ValueSeries) -> Result<()> {
        let days = series.history_days();
        if days < step.min_history_days {
            return Err(Error::insufficient(format!(
                "{} days of history, {} required",
                days, step.min_history_days
            )));
        }
        if series.len() < step.min_points {
            return Err(Error::insufficient(format!(
                "{} points, {} required",
                series.len(),
                step.min_points
            )));
        }
        Ok(())
    }

    /// Metric parameters for one step, layered over `base`.
    pub fn metrics_config(step: &RelaxationStep, base: &MetricsConfig) -> MetricsConfig {
        base.clone()
            .with_lookback_days(step.volatility_lookback_days)
            .with_min_samples(step.min_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fund_core::ErrorKind;
    use rust_decimal::Decimal;

    fn series(days: usize) -> ValueSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        ValueSeries::daily("f", start, (0..days).map(|i| Decimal::from(100 + i as i64))).unwrap()
    }

    #[test]
    fn test_default_policy_is_valid() {
        let policy = RelaxationPolicy::from_config(&CoverageConfig::default()).unwrap();
        assert_eq!(policy.steps().len(), 5);
        assert!(!policy.is_loosest(0));
        assert!(policy.is_loosest(4));
        assert_eq!(policy.step(99), policy.step(4));
    }

    #[test]
    fn test_empty_or_tightening_policy_is_rejected() {
        assert!(RelaxationPolicy::new(vec![]).is_err());
        let tightening = vec![
            RelaxationStep::new(90, 60, 90, 60),
            RelaxationStep::new(365, 250, 365, 250),
        ];
        assert!(matches!(RelaxationPolicy::new(tightening), Err(Error::Config { .. })));
    }

    #[test]
    fn test_eligibility() {
        let strict = RelaxationStep::new(365, 250, 365, 250);
        let loose = RelaxationStep::new(30, 20, 30, 20);
        let short = series(100);

        let err = RelaxationPolicy::check_eligible(&strict, &short).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert!(RelaxationPolicy::check_eligible(&loose, &short).is_ok());
    }

    #[test]
    fn test_metrics_config_follows_step() {
        let step = RelaxationStep::new(90, 60, 90, 60);
        let config = RelaxationPolicy::metrics_config(&step, &MetricsConfig::default());
        assert_eq!(config.volatility_lookback_days, 90);
        assert_eq!(config.required_samples(), 60);
    }
}
