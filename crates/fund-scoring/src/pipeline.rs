//! Metrics plus composite scoring for a single entity.

use chrono::NaiveDate;
use fund_core::config::MetricsConfig;
use fund_core::{FundAttributes, Result, ScoreRecord, ValueSeries};
use fund_metrics::MetricsCalculator;

use crate::scorer::CompositeScorer;

/// Calculator and scorer pair shared by scoring passes and backtests.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    calculator: MetricsCalculator,
    scorer: CompositeScorer,
}

impl ScoringEngine {
    pub fn new(calculator: MetricsCalculator, scorer: CompositeScorer) -> Self {
        Self { calculator, scorer }
    }

    /// Same scorer with different metric parameters.
    pub fn with_metrics_config(&self, config: MetricsConfig) -> Self {
        Self {
            calculator: MetricsCalculator::new(config),
            scorer: self.scorer.clone(),
        }
    }

    pub fn calculator(&self) -> &MetricsCalculator {
        &self.calculator
    }

    pub fn scorer(&self) -> &CompositeScorer {
        &self.scorer
    }

    /// Score `attributes.entity_id` as of `as_of` using only data dated on or before it.
    pub fn score_entity(
        &self,
        series: &ValueSeries,
        benchmark: Option<&ValueSeries>,
        attributes: &FundAttributes,
        as_of: NaiveDate,
    ) -> Result<ScoreRecord> {
        let metrics = self.calculator.compute(series, as_of, benchmark)?;
        Ok(self.scorer.score(&metrics, attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fund_core::{NavPoint, PeerKey};
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ten_percent_year_scores_positive() {
        let series = ValueSeries::new(
            "fund-a",
            vec![
                NavPoint::new(date(2023, 1, 1), Decimal::new(100, 0)),
                NavPoint::new(date(2024, 1, 1), Decimal::new(110, 0)),
            ],
        )
        .unwrap();
        let attrs = FundAttributes::new("fund-a", PeerKey::new("equity"));

        let engine = ScoringEngine::default();
        let record = engine
            .score_entity(&series, None, &attrs, date(2024, 1, 1))
            .unwrap();

        assert!(record.sub_scores[&fund_core::ScoreInput::Return1y] > 0.0);
        assert!(record.total_score > 0.0);
        assert!(record.degraded);
    }

    #[test]
    fn test_no_history_before_as_of_fails() {
        let series = ValueSeries::new(
            "fund-a",
            vec![NavPoint::new(date(2024, 1, 1), Decimal::new(100, 0))],
        )
        .unwrap();
        let attrs = FundAttributes::new("fund-a", PeerKey::new("equity"));
        let result = ScoringEngine::default().score_entity(&series, None, &attrs, date(2023, 1, 1));
        assert!(result.is_err());
    }

    #[test]
    fn test_relaxed_metrics_config() {
        let engine = ScoringEngine::default();
        let relaxed = engine.with_metrics_config(MetricsConfig::default().with_min_samples(10));
        assert_eq!(relaxed.calculator().config().required_samples(), 10);
        assert_eq!(engine.calculator().config().required_samples(), 250);
    }
}
