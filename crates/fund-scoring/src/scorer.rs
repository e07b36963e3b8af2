//! Composite scorer.

use chrono::{NaiveDate, Utc};
use fund_core::config::ScoringSettings;
use fund_core::{FundAttributes, Result, ScoreFamily, ScoreInput, ScoreRecord};
use fund_metrics::{FundMetrics, ReturnPeriod};
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;
use tracing::debug;

use crate::ladder::LadderBook;
use crate::tier::TierConfig;

/// Combines metrics and fundamentals into a [`ScoreRecord`].
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
    book: LadderBook,
    tiers: TierConfig,
}

impl CompositeScorer {
    pub fn new(book: LadderBook, tiers: TierConfig) -> Self {
        Self { book, tiers }
    }

    /// Build from settings, loading the ladder file when one is configured.
    pub fn from_settings(settings: &ScoringSettings) -> Result<Self> {
        let book = match &settings.ladder_file {
            Some(path) => LadderBook::load(path)?,
            None => LadderBook::default(),
        };
        Ok(Self::new(book, TierConfig::from_settings(settings)))
    }

    pub fn book(&self) -> &LadderBook {
        &self.book
    }

    pub fn tiers(&self) -> &TierConfig {
        &self.tiers
    }

    /// Observed value for each ladder input, `None` when unavailable.
    fn observe(
        input: ScoreInput,
        metrics: &FundMetrics,
        attributes: &FundAttributes,
        as_of: NaiveDate,
    ) -> Option<f64> {
        let risk = &metrics.risk;
        let value = match input {
            ScoreInput::Return3m => metrics.returns.value(ReturnPeriod::ThreeMonth),
            ScoreInput::Return6m => metrics.returns.value(ReturnPeriod::SixMonth),
            ScoreInput::Return1y => metrics.returns.value(ReturnPeriod::OneYear),
            ScoreInput::Return3y => metrics.returns.value(ReturnPeriod::ThreeYear),
            ScoreInput::Return5y => metrics.returns.value(ReturnPeriod::FiveYear),
            ScoreInput::ReturnYtd => metrics.returns.value(ReturnPeriod::Ytd),
            ScoreInput::Volatility => risk.volatility,
            ScoreInput::Sharpe => risk.sharpe,
            ScoreInput::Sortino => risk.sortino,
            ScoreInput::MaxDrawdown => risk.drawdown_magnitude(),
            // ladders grade the magnitude of up-day over down-day returns
            ScoreInput::CaptureRatio => risk.capture_ratio().map(f64::abs),
            ScoreInput::ExpenseRatio => attributes.expense_ratio.and_then(|d| d.to_f64()),
            ScoreInput::Aum => attributes.aum.and_then(|d| d.to_f64()),
            ScoreInput::TrackRecord => attributes.track_record_years(as_of),
        };
        value.filter(|v| v.is_finite())
    }

    /// Score one entity. Missing inputs contribute 0 and mark the record degraded.
    pub fn score(&self, metrics: &FundMetrics, attributes: &FundAttributes) -> ScoreRecord {
        let as_of = metrics.as_of;
        let set = self.book.for_category(&attributes.peer_key.category);

        let mut inputs = BTreeMap::new();
        let mut sub_scores = BTreeMap::new();
        let mut missing = Vec::new();
        let mut raw_family: BTreeMap<ScoreFamily, f64> = BTreeMap::new();

        for (input, ladder) in &set.ladders {
            let points = match Self::observe(*input, metrics, attributes, as_of) {
                Some(value) => {
                    inputs.insert(*input, value);
                    ladder.evaluate(value)
                }
                None => {
                    missing.push(*input);
                    0.0
                }
            };
            sub_scores.insert(*input, points);
            *raw_family.entry(input.family()).or_insert(0.0) += points;
        }

        let family_scores: BTreeMap<ScoreFamily, f64> = ScoreFamily::ALL
            .iter()
            .map(|family| {
                let raw = raw_family.get(family).copied().unwrap_or(0.0);
                (*family, raw.clamp(0.0, set.ceiling(*family)))
            })
            .collect();

        let ceiling_sum = set.ceiling_sum();
        let total_score = family_scores.values().sum::<f64>().clamp(0.0, ceiling_sum);

        let base_tier = self.tiers.base_tier(total_score);
        let (tier, overrides) = self.tiers.apply_overrides(
            base_tier,
            total_score,
            metrics.risk.drawdown_magnitude(),
            metrics.risk.sharpe,
            ceiling_sum,
        );

        debug!(
            entity = %attributes.entity_id,
            %as_of,
            total_score,
            tier = %tier,
            missing = missing.len(),
            "Scored entity"
        );

        ScoreRecord {
            entity_id: attributes.entity_id.clone(),
            as_of,
            peer_key: attributes.peer_key.clone(),
            inputs,
            sub_scores,
            family_scores,
            total_score,
            base_tier,
            tier,
            overrides,
            degraded: !missing.is_empty(),
            missing_inputs: missing,
            ladder_version: set.version.clone(),
            provenance: attributes.provenance,
            computed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::{LadderSet, ThresholdLadder};
    use fund_core::{PeerKey, RecommendationTier, TierOverride};
    use fund_metrics::{Drawdown, ReturnMetrics, RiskMetrics};
    use rust_decimal::Decimal;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn metrics(returns: &[(ReturnPeriod, f64)], risk: RiskMetrics) -> FundMetrics {
        FundMetrics {
            entity_id: "fund-a".to_string(),
            as_of: as_of(),
            returns: ReturnMetrics {
                returns: returns.iter().copied().collect(),
                insufficient: BTreeMap::new(),
            },
            risk,
        }
    }

    fn drawdown(magnitude: f64) -> Option<Drawdown> {
        Some(Drawdown {
            magnitude,
            peak_date: as_of(),
            trough_date: as_of(),
        })
    }

    fn strong_risk() -> RiskMetrics {
        RiskMetrics {
            volatility: Some(0.07),
            sharpe: Some(1.8),
            sortino: Some(2.5),
            max_drawdown: drawdown(0.05),
            capture: Some(fund_metrics::Capture {
                ratio: -1.5,
                up_capture: 1.1,
                down_capture: 0.8,
                paired_samples: 300,
            }),
            ..Default::default()
        }
    }

    fn full_attributes() -> FundAttributes {
        FundAttributes::new("fund-a", PeerKey::new("equity"))
            .with_expense_ratio(Decimal::new(4, 3))
            .with_aum(Decimal::new(20_000_000_000, 0))
            .with_inception_date(NaiveDate::from_ymd_opt(2010, 1, 1).unwrap())
    }

    fn all_periods(value: f64) -> Vec<(ReturnPeriod, f64)> {
        ReturnPeriod::ALL.iter().map(|p| (*p, value)).collect()
    }

    #[test]
    fn test_perfect_fund_hits_ceiling() {
        let scorer = CompositeScorer::default();
        let record = scorer.score(&metrics(&all_periods(0.3), strong_risk()), &full_attributes());

        assert_eq!(record.total_score, 100.0);
        assert_eq!(record.family_score(ScoreFamily::Returns), 40.0);
        assert_eq!(record.tier, RecommendationTier::StrongBuy);
        assert!(!record.degraded);
        assert!(record.missing_inputs.is_empty());
        assert_eq!(record.ladder_version, "standard-v1");
    }

    #[test]
    fn test_one_year_return_contributes() {
        let scorer = CompositeScorer::default();
        let record = scorer.score(
            &metrics(&[(ReturnPeriod::OneYear, 0.10)], RiskMetrics::default()),
            &FundAttributes::new("fund-a", PeerKey::new("equity")),
        );

        assert_eq!(record.sub_scores[&ScoreInput::Return1y], 6.0);
        assert!(record.total_score > 0.0);
        assert!(record.degraded);
    }

    #[test]
    fn test_missing_fundamentals_zero_only_their_sub_scores() {
        let scorer = CompositeScorer::default();
        let bare = FundAttributes::new("fund-a", PeerKey::new("equity"));
        let record = scorer.score(&metrics(&all_periods(0.3), strong_risk()), &bare);

        assert_eq!(record.family_score(ScoreFamily::Fundamentals), 0.0);
        assert_eq!(record.family_score(ScoreFamily::Returns), 40.0);
        assert_eq!(record.total_score, 70.0);
        assert!(record.degraded);
        assert_eq!(
            record.missing_inputs,
            vec![ScoreInput::ExpenseRatio, ScoreInput::Aum, ScoreInput::TrackRecord]
        );
    }

    #[test]
    fn test_family_capped_at_ceiling() {
        let mut set = LadderSet::standard();
        set.ceilings.insert(ScoreFamily::Returns, 20.0);
        set.ladders.insert(
            ScoreInput::Return1y,
            ThresholdLadder::higher_is_better(&[(0.0, 20.0)]),
        );
        set.ladders.insert(
            ScoreInput::Return3y,
            ThresholdLadder::higher_is_better(&[(0.0, 20.0)]),
        );
        let scorer = CompositeScorer::new(
            LadderBook { default: set, categories: BTreeMap::new() },
            TierConfig::default(),
        );
        let record = scorer.score(&metrics(&all_periods(0.3), strong_risk()), &full_attributes());

        assert_eq!(record.family_score(ScoreFamily::Returns), 20.0);
        assert!(record.total_score <= 80.0);
    }

    #[test]
    fn test_total_score_always_bounded() {
        let scorer = CompositeScorer::default();
        for value in [-5.0f64, -0.5, 0.0, 0.07, 0.5, 100.0] {
            let risk = RiskMetrics {
                volatility: Some(value.abs()),
                sharpe: Some(value),
                sortino: Some(value),
                max_drawdown: drawdown(value.abs().min(1.0)),
                ..Default::default()
            };
            let record = scorer.score(&metrics(&all_periods(value), risk), &full_attributes());
            assert!(
                (0.0..=100.0).contains(&record.total_score),
                "total {} out of range for {}",
                record.total_score,
                value
            );
        }
    }

    #[test]
    fn test_catastrophic_drawdown_override() {
        let scorer = CompositeScorer::default();
        let mut risk = strong_risk();
        risk.max_drawdown = drawdown(0.65);
        let record = scorer.score(&metrics(&all_periods(0.3), risk), &full_attributes());

        assert_eq!(record.base_tier, RecommendationTier::StrongBuy);
        assert_eq!(record.tier, RecommendationTier::Hold);
        assert_eq!(record.overrides, vec![TierOverride::CatastrophicDrawdown]);
    }

    #[test]
    fn test_negative_sharpe_below_median_is_sell() {
        let scorer = CompositeScorer::default();
        let risk = RiskMetrics {
            volatility: Some(0.25),
            sharpe: Some(-0.4),
            sortino: Some(-0.5),
            max_drawdown: drawdown(0.35),
            ..Default::default()
        };
        let record = scorer.score(&metrics(&all_periods(0.01), risk), &full_attributes());

        assert!(record.total_score < 50.0);
        assert!(record.tier <= RecommendationTier::Sell);
        assert!(record.overrides.contains(&TierOverride::NegativeSharpeBelowMedian));
    }

    #[test]
    fn test_category_ladder_is_used() {
        let mut debt = LadderSet::standard();
        debt.version = "debt-v1".to_string();
        let scorer = CompositeScorer::new(
            LadderBook::default().with_category("debt", debt),
            TierConfig::default(),
        );
        let attrs = FundAttributes::new("fund-d", PeerKey::new("debt"));
        let record = scorer.score(&metrics(&[], RiskMetrics::default()), &attrs);

        assert_eq!(record.ladder_version, "debt-v1");
        assert_eq!(record.total_score, 0.0);
        assert_eq!(record.tier, RecommendationTier::StrongSell);
    }
}
