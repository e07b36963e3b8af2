//! Recommendation tiers and tier overrides.

use fund_core::config::ScoringSettings;
use fund_core::{RecommendationTier, TierOverride};
use serde::{Deserialize, Serialize};

/// Minimum total score for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBreakpoint {
    pub min_score: f64,
    pub tier: RecommendationTier,
}

/// Score breakpoints plus thresholds for the ordered overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Descending by `min_score`; scores below the last breakpoint are strong sell.
    pub breakpoints: Vec<TierBreakpoint>,
    pub catastrophic_drawdown: f64,
    /// `None` means half of the ceiling sum.
    pub median_score: Option<f64>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            breakpoints: vec![
                TierBreakpoint { min_score: 85.0, tier: RecommendationTier::StrongBuy },
                TierBreakpoint { min_score: 70.0, tier: RecommendationTier::Buy },
                TierBreakpoint { min_score: 55.0, tier: RecommendationTier::Hold },
                TierBreakpoint { min_score: 40.0, tier: RecommendationTier::Sell },
            ],
            catastrophic_drawdown: 0.5,
            median_score: None,
        }
    }
}

impl TierConfig {
    pub fn from_settings(settings: &ScoringSettings) -> Self {
        Self {
            catastrophic_drawdown: settings.catastrophic_drawdown,
            median_score: settings.median_score,
            ..Default::default()
        }
    }

    pub fn base_tier(&self, total_score: f64) -> RecommendationTier {
        self.breakpoints
            .iter()
            .find(|b| total_score >= b.min_score)
            .map_or(RecommendationTier::StrongSell, |b| b.tier)
    }

    /// Apply overrides in order after the base lookup.
    ///
    /// 1. Drawdown above the catastrophic threshold caps the tier at hold.
    /// 2. Negative Sharpe with a total below the median caps the tier at sell.
    ///
    /// Overrides only ever lower a tier: a "forced" sell leaves a strong-sell
    /// base where it is. Every override whose condition holds is recorded,
    /// in order.
    pub fn apply_overrides(
        &self,
        base: RecommendationTier,
        total_score: f64,
        max_drawdown: Option<f64>,
        sharpe: Option<f64>,
        ceiling_sum: f64,
    ) -> (RecommendationTier, Vec<TierOverride>) {
        let mut tier = base;
        let mut applied = Vec::new();

        if max_drawdown.is_some_and(|dd| dd > self.catastrophic_drawdown) {
            tier = tier.cap_at(RecommendationTier::Hold);
            applied.push(TierOverride::CatastrophicDrawdown);
        }

        let median = self.median_score.unwrap_or(ceiling_sum / 2.0);
        if sharpe.is_some_and(|s| s < 0.0) && total_score < median {
            tier = tier.cap_at(RecommendationTier::Sell);
            applied.push(TierOverride::NegativeSharpeBelowMedian);
        }

        (tier, applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_tier_breakpoints() {
        let config = TierConfig::default();
        assert_eq!(config.base_tier(92.0), RecommendationTier::StrongBuy);
        assert_eq!(config.base_tier(85.0), RecommendationTier::StrongBuy);
        assert_eq!(config.base_tier(84.9), RecommendationTier::Buy);
        assert_eq!(config.base_tier(60.0), RecommendationTier::Hold);
        assert_eq!(config.base_tier(40.0), RecommendationTier::Sell);
        assert_eq!(config.base_tier(12.0), RecommendationTier::StrongSell);
    }

    #[test]
    fn test_catastrophic_drawdown_caps_at_hold() {
        let config = TierConfig::default();
        let (tier, applied) =
            config.apply_overrides(RecommendationTier::StrongBuy, 90.0, Some(0.6), Some(1.2), 100.0);
        assert_eq!(tier, RecommendationTier::Hold);
        assert_eq!(applied, vec![TierOverride::CatastrophicDrawdown]);
    }

    #[test]
    fn test_drawdown_cap_never_upgrades() {
        let config = TierConfig::default();
        let (tier, _) =
            config.apply_overrides(RecommendationTier::Sell, 45.0, Some(0.7), None, 100.0);
        assert_eq!(tier, RecommendationTier::Sell);
    }

    #[test]
    fn test_negative_sharpe_below_median_forces_sell() {
        let config = TierConfig::default();
        let (tier, applied) =
            config.apply_overrides(RecommendationTier::Hold, 49.0, Some(0.1), Some(-0.3), 100.0);
        assert_eq!(tier, RecommendationTier::Sell);
        assert_eq!(applied, vec![TierOverride::NegativeSharpeBelowMedian]);

        // Above the median the negative Sharpe alone does nothing
        let (tier, applied) =
            config.apply_overrides(RecommendationTier::Hold, 58.0, Some(0.1), Some(-0.3), 100.0);
        assert_eq!(tier, RecommendationTier::Hold);
        assert!(applied.is_empty());
    }

    #[test]
    fn test_negative_sharpe_keeps_strong_sell() {
        let config = TierConfig::default();
        let (tier, applied) =
            config.apply_overrides(RecommendationTier::StrongSell, 20.0, None, Some(-0.8), 100.0);
        assert_eq!(tier, RecommendationTier::StrongSell);
        assert_eq!(applied, vec![TierOverride::NegativeSharpeBelowMedian]);
    }

    #[test]
    fn test_overrides_apply_in_order() {
        let config = TierConfig::default();
        let (tier, applied) =
            config.apply_overrides(RecommendationTier::Buy, 30.0, Some(0.8), Some(-1.0), 100.0);
        assert_eq!(tier, RecommendationTier::Sell);
        assert_eq!(
            applied,
            vec![TierOverride::CatastrophicDrawdown, TierOverride::NegativeSharpeBelowMedian]
        );
    }

    #[test]
    fn test_missing_inputs_trigger_nothing() {
        let config = TierConfig::default();
        let (tier, applied) =
            config.apply_overrides(RecommendationTier::Buy, 72.0, None, None, 100.0);
        assert_eq!(tier, RecommendationTier::Buy);
        assert!(applied.is_empty());
    }
}
