//! Score and ranking records produced by a scoring pass.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::fund::{DataProvenance, PeerKey};

/// Weighted family a sub-score belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFamily {
    Returns,
    Risk,
    Fundamentals,
}

impl ScoreFamily {
    pub const ALL: [ScoreFamily; 3] = [
        ScoreFamily::Returns,
        ScoreFamily::Risk,
        ScoreFamily::Fundamentals,
    ];
}

/// Individual observed input scored by one threshold ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreInput {
    #[serde(rename = "return_3m")]
    Return3m,
    #[serde(rename = "return_6m")]
    Return6m,
    #[serde(rename = "return_1y")]
    Return1y,
    #[serde(rename = "return_3y")]
    Return3y,
    #[serde(rename = "return_5y")]
    Return5y,
    ReturnYtd,
    Volatility,
    Sharpe,
    Sortino,
    MaxDrawdown,
    CaptureRatio,
    ExpenseRatio,
    Aum,
    TrackRecord,
}

impl ScoreInput {
    pub const ALL: [ScoreInput; 14] = [
        ScoreInput::Return3m,
        ScoreInput::Return6m,
        ScoreInput::Return1y,
        ScoreInput::Return3y,
        ScoreInput::Return5y,
        ScoreInput::ReturnYtd,
        ScoreInput::Volatility,
        ScoreInput::Sharpe,
        ScoreInput::Sortino,
        ScoreInput::MaxDrawdown,
        ScoreInput::CaptureRatio,
        ScoreInput::ExpenseRatio,
        ScoreInput::Aum,
        ScoreInput::TrackRecord,
    ];

    pub fn family(&self) -> ScoreFamily {
        match self {
            ScoreInput::Return3m
            | ScoreInput::Return6m
            | ScoreInput::Return1y
            | ScoreInput::Return3y
            | ScoreInput::Return5y
            | ScoreInput::ReturnYtd => ScoreFamily::Returns,
            ScoreInput::Volatility
            | ScoreInput::Sharpe
            | ScoreInput::Sortino
            | ScoreInput::MaxDrawdown
            | ScoreInput::CaptureRatio => ScoreFamily::Risk,
            ScoreInput::ExpenseRatio | ScoreInput::Aum | ScoreInput::TrackRecord => {
                ScoreFamily::Fundamentals
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreInput::Return3m => "return_3m",
            ScoreInput::Return6m => "return_6m",
            ScoreInput::Return1y => "return_1y",
            ScoreInput::Return3y => "return_3y",
            ScoreInput::Return5y => "return_5y",
            ScoreInput::ReturnYtd => "return_ytd",
            ScoreInput::Volatility => "volatility",
            ScoreInput::Sharpe => "sharpe",
            ScoreInput::Sortino => "sortino",
            ScoreInput::MaxDrawdown => "max_drawdown",
            ScoreInput::CaptureRatio => "capture_ratio",
            ScoreInput::ExpenseRatio => "expense_ratio",
            ScoreInput::Aum => "aum",
            ScoreInput::TrackRecord => "track_record",
        }
    }
}

impl fmt::Display for ScoreInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommendation tier, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationTier {
    StrongSell,
    Sell,
    Hold,
    Buy,
    StrongBuy,
}

impl RecommendationTier {
    /// The weaker of `self` and `ceiling`.
    pub fn cap_at(self, ceiling: RecommendationTier) -> RecommendationTier {
        self.min(ceiling)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationTier::StrongBuy => "strong_buy",
            RecommendationTier::Buy => "buy",
            RecommendationTier::Hold => "hold",
            RecommendationTier::Sell => "sell",
            RecommendationTier::StrongSell => "strong_sell",
        }
    }
}

impl fmt::Display for RecommendationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier override that changed (or could have changed) the base tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOverride {
    /// Max drawdown above the catastrophic threshold caps the tier at hold.
    CatastrophicDrawdown,
    /// Negative Sharpe with a below-median total forces sell.
    NegativeSharpeBelowMedian,
}

/// Composite score for one entity on one as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub entity_id: String,
    pub as_of: NaiveDate,
    pub peer_key: PeerKey,
    /// Raw observed values that fed the ladders.
    pub inputs: BTreeMap<ScoreInput, f64>,
    /// Ladder points per input; missing inputs score 0.
    pub sub_scores: BTreeMap<ScoreInput, f64>,
    pub family_scores: BTreeMap<ScoreFamily, f64>,
    pub total_score: f64,
    pub base_tier: RecommendationTier,
    pub tier: RecommendationTier,
    pub overrides: Vec<TierOverride>,
    pub degraded: bool,
    pub missing_inputs: Vec<ScoreInput>,
    pub ladder_version: String,
    pub provenance: DataProvenance,
    pub computed_at: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn family_score(&self, family: ScoreFamily) -> f64 {
        self.family_scores.get(&family).copied().unwrap_or(0.0)
    }

    pub fn input(&self, input: ScoreInput) -> Option<f64> {
        self.inputs.get(&input).copied()
    }
}

/// Peer-relative position of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub entity_id: String,
    pub peer_key: PeerKey,
    pub as_of: NaiveDate,
    /// 1 is best.
    pub rank: usize,
    pub total_in_group: usize,
    pub percentile: f64,
    /// 1 (top) through 4.
    pub quartile: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_input_has_a_family() {
        let returns = ScoreInput::ALL
            .iter()
            .filter(|i| i.family() == ScoreFamily::Returns)
            .count();
        let risk = ScoreInput::ALL
            .iter()
            .filter(|i| i.family() == ScoreFamily::Risk)
            .count();
        assert_eq!(returns, 6);
        assert_eq!(risk, 5);
        assert_eq!(ScoreInput::ALL.len() - returns - risk, 3);
    }

    #[test]
    fn test_tier_ordering_and_cap() {
        assert!(RecommendationTier::StrongBuy > RecommendationTier::Buy);
        assert!(RecommendationTier::Sell > RecommendationTier::StrongSell);
        assert_eq!(
            RecommendationTier::StrongBuy.cap_at(RecommendationTier::Hold),
            RecommendationTier::Hold
        );
        assert_eq!(
            RecommendationTier::Sell.cap_at(RecommendationTier::Hold),
            RecommendationTier::Sell
        );
    }

    #[test]
    fn test_input_map_serializes_with_string_keys() {
        let mut map = BTreeMap::new();
        map.insert(ScoreInput::Return1y, 0.1);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"return_1y":0.1}"#);
    }

    #[test]
    fn test_serde_names_match_display() {
        for input in ScoreInput::ALL {
            let json = serde_json::to_string(&input).unwrap();
            assert_eq!(json, format!("\"{}\"", input));
            let back: ScoreInput = serde_json::from_str(&json).unwrap();
            assert_eq!(back, input);
        }
    }
}
