//! Threshold ladders.
//!
//! A ladder is an ordered list of `(bound, score)` steps evaluated by one
//! generic function. Ladders are grouped into a versioned [`LadderSet`]
//! with per-family ceilings, and a [`LadderBook`] maps fund categories to
//! their set so ladders can be swapped per category without code changes.

use fund_core::{Error, Result, ScoreFamily, ScoreInput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Whether larger observed values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The highest bound at or below the value wins.
    HigherIsBetter,
    /// The lowest bound at or above the value wins.
    LowerIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderStep {
    pub bound: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLadder {
    pub direction: Direction,
    /// Ascending by bound.
    pub steps: Vec<LadderStep>,
}

impl ThresholdLadder {
    pub fn higher_is_better(steps: &[(f64, f64)]) -> Self {
        Self::build(Direction::HigherIsBetter, steps)
    }

    pub fn lower_is_better(steps: &[(f64, f64)]) -> Self {
        Self::build(Direction::LowerIsBetter, steps)
    }

    fn build(direction: Direction, steps: &[(f64, f64)]) -> Self {
        Self {
            direction,
            steps: steps
                .iter()
                .map(|(bound, score)| LadderStep {
                    bound: *bound,
                    score: *score,
                })
                .collect(),
        }
    }

    /// Score for `value`; 0 when no step matches or the value is not finite.
    pub fn evaluate(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        let step = match self.direction {
            Direction::HigherIsBetter => self.steps.iter().rev().find(|s| s.bound <= value),
            Direction::LowerIsBetter => self.steps.iter().find(|s| value <= s.bound),
        };
        step.map_or(0.0, |s| s.score)
    }

    pub fn max_score(&self) -> f64 {
        self.steps.iter().map(|s| s.score).fold(0.0, f64::max)
    }

    pub fn validate(&self, input: ScoreInput) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::config(format!("ladder {} has no steps", input)));
        }
        for pair in self.steps.windows(2) {
            if pair[0].bound >= pair[1].bound {
                return Err(Error::config(format!(
                    "ladder {} bounds must be strictly ascending",
                    input
                )));
            }
        }
        if self.steps.iter().any(|s| s.score < 0.0 || !s.score.is_finite()) {
            return Err(Error::config(format!("ladder {} has a negative score", input)));
        }
        Ok(())
    }
}

/// Versioned ladders for every scored input plus family ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderSet {
    pub version: String,
    pub ceilings: BTreeMap<ScoreFamily, f64>,
    pub ladders: BTreeMap<ScoreInput, ThresholdLadder>,
}

impl LadderSet {
    /// Built-in ladders: returns 40, risk 30, fundamentals 30.
    pub fn standard() -> Self {
        let mut ladders = BTreeMap::new();

        // Returns (40)
        ladders.insert(
            ScoreInput::Return1y,
            ThresholdLadder::higher_is_better(&[(0.0, 2.0), (0.05, 4.0), (0.10, 6.0), (0.15, 8.0), (0.20, 10.0)]),
        );
        ladders.insert(
            ScoreInput::Return3y,
            ThresholdLadder::higher_is_better(&[(0.0, 2.0), (0.05, 4.0), (0.08, 6.0), (0.12, 8.0), (0.15, 10.0)]),
        );
        ladders.insert(
            ScoreInput::Return5y,
            ThresholdLadder::higher_is_better(&[(0.0, 2.0), (0.05, 4.0), (0.08, 6.0), (0.12, 8.0)]),
        );
        ladders.insert(
            ScoreInput::Return6m,
            ThresholdLadder::higher_is_better(&[(0.0, 1.0), (0.03, 2.0), (0.06, 3.0), (0.09, 4.0), (0.12, 5.0)]),
        );
        ladders.insert(
            ScoreInput::Return3m,
            ThresholdLadder::higher_is_better(&[(0.0, 1.0), (0.02, 2.0), (0.04, 3.0), (0.06, 4.0)]),
        );
        ladders.insert(
            ScoreInput::ReturnYtd,
            ThresholdLadder::higher_is_better(&[(0.0, 1.0), (0.05, 2.0), (0.10, 3.0)]),
        );

        // Risk (30)
        ladders.insert(
            ScoreInput::Volatility,
            ThresholdLadder::lower_is_better(&[(0.08, 8.0), (0.12, 6.0), (0.16, 4.0), (0.20, 2.0), (0.30, 1.0)]),
        );
        ladders.insert(
            ScoreInput::Sharpe,
            ThresholdLadder::higher_is_better(&[(0.0, 2.0), (0.5, 4.0), (1.0, 6.0), (1.5, 8.0)]),
        );
        ladders.insert(
            ScoreInput::Sortino,
            ThresholdLadder::higher_is_better(&[(0.0, 1.5), (0.75, 3.0), (1.5, 4.5), (2.0, 6.0)]),
        );
        ladders.insert(
            ScoreInput::MaxDrawdown,
            ThresholdLadder::lower_is_better(&[(0.10, 5.0), (0.20, 4.0), (0.30, 2.5), (0.40, 1.0)]),
        );
        ladders.insert(
            ScoreInput::CaptureRatio,
            ThresholdLadder::higher_is_better(&[(0.8, 1.0), (1.0, 2.0), (1.2, 3.0)]),
        );

        // Fundamentals (30)
        ladders.insert(
            ScoreInput::ExpenseRatio,
            ThresholdLadder::lower_is_better(&[
                (0.005, 12.0),
                (0.0075, 10.0),
                (0.01, 8.0),
                (0.015, 6.0),
                (0.02, 4.0),
                (0.025, 2.0),
            ]),
        );
        ladders.insert(
            ScoreInput::Aum,
            ThresholdLadder::higher_is_better(&[(1e8, 2.0), (5e8, 4.0), (1e9, 6.0), (5e9, 8.0), (1e10, 10.0)]),
        );
        ladders.insert(
            ScoreInput::TrackRecord,
            ThresholdLadder::higher_is_better(&[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0), (10.0, 8.0)]),
        );

        let ceilings = BTreeMap::from([
            (ScoreFamily::Returns, 40.0),
            (ScoreFamily::Risk, 30.0),
            (ScoreFamily::Fundamentals, 30.0),
        ]);

        Self {
            version: "standard-v1".to_string(),
            ceilings,
            ladders,
        }
    }

    pub fn ceiling(&self, family: ScoreFamily) -> f64 {
        self.ceilings.get(&family).copied().unwrap_or(0.0)
    }

    /// Upper bound of the total score.
    pub fn ceiling_sum(&self) -> f64 {
        self.ceilings.values().sum()
    }

    pub fn validate(&self) -> Result<()> {
        for family in ScoreFamily::ALL {
            let ceiling = self.ceiling(family);
            if ceiling < 0.0 || !ceiling.is_finite() {
                return Err(Error::config(format!(
                    "ladder set {} has an invalid ceiling for {:?}",
                    self.version, family
                )));
            }
        }
        for (input, ladder) in &self.ladders {
            ladder.validate(*input)?;
            if ladder.max_score() > self.ceiling(input.family()) {
                return Err(Error::config(format!(
                    "ladder {} exceeds its family ceiling in {}",
                    input, self.version
                )));
            }
        }
        Ok(())
    }
}

/// Default ladder set plus per-category replacements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderBook {
    pub default: LadderSet,
    #[serde(default)]
    pub categories: BTreeMap<String, LadderSet>,
}

impl Default for LadderBook {
    fn default() -> Self {
        Self {
            default: LadderSet::standard(),
            categories: BTreeMap::new(),
        }
    }
}

impl LadderBook {
    pub fn with_category(mut self, category: impl Into<String>, set: LadderSet) -> Self {
        self.categories.insert(category.into(), set);
        self
    }

    pub fn for_category(&self, category: &str) -> &LadderSet {
        self.categories.get(category).unwrap_or(&self.default)
    }

    pub fn validate(&self) -> Result<()> {
        self.default.validate()?;
        for set in self.categories.values() {
            set.validate()?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let book: LadderBook = serde_json::from_str(json)?;
        book.validate()?;
        Ok(book)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}
