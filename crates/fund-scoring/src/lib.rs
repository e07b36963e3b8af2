//! Fund Scoring
//!
//! Turns computed metrics plus registry attributes into a bounded composite
//! score and recommendation tier, then ranks scored funds within their
//! peer group.
//!
//! - [`ladder`]: declarative threshold ladders and the single evaluator
//! - [`tier`]: score breakpoints and ordered tier overrides
//! - [`scorer`]: the composite scorer
//! - [`ranking`]: peer-relative rank, percentile and quartile
//! - [`pipeline`]: metrics + scoring for one entity

pub mod ladder;
pub mod pipeline;
pub mod ranking;
pub mod scorer;
pub mod tier;

pub use ladder::{Direction, LadderBook, LadderSet, LadderStep, ThresholdLadder};
pub use pipeline::ScoringEngine;
pub use ranking::PeerRankingEngine;
pub use scorer::CompositeScorer;
pub use tier::TierConfig;
