//! Holdings selection from a ranked universe.

use fund_core::{PeerKey, RankingRecord, ScoreRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::SelectionRule;

/// A scored and ranked entity eligible on one rebalance date.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entity_id: String,
    pub peer_key: PeerKey,
    pub total_score: f64,
    pub quartile: u8,
}

impl Candidate {
    /// Join scores with their rankings, ordered by score descending then entity id.
    pub fn from_scored(scores: &[ScoreRecord], rankings: &[RankingRecord]) -> Vec<Candidate> {
        let quartiles: HashMap<&str, u8> = rankings
            .iter()
            .map(|r| (r.entity_id.as_str(), r.quartile))
            .collect();

        let mut candidates: Vec<Candidate> = scores
            .iter()
            .map(|s| Candidate {
                entity_id: s.entity_id.clone(),
                peer_key: s.peer_key.clone(),
                total_score: s.total_score,
                quartile: quartiles.get(s.entity_id.as_str()).copied().unwrap_or(4),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.total_score
                .total_cmp(&a.total_score)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        candidates
    }
}

/// Ids already chosen while building one snapshot.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    chosen: BTreeSet<String>,
    order: Vec<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.chosen.contains(entity_id)
    }

    /// Returns false if the id was already chosen.
    pub fn choose(&mut self, entity_id: &str) -> bool {
        if self.chosen.insert(entity_id.to_string()) {
            self.order.push(entity_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Chosen ids in selection order.
    pub fn into_selected(self) -> Vec<String> {
        self.order
    }
}

/// Apply `rule` to candidates already sorted best-first, recording choices in `state`.
pub fn select(rule: &SelectionRule, candidates: &[Candidate], state: &mut SelectionState) {
    match rule {
        SelectionRule::TopN { n } => {
            let mut taken = 0;
            for c in candidates {
                if taken == *n {
                    break;
                }
                if state.choose(&c.entity_id) {
                    taken += 1;
                }
            }
        }
        SelectionRule::TopNPerPeerGroup { n } => {
            let mut per_group: BTreeMap<&PeerKey, usize> = BTreeMap::new();
            for c in candidates {
                let taken = per_group.entry(&c.peer_key).or_insert(0);
                if *taken < *n && state.choose(&c.entity_id) {
                    *taken += 1;
                }
            }
        }
        SelectionRule::ScoreRange { min, max } => {
            for c in candidates {
                if c.total_score >= *min && c.total_score <= *max {
                    state.choose(&c.entity_id);
                }
            }
        }
        SelectionRule::Quartiles { quartiles } => {
            for c in candidates {
                if quartiles.contains(&c.quartile) {
                    state.choose(&c.entity_id);
                }
            }
        }
        SelectionRule::FixedHoldings { entity_ids } => {
            for id in entity_ids {
                if candidates.iter().any(|c| &c.entity_id == id) {
                    state.choose(id);
                }
            }
        }
        SelectionRule::Union { rules } => {
            for rule in rules {
                select(rule, candidates, state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, category: &str, score: f64, quartile: u8) -> Candidate {
        Candidate {
            entity_id: id.to_string(),
            peer_key: PeerKey::new(category),
            total_score: score,
            quartile,
        }
    }

    fn universe() -> Vec<Candidate> {
        vec![
            candidate("e1", "equity", 91.0, 1),
            candidate("d1", "debt", 88.0, 1),
            candidate("e2", "equity", 75.0, 2),
            candidate("d2", "debt", 60.0, 4),
            candidate("e3", "equity", 42.0, 4),
        ]
    }

    fn run(rule: SelectionRule) -> Vec<String> {
        let mut state = SelectionState::new();
        select(&rule, &universe(), &mut state);
        state.into_selected()
    }

    #[test]
    fn test_top_n() {
        assert_eq!(run(SelectionRule::TopN { n: 2 }), vec!["e1", "d1"]);
        assert_eq!(run(SelectionRule::TopN { n: 50 }).len(), 5);
    }

    #[test]
    fn test_top_n_per_peer_group() {
        assert_eq!(
            run(SelectionRule::TopNPerPeerGroup { n: 1 }),
            vec!["e1", "d1"]
        );
    }

    #[test]
    fn test_score_range() {
        assert_eq!(
            run(SelectionRule::ScoreRange { min: 60.0, max: 90.0 }),
            vec!["d1", "e2", "d2"]
        );
    }

    #[test]
    fn test_quartiles() {
        assert_eq!(run(SelectionRule::Quartiles { quartiles: vec![4] }), vec!["d2", "e3"]);
    }

    #[test]
    fn test_fixed_holdings_skip_unscored() {
        let rule = SelectionRule::FixedHoldings {
            entity_ids: vec!["e3".into(), "gone".into()],
        };
        assert_eq!(run(rule), vec!["e3"]);
    }

    #[test]
    fn test_union_never_selects_twice() {
        let rule = SelectionRule::Union {
            rules: vec![
                SelectionRule::FixedHoldings { entity_ids: vec!["e1".into()] },
                SelectionRule::TopN { n: 2 },
            ],
        };
        // TopN skips e1 because it is already chosen and takes the next two
        assert_eq!(run(rule), vec!["e1", "d1", "e2"]);
    }

    #[test]
    fn test_no_match_leaves_state_empty() {
        let selected = run(SelectionRule::ScoreRange { min: 95.0, max: 100.0 });
        assert!(selected.is_empty());
    }

    #[test]
    fn test_candidates_sorted_best_first() {
        use chrono::{NaiveDate, Utc};
        use fund_core::RecommendationTier;

        let as_of = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let score = |id: &str, total: f64| ScoreRecord {
            entity_id: id.to_string(),
            as_of,
            peer_key: PeerKey::new("equity"),
            inputs: Default::default(),
            sub_scores: Default::default(),
            family_scores: Default::default(),
            total_score: total,
            base_tier: RecommendationTier::Hold,
            tier: RecommendationTier::Hold,
            overrides: vec![],
            degraded: false,
            missing_inputs: vec![],
            ladder_version: "t".into(),
            provenance: Default::default(),
            computed_at: Utc::now(),
        };
        let scores = vec![score("b", 50.0), score("c", 70.0), score("a", 50.0)];
        let rankings = fund_scoring::PeerRankingEngine::rank_all(&scores);
        let candidates = Candidate::from_scored(&scores, &rankings);

        let ids: Vec<&str> = candidates.iter().map(|c| c.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(candidates[0].quartile, 1);
    }
}
