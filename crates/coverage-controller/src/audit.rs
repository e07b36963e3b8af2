//! Integrity audit over stored score records.

use chrono::NaiveDate;
use fund_core::{DataProvenance, RecommendationTier, ScoreRecord};
use fund_scoring::LadderBook;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreAudit {
    pub count: usize,
    pub unique_entities: usize,
    pub min_total: Option<f64>,
    pub max_total: Option<f64>,
    pub mean_total: Option<f64>,
    /// Total outside `[0, ceiling_sum]` of the record's ladder set.
    pub out_of_range: Vec<String>,
    /// A sub-score or family score outside its ladder or ceiling bounds.
    pub invalid_components: Vec<String>,
    /// More than one record for the same `(entity, as_of)`.
    pub duplicate_keys: Vec<(String, NaiveDate)>,
    pub tier_distribution: BTreeMap<RecommendationTier, usize>,
    pub provenance_distribution: BTreeMap<DataProvenance, usize>,
    pub degraded: usize,
}

impl ScoreAudit {
    pub fn is_clean(&self) -> bool {
        self.out_of_range.is_empty() && self.invalid_components.is_empty() && self.duplicate_keys.is_empty()
    }
}

/// Check `records` against the bounds of `book`.
pub fn audit_scores(records: &[ScoreRecord], book: &LadderBook) -> ScoreAudit {
    let mut audit = ScoreAudit {
        count: records.len(),
        ..Default::default()
    };
    if records.is_empty() {
        return audit;
    }

    let mut entities = BTreeSet::new();
    let mut keys = BTreeMap::new();
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for record in records {
        entities.insert(record.entity_id.as_str());
        *keys.entry((record.entity_id.clone(), record.as_of)).or_insert(0usize) += 1;

        sum += record.total_score;
        min = min.min(record.total_score);
        max = max.max(record.total_score);

        let set = book.for_category(&record.peer_key.category);
        if !(0.0..=set.ceiling_sum()).contains(&record.total_score) || !record.total_score.is_finite() {
            audit.out_of_range.push(record.entity_id.clone());
        }

        let bad_input = record.sub_scores.iter().any(|(input, score)| {
            let cap = set.ladders.get(input).map_or(0.0, |l| l.max_score());
            !(0.0..=cap).contains(score)
        });
        let bad_family = record
            .family_scores
            .iter()
            .any(|(family, score)| !(0.0..=set.ceiling(*family)).contains(score));
        if bad_input || bad_family {
            audit.invalid_components.push(record.entity_id.clone());
        }

        *audit.tier_distribution.entry(record.tier).or_insert(0) += 1;
        *audit.provenance_distribution.entry(record.provenance).or_insert(0) += 1;
        if record.degraded {
            audit.degraded += 1;
        }
    }

    audit.unique_entities = entities.len();
    audit.min_total = Some(min);
    audit.max_total = Some(max);
    audit.mean_total = Some(sum / records.len() as f64);
    audit.duplicate_keys = keys
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(key, _)| key)
        .collect();
    audit
}
