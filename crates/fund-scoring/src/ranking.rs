//! Peer-relative ranking over a complete snapshot of scores.

use chrono::NaiveDate;
use fund_core::{Error, PeerKey, RankingRecord, Result, ScoreRecord};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Full recomputation of ranks for every peer group in a snapshot.
pub struct PeerRankingEngine;

impl PeerRankingEngine {
    /// Quartile for `rank` (1-based) among `total`; rank 1 of a group of one is Q1.
    ///
    /// Q1 is `rank <= ceil(total * 0.25)`, Q2 `<= ceil(total * 0.5)`, Q3
    /// `<= ceil(total * 0.75)`, otherwise Q4. A pair is the one exception:
    /// the thresholds would place its second member in Q3, so it is Q4.
    pub fn quartile(rank: usize, total: usize) -> u8 {
        if total == 2 && rank == 2 {
            return 4;
        }
        if total == 0 || rank <= total.div_ceil(4) {
            1
        } else if rank <= total.div_ceil(2) {
            2
        } else if rank <= (3 * total).div_ceil(4) {
            3
        } else {
            4
        }
    }

    /// Rank one peer group. All records must share the peer key and as-of date.
    pub fn rank_group(records: &[ScoreRecord]) -> Result<Vec<RankingRecord>> {
        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };
        if records
            .iter()
            .any(|r| r.peer_key != first.peer_key || r.as_of != first.as_of)
        {
            return Err(Error::invalid(
                "rank_group requires a single peer key and as-of date",
            ));
        }
        let refs: Vec<&ScoreRecord> = records.iter().collect();
        Ok(Self::rank_sorted(&first.peer_key, first.as_of, refs))
    }

    /// Rank every `(peer key, as-of date)` group present in `records`.
    pub fn rank_all(records: &[ScoreRecord]) -> Vec<RankingRecord> {
        let mut groups: BTreeMap<(&PeerKey, NaiveDate), Vec<&ScoreRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry((&record.peer_key, record.as_of))
                .or_default()
                .push(record);
        }

        groups
            .into_iter()
            .flat_map(|((peer_key, as_of), members)| Self::rank_sorted(peer_key, as_of, members))
            .collect()
    }

    /// Descending by total score; equal totals are ordered by entity id.
    fn rank_sorted(
        peer_key: &PeerKey,
        as_of: NaiveDate,
        mut members: Vec<&ScoreRecord>,
    ) -> Vec<RankingRecord> {
        members.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });

        let total = members.len();
        members
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                let rank = i + 1;
                RankingRecord {
                    entity_id: record.entity_id.clone(),
                    peer_key: peer_key.clone(),
                    as_of,
                    rank,
                    total_in_group: total,
                    percentile: rank as f64 / total as f64 * 100.0,
                    quartile: Self::quartile(rank, total),
                }
            })
            .collect()
    }
}
