//! In-memory collaborator implementations backed by `DashMap`.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{BacktestResultSink, BenchmarkStore, EntityRegistry, ScoreSink, ValueStore};
use crate::types::{FundAttributes, NavPoint, PeerKey, RankingRecord, ScoreRecord, ValueSeries};
use crate::{Error, Result};

/// Value store, benchmark store and entity registry in one process-local map set.
///
/// Raw points are validated when a series is read, so a malformed entity
/// fails only its own computations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    values: Arc<DashMap<String, Vec<NavPoint>>>,
    benchmarks: Arc<DashMap<String, Vec<NavPoint>>>,
    attributes: Arc<DashMap<String, FundAttributes>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_entity(&self, attributes: FundAttributes, points: Vec<NavPoint>) {
        self.values.insert(attributes.entity_id.clone(), points);
        self.attributes.insert(attributes.entity_id.clone(), attributes);
    }

    pub fn insert_benchmark(&self, benchmark_id: impl Into<String>, points: Vec<NavPoint>) {
        self.benchmarks.insert(benchmark_id.into(), points);
    }

    pub fn entity_count(&self) -> usize {
        self.attributes.len()
    }

    fn read(
        map: &DashMap<String, Vec<NavPoint>>,
        id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ValueSeries> {
        let points = map
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("series {}", id)))?;
        let selected = points
            .iter()
            .filter(|p| from.map_or(true, |f| p.date >= f) && to.map_or(true, |t| p.date <= t))
            .copied()
            .collect();
        ValueSeries::new(id, selected)
    }
}

#[async_trait]
impl ValueStore for InMemoryStore {
    async fn series(
        &self,
        entity_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ValueSeries> {
        Self::read(&self.values, entity_id, from, to)
    }
}

#[async_trait]
impl BenchmarkStore for InMemoryStore {
    async fn benchmark_series(
        &self,
        benchmark_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ValueSeries> {
        Self::read(&self.benchmarks, benchmark_id, from, to)
    }
}

#[async_trait]
impl EntityRegistry for InMemoryStore {
    async fn attributes(&self, entity_id: &str) -> Result<FundAttributes> {
        self.attributes
            .get(entity_id)
            .map(|a| a.clone())
            .ok_or_else(|| Error::NotFound(format!("entity {}", entity_id)))
    }

    async fn entity_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.attributes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

/// Score and ranking sink with upsert-by-key semantics.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScoreSink {
    scores: Arc<DashMap<(String, NaiveDate), ScoreRecord>>,
    rankings: Arc<DashMap<(String, PeerKey, NaiveDate), RankingRecord>>,
}

impl InMemoryScoreSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score_count(&self) -> usize {
        self.scores.len()
    }

    pub fn ranking_count(&self) -> usize {
        self.rankings.len()
    }

    pub fn score(&self, entity_id: &str, as_of: NaiveDate) -> Option<ScoreRecord> {
        self.scores
            .get(&(entity_id.to_string(), as_of))
            .map(|r| r.clone())
    }

    /// All stored scores, ordered by entity and date.
    pub fn scores(&self) -> Vec<ScoreRecord> {
        let mut all: Vec<ScoreRecord> = self.scores.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| (&a.entity_id, a.as_of).cmp(&(&b.entity_id, b.as_of)));
        all
    }

    pub fn rankings(&self) -> Vec<RankingRecord> {
        let mut all: Vec<RankingRecord> =
            self.rankings.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| {
            (&a.peer_key, a.as_of, a.rank).cmp(&(&b.peer_key, b.as_of, b.rank))
        });
        all
    }
}

#[async_trait]
impl ScoreSink for InMemoryScoreSink {
    async fn upsert_scores(&self, records: &[ScoreRecord]) -> Result<usize> {
        for record in records {
            self.scores
                .insert((record.entity_id.clone(), record.as_of), record.clone());
        }
        Ok(records.len())
    }

    async fn upsert_rankings(&self, records: &[RankingRecord]) -> Result<usize> {
        for record in records {
            self.rankings.insert(
                (record.entity_id.clone(), record.peer_key.clone(), record.as_of),
                record.clone(),
            );
        }
        Ok(records.len())
    }
}

/// Write-once backtest result sink.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBacktestSink {
    results: Arc<DashMap<Uuid, (String, serde_json::Value)>>,
}

impl InMemoryBacktestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, run_id: Uuid) -> Option<serde_json::Value> {
        self.results.get(&run_id).map(|r| r.1.clone())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[async_trait]
impl BacktestResultSink for InMemoryBacktestSink {
    async fn write_result(
        &self,
        run_id: Uuid,
        config_key: &str,
        result: &serde_json::Value,
    ) -> Result<()> {
        match self.results.entry(run_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::PersistenceConflict(
                format!("backtest run {} already recorded", run_id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert((config_key.to_string(), result.clone()));
                Ok(())
            }
        }
    }
}
