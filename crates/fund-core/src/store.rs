//! Collaborator interfaces consumed and produced by the evaluation core.
//!
//! The core never assumes a storage engine; it talks to these traits.
//! [`memory`] provides in-process implementations and
//! [`crate::db`] provides PostgreSQL ones.

pub mod memory;
pub mod snapshot;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::types::{FundAttributes, RankingRecord, ScoreRecord, ValueSeries};
use crate::Result;

/// Append-only per-entity value series.
#[async_trait]
pub trait ValueStore: Send + Sync {
    /// Values for `entity_id` within the optional inclusive date range, ordered by date.
    async fn series(
        &self,
        entity_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ValueSeries>;
}

/// Reference index series, same shape as [`ValueStore`].
#[async_trait]
pub trait BenchmarkStore: Send + Sync {
    async fn benchmark_series(
        &self,
        benchmark_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ValueSeries>;
}

/// Slowly-changing entity attributes.
#[async_trait]
pub trait EntityRegistry: Send + Sync {
    async fn attributes(&self, entity_id: &str) -> Result<FundAttributes>;

    /// All known entity ids, sorted.
    async fn entity_ids(&self) -> Result<Vec<String>>;
}

/// Upsert interface for scoring output.
///
/// Scores are keyed by `(entity_id, as_of)` and rankings by
/// `(entity_id, peer_key, as_of)`; writing the same key twice replaces the
/// earlier record.
#[async_trait]
pub trait ScoreSink: Send + Sync {
    async fn upsert_scores(&self, records: &[ScoreRecord]) -> Result<usize>;

    async fn upsert_rankings(&self, records: &[RankingRecord]) -> Result<usize>;
}

/// Write-once store for backtest results.
#[async_trait]
pub trait BacktestResultSink: Send + Sync {
    /// Fails with `PersistenceConflict` if `run_id` was already written.
    async fn write_result(
        &self,
        run_id: Uuid,
        config_key: &str,
        result: &serde_json::Value,
    ) -> Result<()>;
}
