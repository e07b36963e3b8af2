//! Score and ranking persistence with upsert semantics.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;

use crate::store::ScoreSink;
use crate::types::{RankingRecord, ScoreRecord};
use crate::Result;

/// Clamp an f64 to a finite value PostgreSQL will accept.
fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

pub struct PgScoreSink {
    pool: PgPool,
}

impl PgScoreSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreSink for PgScoreSink {
    async fn upsert_scores(&self, records: &[ScoreRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO fund_scores (
                    entity_id, as_of, peer_key, total_score, base_tier, tier,
                    degraded, ladder_version, provenance, breakdown, computed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (entity_id, as_of) DO UPDATE SET
                    peer_key = EXCLUDED.peer_key,
                    total_score = EXCLUDED.total_score,
                    base_tier = EXCLUDED.base_tier,
                    tier = EXCLUDED.tier,
                    degraded = EXCLUDED.degraded,
                    ladder_version = EXCLUDED.ladder_version,
                    provenance = EXCLUDED.provenance,
                    breakdown = EXCLUDED.breakdown,
                    computed_at = EXCLUDED.computed_at
                "#,
            )
            .bind(&record.entity_id)
            .bind(record.as_of)
            .bind(record.peer_key.to_string())
            .bind(finite(record.total_score))
            .bind(record.base_tier.as_str())
            .bind(record.tier.as_str())
            .bind(record.degraded)
            .bind(&record.ladder_version)
            .bind(record.provenance.as_str())
            .bind(Json(record))
            .bind(record.computed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = records.len(), "Upserted score records");
        Ok(records.len())
    }

    async fn upsert_rankings(&self, records: &[RankingRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO fund_rankings (
                    entity_id, peer_key, as_of, rank, total_in_group, percentile, quartile
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (entity_id, peer_key, as_of) DO UPDATE SET
                    rank = EXCLUDED.rank,
                    total_in_group = EXCLUDED.total_in_group,
                    percentile = EXCLUDED.percentile,
                    quartile = EXCLUDED.quartile
                "#,
            )
            .bind(&record.entity_id)
            .bind(record.peer_key.to_string())
            .bind(record.as_of)
            .bind(i32::try_from(record.rank).unwrap_or(i32::MAX))
            .bind(i32::try_from(record.total_in_group).unwrap_or(i32::MAX))
            .bind(finite(record.percentile))
            .bind(i16::from(record.quartile))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = records.len(), "Upserted ranking records");
        Ok(records.len())
    }
}
