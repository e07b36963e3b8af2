//! Write-once backtest result storage.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::BacktestResultSink;
use crate::{Error, Result};

pub struct PgBacktestSink {
    pool: PgPool,
}

impl PgBacktestSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BacktestResultSink for PgBacktestSink {
    async fn write_result(
        &self,
        run_id: Uuid,
        config_key: &str,
        result: &serde_json::Value,
    ) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO backtest_results (run_id, config_key, result)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(config_key)
        .bind(Json(result))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(Error::PersistenceConflict(format!(
                "backtest run {} already recorded",
                run_id
            )));
        }
        Ok(())
    }
}
