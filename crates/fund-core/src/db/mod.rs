//! Database access layer for PostgreSQL.

pub mod backtests;
pub mod funds;
pub mod scores;

pub use backtests::PgBacktestSink;
pub use funds::PgFundStore;
pub use scores::PgScoreSink;

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Tables used by the PostgreSQL collaborators.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS funds (
    entity_id       TEXT PRIMARY KEY,
    name            TEXT NOT NULL DEFAULT '',
    category        TEXT NOT NULL,
    subcategory     TEXT,
    expense_ratio   NUMERIC(10, 6),
    aum             NUMERIC(24, 4),
    inception_date  DATE,
    benchmark_id    TEXT,
    provenance      TEXT NOT NULL DEFAULT 'unknown'
);

CREATE TABLE IF NOT EXISTS nav_points (
    entity_id   TEXT NOT NULL,
    nav_date    DATE NOT NULL,
    nav_value   NUMERIC(20, 8) NOT NULL,
    PRIMARY KEY (entity_id, nav_date)
);

CREATE TABLE IF NOT EXISTS benchmark_points (
    benchmark_id    TEXT NOT NULL,
    nav_date        DATE NOT NULL,
    nav_value       NUMERIC(20, 8) NOT NULL,
    PRIMARY KEY (benchmark_id, nav_date)
);

CREATE TABLE IF NOT EXISTS fund_scores (
    entity_id       TEXT NOT NULL,
    as_of           DATE NOT NULL,
    peer_key        TEXT NOT NULL,
    total_score     DOUBLE PRECISION NOT NULL,
    base_tier       TEXT NOT NULL,
    tier            TEXT NOT NULL,
    degraded        BOOLEAN NOT NULL,
    ladder_version  TEXT NOT NULL,
    provenance      TEXT NOT NULL,
    breakdown       JSONB NOT NULL,
    computed_at     TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (entity_id, as_of)
);

CREATE TABLE IF NOT EXISTS fund_rankings (
    entity_id       TEXT NOT NULL,
    peer_key        TEXT NOT NULL,
    as_of           DATE NOT NULL,
    rank            INTEGER NOT NULL,
    total_in_group  INTEGER NOT NULL,
    percentile      DOUBLE PRECISION NOT NULL,
    quartile        SMALLINT NOT NULL,
    PRIMARY KEY (entity_id, peer_key, as_of)
);

CREATE TABLE IF NOT EXISTS backtest_results (
    run_id      UUID PRIMARY KEY,
    config_key  TEXT NOT NULL,
    result      JSONB NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Create any missing tables.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
