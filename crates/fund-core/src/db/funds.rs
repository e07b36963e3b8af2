//! Fund attributes and NAV history.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::store::{BenchmarkStore, EntityRegistry, ValueStore};
use crate::types::{DataProvenance, FundAttributes, NavPoint, PeerKey, ValueSeries};
use crate::{Error, Result};

/// Repository implementing the value store, benchmark store and entity registry.
#[derive(Clone)]
pub struct PgFundStore {
    pool: PgPool,
}

impl PgFundStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or update fund attributes.
    pub async fn upsert_attributes(&self, attrs: &FundAttributes) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO funds (
                entity_id, name, category, subcategory, expense_ratio,
                aum, inception_date, benchmark_id, provenance
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (entity_id) DO UPDATE SET
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                subcategory = EXCLUDED.subcategory,
                expense_ratio = EXCLUDED.expense_ratio,
                aum = EXCLUDED.aum,
                inception_date = EXCLUDED.inception_date,
                benchmark_id = EXCLUDED.benchmark_id,
                provenance = EXCLUDED.provenance
            "#,
        )
        .bind(&attrs.entity_id)
        .bind(&attrs.name)
        .bind(&attrs.peer_key.category)
        .bind(&attrs.peer_key.subcategory)
        .bind(attrs.expense_ratio)
        .bind(attrs.aum)
        .bind(attrs.inception_date)
        .bind(&attrs.benchmark_id)
        .bind(attrs.provenance.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append NAV points, ignoring dates that already exist.
    pub async fn append_points(&self, entity_id: &str, points: &[NavPoint]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for point in points {
            let result = sqlx::query(
                r#"
                INSERT INTO nav_points (entity_id, nav_date, nav_value)
                VALUES ($1, $2, $3)
                ON CONFLICT (entity_id, nav_date) DO NOTHING
                "#,
            )
            .bind(entity_id)
            .bind(point.date)
            .bind(point.value)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Append benchmark index points, ignoring dates that already exist.
    pub async fn append_benchmark_points(&self, benchmark_id: &str, points: &[NavPoint]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for point in points {
            let result = sqlx::query(
                r#"
                INSERT INTO benchmark_points (benchmark_id, nav_date, nav_value)
                VALUES ($1, $2, $3)
                ON CONFLICT (benchmark_id, nav_date) DO NOTHING
                "#,
            )
            .bind(benchmark_id)
            .bind(point.date)
            .bind(point.value)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn fetch_points(
        &self,
        table_sql: &str,
        id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ValueSeries> {
        let rows = sqlx::query(table_sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        let points = rows
            .iter()
            .map(|row| {
                let date: NaiveDate = row.try_get("nav_date")?;
                let value: Decimal = row.try_get("nav_value")?;
                Ok(NavPoint::new(date, value))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        ValueSeries::new(id, points)
    }
}

#[async_trait]
impl ValueStore for PgFundStore {
    async fn series(
        &self,
        entity_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ValueSeries> {
        self.fetch_points(
            r#"
            SELECT nav_date, nav_value
            FROM nav_points
            WHERE entity_id = $1
              AND ($2::date IS NULL OR nav_date >= $2)
              AND ($3::date IS NULL OR nav_date <= $3)
            ORDER BY nav_date
            "#,
            entity_id,
            from,
            to,
        )
        .await
    }
}

#[async_trait]
impl BenchmarkStore for PgFundStore {
    async fn benchmark_series(
        &self,
        benchmark_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ValueSeries> {
        self.fetch_points(
            r#"
            SELECT nav_date, nav_value
            FROM benchmark_points
            WHERE benchmark_id = $1
              AND ($2::date IS NULL OR nav_date >= $2)
              AND ($3::date IS NULL OR nav_date <= $3)
            ORDER BY nav_date
            "#,
            benchmark_id,
            from,
            to,
        )
        .await
    }
}

#[async_trait]
impl EntityRegistry for PgFundStore {
    async fn attributes(&self, entity_id: &str) -> Result<FundAttributes> {
        let row = sqlx::query(
            r#"
            SELECT entity_id, name, category, subcategory, expense_ratio,
                   aum, inception_date, benchmark_id, provenance
            FROM funds
            WHERE entity_id = $1
            "#,
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("entity {}", entity_id)))?;

        let subcategory: Option<String> = row.try_get("subcategory")?;
        let provenance: String = row.try_get("provenance")?;

        Ok(FundAttributes {
            entity_id: row.try_get("entity_id")?,
            name: row.try_get("name")?,
            peer_key: PeerKey {
                category: row.try_get("category")?,
                subcategory,
            },
            expense_ratio: row.try_get("expense_ratio")?,
            aum: row.try_get("aum")?,
            inception_date: row.try_get("inception_date")?,
            benchmark_id: row.try_get("benchmark_id")?,
            provenance: provenance.parse().unwrap_or(DataProvenance::Unknown),
        })
    }

    async fn entity_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT entity_id FROM funds ORDER BY entity_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
