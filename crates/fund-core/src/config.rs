//! Configuration management for the fund evaluation system.
//!
//! Values come from an optional TOML/JSON file layered under environment
//! variables prefixed with `FUNDSCOPE_` (nested keys separated by `__`,
//! e.g. `FUNDSCOPE_COVERAGE__BATCH_SIZE=250`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: Option<DatabaseConfig>,
    pub metrics: MetricsConfig,
    pub scoring: ScoringSettings,
    pub coverage: CoverageConfig,
    pub backtest: BacktestSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Load database settings from `DATABASE_URL` / `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            url: env::var("DATABASE_URL")
                .map_err(|_| Error::config("DATABASE_URL environment variable not set"))?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        })
    }
}

/// Parameters for return and risk metric computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Annualized risk-free rate used by Sharpe and Sortino.
    pub risk_free_rate: f64,
    /// Annualization factor for daily volatility.
    pub trading_periods_per_year: f64,
    /// Trailing window for volatility, Sharpe and Sortino.
    pub volatility_lookback_days: i64,
    /// Absolute minimum number of daily returns in the window.
    /// When unset, `min_sample_ratio` of the lookback applies.
    pub min_samples: Option<usize>,
    /// Required samples per calendar day of lookback (250 per 365 by default).
    pub min_sample_ratio: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.05,
            trading_periods_per_year: 252.0,
            volatility_lookback_days: 365,
            min_samples: None,
            min_sample_ratio: 250.0 / 365.0,
        }
    }
}

impl MetricsConfig {
    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.volatility_lookback_days = days;
        self
    }

    pub fn with_min_samples(mut self, samples: usize) -> Self {
        self.min_samples = Some(samples);
        self
    }

    /// Minimum daily-return count needed for volatility-based metrics.
    pub fn required_samples(&self) -> usize {
        self.min_samples.unwrap_or_else(|| {
            (self.volatility_lookback_days.max(0) as f64 * self.min_sample_ratio).round() as usize
        })
        .max(2)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trading_periods_per_year <= 0.0 {
            return Err(Error::config("trading_periods_per_year must be positive"));
        }
        if self.volatility_lookback_days <= 0 {
            return Err(Error::config("volatility_lookback_days must be positive"));
        }
        Ok(())
    }
}

/// Scoring settings that are not part of the ladder tables themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// JSON ladder book replacing the built-in ladders.
    pub ladder_file: Option<PathBuf>,
    /// Drawdown magnitude above which the tier is capped at hold.
    pub catastrophic_drawdown: f64,
    /// Reference score for the negative-Sharpe sell override.
    /// Defaults to half of the ceiling sum.
    pub median_score: Option<f64>,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            ladder_file: None,
            catastrophic_drawdown: 0.5,
            median_score: None,
        }
    }
}

/// One eligibility level of the coverage relaxation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaxationStep {
    /// Calendar days between the first point and the as-of date.
    pub min_history_days: i64,
    /// Points on or before the as-of date.
    pub min_points: usize,
    pub volatility_lookback_days: i64,
    pub min_samples: usize,
}

impl RelaxationStep {
    pub const fn new(
        min_history_days: i64,
        min_points: usize,
        volatility_lookback_days: i64,
        min_samples: usize,
    ) -> Self {
        Self {
            min_history_days,
            min_points,
            volatility_lookback_days,
            min_samples,
        }
    }
}

/// Batch controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub batch_size: usize,
    /// Concurrent scoring computations per batch.
    pub workers: usize,
    pub batch_timeout_secs: u64,
    /// Safety cap on passes, independent of the relaxation steps.
    pub max_passes: usize,
    /// Ordered strictest to loosest.
    pub relaxation: Vec<RelaxationStep>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            workers: 8,
            batch_timeout_secs: 120,
            max_passes: 10,
            relaxation: vec![
                RelaxationStep::new(1095, 750, 365, 250),
                RelaxationStep::new(365, 250, 365, 250),
                RelaxationStep::new(180, 120, 180, 120),
                RelaxationStep::new(90, 60, 90, 60),
                RelaxationStep::new(30, 20, 30, 20),
            ],
        }
    }
}

impl CoverageConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("coverage batch_size must be greater than zero"));
        }
        if self.workers == 0 {
            return Err(Error::config("coverage workers must be greater than zero"));
        }
        if self.max_passes == 0 {
            return Err(Error::config("coverage max_passes must be greater than zero"));
        }
        if self.relaxation.is_empty() {
            return Err(Error::config("coverage relaxation policy has no steps"));
        }
        Ok(())
    }
}

/// Defaults applied to every backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// Concurrent scoring computations within one rebalance period.
    pub workers: usize,
    pub period_timeout_secs: Option<u64>,
    pub benchmark_id: Option<String>,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            workers: 8,
            period_timeout_secs: Some(300),
            benchmark_id: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus `FUNDSCOPE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let mut app: AppConfig = builder
            .add_source(
                config::Environment::with_prefix("FUNDSCOPE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if app.database.is_none() {
            app.database = DatabaseConfig::from_env().ok();
        }

        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        self.metrics.validate()?;
        if self.backtest.workers == 0 {
            return Err(Error::config("backtest workers must be greater than zero"));
        }
        self.coverage.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_required_samples() {
        let config = MetricsConfig::default();
        assert_eq!(config.required_samples(), 250);

        let relaxed = MetricsConfig::default().with_lookback_days(90);
        assert_eq!(relaxed.required_samples(), 62);

        let explicit = MetricsConfig::default().with_min_samples(20);
        assert_eq!(explicit.required_samples(), 20);
    }

    #[test]
    fn test_coverage_defaults_are_valid() {
        let config = CoverageConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_timeout(), Duration::from_secs(120));

        let first = config.relaxation.first().unwrap();
        let last = config.relaxation.last().unwrap();
        assert!(first.min_history_days > last.min_history_days);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let config = CoverageConfig {
            batch_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_empty_relaxation_is_rejected() {
        let config = CoverageConfig {
            relaxation: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_app_config_deserializes_partial_document() {
        let json = r#"{ "coverage": { "batch_size": 50, "workers": 2 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.coverage.batch_size, 50);
        assert_eq!(config.coverage.workers, 2);
        assert_eq!(config.coverage.max_passes, 10);
        assert!((config.metrics.risk_free_rate - 0.05).abs() < 1e-12);
        assert!((config.scoring.catastrophic_drawdown - 0.5).abs() < 1e-12);
    }
}
