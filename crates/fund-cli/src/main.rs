//! fundscope
//!
//! Operator entry point: scores the fund universe, runs backtests and audits
//! stored scores, reading from a universe snapshot file or PostgreSQL.

use anyhow::{Context, Result};
use backtester::{BacktestConfig, BacktestEngine};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use coverage_controller::{audit_scores, CoverageController};
use fund_core::config::AppConfig;
use fund_core::db::{self, PgBacktestSink, PgFundStore, PgScoreSink};
use fund_core::store::memory::{InMemoryScoreSink, InMemoryStore};
use fund_core::store::snapshot::UniverseSnapshot;
use fund_core::{CancelFlag, ScoreRecord};
use fund_metrics::MetricsCalculator;
use fund_scoring::{CompositeScorer, ScoringEngine};
use serde::Serialize;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "fundscope")]
#[command(about = "Fund metrics, composite scoring, peer ranking and backtesting")]
struct Cli {
    /// Configuration file (TOML or JSON); FUNDSCOPE_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// Universe snapshot JSON file
    #[arg(long, conflicts_with = "database")]
    input: Option<PathBuf>,

    /// Read from and write to the configured PostgreSQL database
    #[arg(long)]
    database: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score the whole universe as of a date and rank peer groups
    Score {
        #[arg(long)]
        as_of: NaiveDate,

        #[command(flatten)]
        source: Source,

        /// Write the score records as JSON (snapshot mode only)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run a backtest described by a JSON configuration
    Backtest {
        /// Backtest configuration JSON
        #[arg(long)]
        run: PathBuf,

        #[command(flatten)]
        source: Source,

        /// Write the full result as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check a JSON file of score records for integrity problems
    Audit {
        #[arg(long)]
        scores: PathBuf,
    },

    /// Load a universe snapshot into the database
    Import {
        #[arg(long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Score {
            as_of,
            source,
            output,
        } => score(&config, as_of, &source, output.as_deref(), &cancel).await,
        Commands::Backtest {
            run,
            source,
            output,
        } => backtest(&config, &run, &source, output.as_deref(), &cancel).await,
        Commands::Audit { scores } => audit(&config, &scores),
        Commands::Import { input } => import(&config, &input).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "fundscope=info,coverage_controller=info,backtester=info,fund_core=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn scoring_engine(config: &AppConfig) -> Result<ScoringEngine> {
    let scorer = CompositeScorer::from_settings(&config.scoring).context("failed to load ladders")?;
    Ok(ScoringEngine::new(
        MetricsCalculator::new(config.metrics.clone()),
        scorer,
    ))
}

async fn connect(config: &AppConfig) -> Result<PgPool> {
    let database = config
        .database
        .as_ref()
        .context("database not configured; set DATABASE_URL")?;
    let pool = db::create_pool(database).await?;
    db::ensure_schema(&pool).await?;
    Ok(pool)
}

fn load_snapshot(source: &Source) -> Result<Arc<InMemoryStore>> {
    let path = source
        .input
        .as_deref()
        .context("either --input or --database is required")?;
    let snapshot = UniverseSnapshot::load(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    Ok(Arc::new(snapshot.into_store()))
}

async fn score(
    config: &AppConfig,
    as_of: NaiveDate,
    source: &Source,
    output: Option<&Path>,
    cancel: &CancelFlag,
) -> Result<()> {
    let scoring = scoring_engine(config)?;

    let summary = if source.database {
        let pool = connect(config).await?;
        let store = Arc::new(PgFundStore::new(pool.clone()));
        let sink = Arc::new(PgScoreSink::new(pool));
        if output.is_some() {
            warn!("--output is ignored with --database; scores are written to the database");
        }
        CoverageController::from_store(store, sink, config.coverage.clone())?
            .with_scoring(scoring)
            .run(as_of, cancel)
            .await?
    } else {
        let store = load_snapshot(source)?;
        let sink = Arc::new(InMemoryScoreSink::new());
        let summary = CoverageController::from_store(store, sink.clone(), config.coverage.clone())?
            .with_scoring(scoring)
            .run(as_of, cancel)
            .await?;
        if let Some(path) = output {
            write_json(path, &sink.scores())?;
            info!(path = %path.display(), records = sink.score_count(), "Wrote scores");
        }
        summary
    };

    print_json(&summary)
}

async fn backtest(
    config: &AppConfig,
    run_file: &Path,
    source: &Source,
    output: Option<&Path>,
    cancel: &CancelFlag,
) -> Result<()> {
    let raw = std::fs::read_to_string(run_file)
        .with_context(|| format!("failed to read backtest configuration {}", run_file.display()))?;
    let mut run: BacktestConfig = serde_json::from_str(&raw).context("invalid backtest configuration")?;
    if run.benchmark_id.is_none() {
        run.benchmark_id = config.backtest.benchmark_id.clone();
    }
    if run.period_timeout_secs.is_none() {
        run.period_timeout_secs = config.backtest.period_timeout_secs;
    }

    let scoring = scoring_engine(config)?;
    let engine = if source.database {
        let pool = connect(config).await?;
        BacktestEngine::from_store(Arc::new(PgFundStore::new(pool.clone())))
            .with_sink(Arc::new(PgBacktestSink::new(pool)))
    } else {
        BacktestEngine::from_store(load_snapshot(source)?)
    };

    let result = engine
        .with_scoring(scoring)
        .with_workers(config.backtest.workers)
        .run(&run, cancel)
        .await?;

    if let Some(path) = output {
        write_json(path, &result)?;
        info!(path = %path.display(), "Wrote backtest result");
    }

    print_json(&serde_json::json!({
        "run_id": result.run_id,
        "label": result.config.label,
        "periods": result.periods.len(),
        "degraded_periods": result.degraded_periods,
        "total_return": result.total_return,
        "volatility": result.metrics.risk.volatility,
        "sharpe": result.metrics.risk.sharpe,
        "max_drawdown": result.metrics.risk.drawdown_magnitude(),
        "relative": result.relative,
        "cancelled": result.cancelled,
        "persisted": result.persisted,
    }))
}

fn audit(config: &AppConfig, scores: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(scores)
        .with_context(|| format!("failed to read scores {}", scores.display()))?;
    let records: Vec<ScoreRecord> = serde_json::from_str(&raw).context("invalid score records")?;
    let scorer = CompositeScorer::from_settings(&config.scoring)?;

    let report = audit_scores(&records, scorer.book());
    if !report.is_clean() {
        warn!(
            out_of_range = report.out_of_range.len(),
            invalid_components = report.invalid_components.len(),
            duplicates = report.duplicate_keys.len(),
            "Score audit found problems"
        );
    }
    print_json(&report)
}

async fn import(config: &AppConfig, input: &Path) -> Result<()> {
    let snapshot = UniverseSnapshot::load(input)
        .with_context(|| format!("failed to read snapshot {}", input.display()))?;
    let store = PgFundStore::new(connect(config).await?);

    let mut points = 0;
    for entity in &snapshot.entities {
        store.upsert_attributes(&entity.attributes).await?;
        points += store
            .append_points(&entity.attributes.entity_id, &entity.nav)
            .await?;
    }
    for benchmark in &snapshot.benchmarks {
        points += store
            .append_benchmark_points(&benchmark.benchmark_id, &benchmark.nav)
            .await?;
    }

    info!(
        entities = snapshot.entities.len(),
        benchmarks = snapshot.benchmarks.len(),
        points,
        "Import complete"
    );
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
