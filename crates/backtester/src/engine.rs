//! Point-in-time backtest driver.

use chrono::{Duration, NaiveDate, Utc};
use fund_core::store::{BacktestResultSink, BenchmarkStore, EntityRegistry, ValueStore};
use fund_core::{
    CancelFlag, FundAttributes, NavPoint, PortfolioSnapshot, Result, ScoreRecord, TaskOutcome,
    ValueSeries, WorkerPool,
};
use fund_metrics::MetricsCalculator;
use fund_scoring::{PeerRankingEngine, ScoringEngine};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::BacktestConfig;
use crate::result::{benchmark_relative, BacktestResult, PeriodRecord};
use crate::selection::{select, Candidate, SelectionState};

/// Starting value of every equity curve.
pub const BASE_NAV: Decimal = Decimal::ONE_THOUSAND;

/// One entity of the filtered universe with its full loaded history.
#[derive(Debug)]
struct UniverseEntry {
    attributes: FundAttributes,
    series: Arc<ValueSeries>,
}

/// Runs selection strategies over historical rebalance dates.
///
/// Scoring at a rebalance date only ever sees values dated on or before that
/// date. Later values are read only to measure the realized return of the
/// holdings chosen.
pub struct BacktestEngine {
    values: Arc<dyn ValueStore>,
    benchmarks: Arc<dyn BenchmarkStore>,
    registry: Arc<dyn EntityRegistry>,
    sink: Option<Arc<dyn BacktestResultSink>>,
    scoring: Arc<ScoringEngine>,
    workers: usize,
}

impl BacktestEngine {
    pub fn new(
        values: Arc<dyn ValueStore>,
        benchmarks: Arc<dyn BenchmarkStore>,
        registry: Arc<dyn EntityRegistry>,
    ) -> Self {
        Self {
            values,
            benchmarks,
            registry,
            sink: None,
            scoring: Arc::new(ScoringEngine::default()),
            workers: 8,
        }
    }

    /// Engine reading values, benchmarks and attributes from one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ValueStore + BenchmarkStore + EntityRegistry + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }

    pub fn with_sink(mut self, sink: Arc<dyn BacktestResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringEngine) -> Self {
        self.scoring = Arc::new(scoring);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run one backtest.
    ///
    /// Configuration errors fail the run. Per-entity scoring failures only
    /// exclude that entity for the period. When `cancel` is set the run stops
    /// before the next period and returns what it has, flagged `cancelled`.
    pub async fn run(&self, config: &BacktestConfig, cancel: &CancelFlag) -> Result<BacktestResult> {
        config.validate()?;
        let schedule = config.rebalance_schedule();

        info!(
            run_id = %config.run_id,
            label = %config.label,
            start = %config.start,
            end = %config.end,
            periods = schedule.len(),
            "Starting backtest"
        );

        let universe = self.load_universe(config).await?;
        let benchmarks = self.load_benchmarks(&universe, config).await;
        let prices: HashMap<&str, &Arc<ValueSeries>> = universe
            .iter()
            .map(|e| (e.attributes.entity_id.as_str(), &e.series))
            .collect();
        let reference = config
            .benchmark_id
            .as_ref()
            .and_then(|id| benchmarks.get(id).cloned());

        let mut periods: Vec<PeriodRecord> = Vec::with_capacity(schedule.len());
        let mut curve = vec![NavPoint::new(config.start, BASE_NAV)];
        let mut cancelled = false;

        for (i, &rebalance_date) in schedule.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(run_id = %config.run_id, completed = periods.len(), "Backtest cancelled");
                cancelled = true;
                break;
            }

            let period_end = schedule.get(i + 1).copied().unwrap_or(config.end);

            // Score and rank using only data visible at the rebalance date
            let (scores, failures) = self
                .score_universe(&universe, &benchmarks, rebalance_date, config)
                .await;
            let rankings = PeerRankingEngine::rank_all(&scores);
            let candidates = Candidate::from_scored(&scores, &rankings);

            let mut state = SelectionState::new();
            select(&config.rule, &candidates, &mut state);

            let snapshot = if state.is_empty() {
                match periods.last() {
                    Some(prior) => prior.snapshot.carried_to(rebalance_date),
                    None => PortfolioSnapshot::cash(rebalance_date),
                }
            } else {
                PortfolioSnapshot::equal_weight(
                    rebalance_date,
                    &state.into_selected(),
                    config.gross_exposure,
                )
            };
            if snapshot.degraded {
                warn!(
                    %rebalance_date,
                    carried_forward = snapshot.carried_forward,
                    scored = scores.len(),
                    "Selection matched no entities"
                );
            }

            // Hold the snapshot through the period
            let start_nav = curve.last().map(|p| p.value).unwrap_or(BASE_NAV);
            let held = hold_period(&snapshot, &prices, rebalance_date, period_end, start_nav);
            let end_nav = held.last().map(|p| p.value).unwrap_or(start_nav);
            curve.extend(held);

            let portfolio_return = ((end_nav - start_nav) / start_nav).to_f64().unwrap_or(0.0);
            let benchmark_return = reference
                .as_deref()
                .and_then(|b| window_return(b, rebalance_date, period_end));

            debug!(
                %rebalance_date,
                %period_end,
                holdings = snapshot.weights.len(),
                scored = scores.len(),
                failures,
                portfolio_return,
                "Period complete"
            );

            periods.push(PeriodRecord {
                rebalance_date,
                period_end,
                degraded: snapshot.degraded,
                snapshot,
                scored: scores.len(),
                scoring_failures: failures,
                portfolio_return,
                benchmark_return,
            });
        }

        let mut result = self.summarize(config, periods, curve, reference.as_deref(), cancelled)?;
        self.persist(&mut result).await;

        info!(
            run_id = %result.run_id,
            total_return = result.total_return,
            periods = result.periods.len(),
            degraded_periods = result.degraded_periods,
            cancelled = result.cancelled,
            "Backtest completed"
        );

        Ok(result)
    }

    async fn load_universe(&self, config: &BacktestConfig) -> Result<Vec<Arc<UniverseEntry>>> {
        let ids = self.registry.entity_ids().await?;
        let mut universe = Vec::with_capacity(ids.len());

        for id in ids {
            let attributes = match self.registry.attributes(&id).await {
                Ok(a) => a,
                Err(e) => {
                    warn!(entity = %id, error = %e, "Skipping entity without attributes");
                    continue;
                }
            };
            if !config.peer_filter.matches(&attributes) {
                continue;
            }
            match self.values.series(&id, None, Some(config.end)).await {
                Ok(series) => universe.push(Arc::new(UniverseEntry {
                    attributes,
                    series: Arc::new(series),
                })),
                Err(e) => warn!(entity = %id, error = %e, "Skipping entity with unreadable series"),
            }
        }

        info!(entities = universe.len(), "Loaded backtest universe");
        Ok(universe)
    }

    async fn load_benchmarks(
        &self,
        universe: &[Arc<UniverseEntry>],
        config: &BacktestConfig,
    ) -> HashMap<String, Arc<ValueSeries>> {
        let ids: BTreeSet<&String> = universe
            .iter()
            .filter_map(|e| e.attributes.benchmark_id.as_ref())
            .chain(config.benchmark_id.as_ref())
            .collect();

        let mut loaded = HashMap::new();
        for id in ids {
            match self.benchmarks.benchmark_series(id, None, Some(config.end)).await {
                Ok(series) => {
                    loaded.insert(id.clone(), Arc::new(series));
                }
                Err(e) => warn!(benchmark = %id, error = %e, "Benchmark unavailable"),
            }
        }
        loaded
    }

    /// Score every entity with history at `as_of`; returns records and the failure count.
    async fn score_universe(
        &self,
        universe: &[Arc<UniverseEntry>],
        benchmarks: &HashMap<String, Arc<ValueSeries>>,
        as_of: NaiveDate,
        config: &BacktestConfig,
    ) -> (Vec<ScoreRecord>, usize) {
        let eligible: Vec<Arc<UniverseEntry>> = universe
            .iter()
            .filter(|e| e.series.first().is_some_and(|p| p.date <= as_of))
            .cloned()
            .collect();

        let mut pool = WorkerPool::new(self.workers);
        if let Some(timeout) = config.period_timeout() {
            pool = pool.with_batch_timeout(timeout);
        }

        let outcomes = pool
            .run(eligible, |entry: Arc<UniverseEntry>| {
                let scoring = self.scoring.clone();
                let benchmark = entry
                    .attributes
                    .benchmark_id
                    .as_ref()
                    .and_then(|id| benchmarks.get(id).cloned());
                async move {
                    let visible = entry.series.truncated(as_of);
                    let benchmark = benchmark.map(|b| b.truncated(as_of));
                    scoring
                        .score_entity(&visible, benchmark.as_ref(), &entry.attributes, as_of)
                        .map_err(|e| (entry.attributes.entity_id.clone(), e))
                }
            })
            .await;

        let mut scores = Vec::with_capacity(outcomes.len());
        let mut failures = 0;
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Completed(Ok(record)) => scores.push(record),
                TaskOutcome::Completed(Err((entity, e))) => {
                    debug!(%entity, %as_of, error = %e, "Scoring failed");
                    failures += 1;
                }
                TaskOutcome::TimedOut | TaskOutcome::Panicked(_) => failures += 1,
            }
        }
        (scores, failures)
    }

    fn summarize(
        &self,
        config: &BacktestConfig,
        periods: Vec<PeriodRecord>,
        curve: Vec<NavPoint>,
        reference: Option<&ValueSeries>,
        cancelled: bool,
    ) -> Result<BacktestResult> {
        let curve = ValueSeries::new(format!("backtest:{}", config.label), curve)?;
        let last_date = curve.last().map(|p| p.date).unwrap_or(config.start);
        let span_days = (last_date - config.start).num_days().max(1);

        // Treat the equity curve as one more value series
        let metrics_config = self
            .scoring
            .calculator()
            .config()
            .clone()
            .with_lookback_days(span_days)
            .with_min_samples(2);
        let calculator = MetricsCalculator::new(metrics_config.clone());
        let metrics = calculator.compute(&curve, last_date, reference)?;

        let total_return = match (curve.first(), curve.last()) {
            (Some(first), Some(last)) => ((last.value - first.value) / first.value)
                .to_f64()
                .unwrap_or(0.0),
            _ => 0.0,
        };

        let relative = reference.and_then(|b| {
            benchmark_relative(
                &curve,
                b,
                &periods,
                metrics_config.risk_free_rate,
                metrics_config.trading_periods_per_year,
            )
        });

        Ok(BacktestResult {
            run_id: config.run_id,
            config: config.clone(),
            degraded_periods: periods.iter().filter(|p| p.degraded).count(),
            periods,
            equity_curve: curve.points().to_vec(),
            metrics,
            total_return,
            relative,
            cancelled,
            persisted: false,
            completed_at: Utc::now(),
        })
    }

    async fn persist(&self, result: &mut BacktestResult) {
        let Some(sink) = &self.sink else {
            return;
        };

        let value = match serde_json::to_value(&*result) {
            Ok(v) => v,
            Err(e) => {
                warn!(run_id = %result.run_id, error = %e, "Failed to serialize backtest result");
                return;
            }
        };

        match sink
            .write_result(result.run_id, &result.config.label, &value)
            .await
        {
            Ok(()) => result.persisted = true,
            Err(e) => warn!(run_id = %result.run_id, error = %e, "Failed to persist backtest result"),
        }
    }
}

/// Buy-and-hold value path of `snapshot` over `(from, to]`, starting at `start_nav`.
///
/// Each holding is bought at its latest value on or before `from`; the unweighted
/// remainder stays in cash. Points are emitted on every date any holding reports
/// a value, forward-filling the others, and always on `to`.
fn hold_period(
    snapshot: &PortfolioSnapshot,
    prices: &HashMap<&str, &Arc<ValueSeries>>,
    from: NaiveDate,
    to: NaiveDate,
    start_nav: Decimal,
) -> Vec<NavPoint> {
    let mut cash = start_nav;
    let mut positions: Vec<(&ValueSeries, Decimal)> = Vec::new();

    for (entity_id, weight) in &snapshot.weights {
        let Some(&series) = prices.get(entity_id.as_str()) else {
            warn!(entity = %entity_id, "Holding missing from universe, kept in cash");
            continue;
        };
        let Some(entry) = series.latest_on_or_before(from) else {
            warn!(entity = %entity_id, %from, "Holding has no entry value, kept in cash");
            continue;
        };
        let allocation = (start_nav * weight).round_dp(10);
        positions.push((&**series, (allocation / entry.value).round_dp(10)));
        cash -= allocation;
    }

    let first_day = from + Duration::days(1);
    let mut dates: BTreeSet<NaiveDate> = positions
        .iter()
        .flat_map(|(series, _)| series.range(first_day, to).iter().map(|p| p.date))
        .collect();
    dates.insert(to);

    dates
        .into_iter()
        .map(|date| {
            let held: Decimal = positions
                .iter()
                .map(|(series, units)| {
                    series
                        .latest_on_or_before(date)
                        .map(|p| *units * p.value)
                        .unwrap_or(Decimal::ZERO)
                })
                .sum();
            NavPoint::new(date, (cash + held).round_dp(10))
        })
        .collect()
}

/// Simple return of `series` between the latest values on or before `from` and `to`.
fn window_return(series: &ValueSeries, from: NaiveDate, to: NaiveDate) -> Option<f64> {
    let start = series.latest_on_or_before(from)?;
    let end = series.latest_on_or_before(to)?;
    ((end.value - start.value) / start.value).to_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cadence, SelectionRule};
    use async_trait::async_trait;
    use fund_core::store::memory::{InMemoryBacktestSink, InMemoryStore};
    use fund_core::{Error, PeerKey};
    use mockall::mock;
    use uuid::Uuid;

    mock! {
        pub FailingSink {}

        #[async_trait]
        impl BacktestResultSink for FailingSink {
            async fn write_result(
                &self,
                run_id: Uuid,
                config_key: &str,
                result: &serde_json::Value,
            ) -> Result<()>;
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Daily points from `start` through `end` produced by `value(day_index)`.
    fn daily(start: NaiveDate, end: NaiveDate, value: impl Fn(i64) -> f64) -> Vec<NavPoint> {
        let days = (end - start).num_days();
        (0..=days)
            .map(|i| {
                let v = Decimal::from_f64_retain(value(i)).unwrap().round_dp(6);
                NavPoint::new(start + Duration::days(i), v)
            })
            .collect()
    }

    fn history_start() -> NaiveDate {
        date(2021, 1, 1)
    }

    fn steady(end: NaiveDate) -> Vec<NavPoint> {
        daily(history_start(), end, |i| 100.0 * 1.0005f64.powi(i as i32))
    }

    /// Slow grower that jumps tenfold on 2022-05-01.
    fn spiky(end: NaiveDate) -> Vec<NavPoint> {
        let jump = (date(2022, 5, 1) - history_start()).num_days();
        daily(history_start(), end, move |i| {
            let base = 100.0 * 1.0001f64.powi(i as i32);
            if i >= jump {
                base * 10.0
            } else {
                base
            }
        })
    }

    fn engine(store: InMemoryStore) -> BacktestEngine {
        BacktestEngine::from_store(Arc::new(store)).with_workers(2)
    }

    fn config(rule: SelectionRule) -> BacktestConfig {
        BacktestConfig::new(date(2022, 1, 1), date(2022, 10, 1), rule).cadence(Cadence::Quarterly)
    }

    #[tokio::test]
    async fn test_later_spike_does_not_change_earlier_selection() {
        let d2 = date(2022, 4, 1);
        let end = date(2022, 10, 1);

        let full = InMemoryStore::new();
        full.insert_entity(FundAttributes::new("a-steady", PeerKey::new("equity")), steady(end));
        full.insert_entity(FundAttributes::new("b-spiky", PeerKey::new("equity")), spiky(end));

        let truncated = InMemoryStore::new();
        truncated.insert_entity(FundAttributes::new("a-steady", PeerKey::new("equity")), steady(end));
        truncated.insert_entity(FundAttributes::new("b-spiky", PeerKey::new("equity")), spiky(d2));

        let config = config(SelectionRule::TopN { n: 1 });
        let with_spike = engine(full).run(&config, &CancelFlag::new()).await.unwrap();
        let without = engine(truncated).run(&config, &CancelFlag::new()).await.unwrap();

        assert_eq!(with_spike.periods.len(), 3);
        assert_eq!(
            with_spike.holdings_at(d2).unwrap().weights,
            without.holdings_at(d2).unwrap().weights
        );
        assert!(with_spike.holdings_at(d2).unwrap().weights.contains_key("a-steady"));
    }

    #[tokio::test]
    async fn test_zero_match_carries_prior_snapshot() {
        let d1 = date(2022, 1, 1);
        let d2 = date(2022, 4, 1);
        let end = date(2022, 10, 1);
        let crash = (d1 - history_start()).num_days();

        // Strong run-up, then a 60% loss right after the first rebalance
        let points = daily(history_start(), end, |i| {
            let v = 100.0 * 1.001f64.powi(i as i32);
            if i > crash {
                v * 0.4
            } else {
                v
            }
        });
        let attrs = FundAttributes::new("fund-a", PeerKey::new("equity"));

        let scoring = ScoringEngine::default();
        let series = ValueSeries::new("fund-a", points.clone()).unwrap();
        let at_d1 = scoring.score_entity(&series, None, &attrs, d1).unwrap().total_score;
        let at_d2 = scoring.score_entity(&series, None, &attrs, d2).unwrap().total_score;
        assert!(at_d1 > at_d2);

        let store = InMemoryStore::new();
        store.insert_entity(attrs, points);

        let rule = SelectionRule::ScoreRange {
            min: (at_d1 + at_d2) / 2.0,
            max: 100.0,
        };
        let result = engine(store).run(&config(rule), &CancelFlag::new()).await.unwrap();

        assert_eq!(result.periods.len(), 3);
        let first = &result.periods[0];
        let second = &result.periods[1];
        assert!(!first.degraded);
        assert!(second.degraded);
        assert!(second.snapshot.carried_forward);
        assert_eq!(second.snapshot.weights, first.snapshot.weights);
        assert_eq!(second.snapshot.rebalance_date, d2);
        assert!(result.degraded_periods >= 1);
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_weights_sum_to_exposure_and_curve_is_ordered() {
        let end = date(2022, 10, 1);
        let store = InMemoryStore::new();
        for (id, category) in [("a", "equity"), ("b", "equity"), ("c", "debt")] {
            store.insert_entity(FundAttributes::new(id, PeerKey::new(category)), steady(end));
        }

        let config = config(SelectionRule::TopN { n: 3 }).gross_exposure(Decimal::new(9, 1));
        let result = engine(store).run(&config, &CancelFlag::new()).await.unwrap();

        for period in &result.periods {
            assert_eq!(period.snapshot.gross_exposure(), Decimal::new(9, 1));
            assert_eq!(period.scored, 3);
        }
        assert!(result.equity_curve.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(result.equity_curve.last().unwrap().date, end);
        // 90% invested in a steadily rising fund, 10% idle cash
        assert!(result.total_return > 0.0);
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_partial_result() {
        let store = InMemoryStore::new();
        store.insert_entity(
            FundAttributes::new("a", PeerKey::new("equity")),
            steady(date(2022, 10, 1)),
        );

        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = engine(store)
            .run(&config(SelectionRule::TopN { n: 1 }), &cancel)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert!(result.periods.is_empty());
        assert_eq!(result.equity_curve.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_run() {
        let config = BacktestConfig::new(date(2022, 1, 1), date(2021, 1, 1), SelectionRule::TopN { n: 1 });
        let err = engine(InMemoryStore::new())
            .run(&config, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_result_written_once_to_sink() {
        let store = InMemoryStore::new();
        store.insert_entity(
            FundAttributes::new("a", PeerKey::new("equity")),
            steady(date(2022, 10, 1)),
        );
        let sink = Arc::new(InMemoryBacktestSink::new());
        let engine = engine(store).with_sink(sink.clone());

        let config = config(SelectionRule::TopN { n: 1 }).label("steady-top1");
        let first = engine.run(&config, &CancelFlag::new()).await.unwrap();
        assert!(first.persisted);
        assert!(sink.get(config.run_id).is_some());

        // Same run id again conflicts; the run still succeeds
        let second = engine.run(&config, &CancelFlag::new()).await.unwrap();
        assert!(!second.persisted);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_run() {
        let mut sink = MockFailingSink::new();
        sink.expect_write_result()
            .times(1)
            .returning(|_, _, _| Err(Error::PersistenceConflict("exists".into())));

        let store = InMemoryStore::new();
        store.insert_entity(
            FundAttributes::new("a", PeerKey::new("equity")),
            steady(date(2022, 10, 1)),
        );
        let result = engine(store)
            .with_sink(Arc::new(sink))
            .run(&config(SelectionRule::TopN { n: 1 }), &CancelFlag::new())
            .await
            .unwrap();

        assert!(!result.persisted);
        assert_eq!(result.periods.len(), 3);
    }

    #[tokio::test]
    async fn test_benchmark_relative_figures() {
        let end = date(2022, 10, 1);
        let store = InMemoryStore::new();
        store.insert_entity(
            FundAttributes::new("a", PeerKey::new("equity")).with_benchmark("idx"),
            steady(end),
        );
        store.insert_benchmark(
            "idx",
            daily(history_start(), end, |i| 100.0 + (i % 7) as f64),
        );

        let config = config(SelectionRule::TopN { n: 1 }).benchmark("idx");
        let result = engine(store).run(&config, &CancelFlag::new()).await.unwrap();

        let relative = result.relative.unwrap();
        assert!(relative.paired_samples > 2);
        assert!(relative.tracking_error > 0.0);
        assert!((0.0..=1.0).contains(&relative.hit_rate));
        assert!(result.periods.iter().all(|p| p.benchmark_return.is_some()));
    }

    #[test]
    fn test_hold_period_keeps_cash_remainder() {
        let series = Arc::new(
            ValueSeries::new(
                "a",
                vec![
                    NavPoint::new(date(2024, 1, 1), Decimal::new(10, 0)),
                    NavPoint::new(date(2024, 1, 15), Decimal::new(20, 0)),
                ],
            )
            .unwrap(),
        );
        let prices: HashMap<&str, &Arc<ValueSeries>> = [("a", &series)].into_iter().collect();
        let snapshot =
            PortfolioSnapshot::equal_weight(date(2024, 1, 1), &["a".to_string()], Decimal::new(5, 1));

        let path = hold_period(&snapshot, &prices, date(2024, 1, 1), date(2024, 2, 1), BASE_NAV);

        // 500 doubles to 1000, 500 cash unchanged
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].value, Decimal::new(1500, 0));
        assert_eq!(path[1].date, date(2024, 2, 1));
        assert_eq!(path[1].value, Decimal::new(1500, 0));
    }
}
