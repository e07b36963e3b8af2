//! Batched scoring passes with progressive relaxation.

use chrono::{NaiveDate, Utc};
use fund_core::config::{CoverageConfig, RelaxationStep};
use fund_core::store::{BenchmarkStore, EntityRegistry, ScoreSink, ValueStore};
use fund_core::{
    CancelFlag, Error, ErrorKind, Result, ScoreRecord, TaskOutcome, WorkerPool,
};
use fund_scoring::{PeerRankingEngine, ScoringEngine};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::policy::RelaxationPolicy;
use crate::summary::{CoverageSummary, PassSummary, Termination};

/// Read-side collaborators shared with every scoring task.
#[derive(Clone)]
struct Sources {
    values: Arc<dyn ValueStore>,
    benchmarks: Arc<dyn BenchmarkStore>,
    registry: Arc<dyn EntityRegistry>,
}

/// Outcome of one entity within one pass.
enum EntityOutcome {
    Scored(ScoreRecord),
    Ineligible,
    Failed(Error),
}

pub struct CoverageController {
    sources: Sources,
    sink: Arc<dyn ScoreSink>,
    scoring: ScoringEngine,
    config: CoverageConfig,
    policy: RelaxationPolicy,
}

impl CoverageController {
    pub fn new(
        values: Arc<dyn ValueStore>,
        benchmarks: Arc<dyn BenchmarkStore>,
        registry: Arc<dyn EntityRegistry>,
        sink: Arc<dyn ScoreSink>,
        config: CoverageConfig,
    ) -> Result<Self> {
        config.validate()?;
        let policy = RelaxationPolicy::from_config(&config)?;
        Ok(Self {
            sources: Sources {
                values,
                benchmarks,
                registry,
            },
            sink,
            scoring: ScoringEngine::default(),
            config,
            policy,
        })
    }

    /// Controller reading values, benchmarks and attributes from one store.
    pub fn from_store<S>(store: Arc<S>, sink: Arc<dyn ScoreSink>, config: CoverageConfig) -> Result<Self>
    where
        S: ValueStore + BenchmarkStore + EntityRegistry + 'static,
    {
        Self::new(store.clone(), store.clone(), store, sink, config)
    }

    /// Scorer and base metric parameters; each pass overrides the lookback and sample floor.
    pub fn with_scoring(mut self, scoring: ScoringEngine) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn policy(&self) -> &RelaxationPolicy {
        &self.policy
    }

    /// Score the universe as of `as_of` and rank the results.
    ///
    /// Each entity has at most one outcome per pass. Invalid input and missing
    /// records exclude an entity for the rest of the run; other failures leave
    /// it pending for the next, looser pass. The loop stops once nothing is
    /// pending, a pass at the loosest step scores nothing new, the pass cap is
    /// reached, or `cancel` is set between batches.
    pub async fn run(&self, as_of: NaiveDate, cancel: &CancelFlag) -> Result<CoverageSummary> {
        let started_at = Utc::now();
        let ids = self.sources.registry.entity_ids().await?;
        let total_entities = ids.len();

        info!(
            %as_of,
            entities = total_entities,
            batch_size = self.config.batch_size,
            workers = self.config.workers,
            steps = self.policy.steps().len(),
            "Starting coverage run"
        );

        let mut pending: BTreeSet<String> = ids.into_iter().collect();
        let mut scored: BTreeMap<String, ScoreRecord> = BTreeMap::new();
        let mut permanently_failed = 0;
        let mut passes = Vec::new();
        let mut termination = Termination::PassCap;

        for pass in 0..self.config.max_passes {
            if pending.is_empty() {
                termination = Termination::Exhausted;
                break;
            }

            let step = self.policy.step(pass);
            let mut summary = PassSummary::new(pass, step, pending.len());
            let queue: Vec<String> = pending.iter().cloned().collect();
            let mut cancelled = false;

            for batch in queue.chunks(self.config.batch_size) {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                summary.batches += 1;

                let outcomes = self.score_batch(batch, &step, as_of).await;
                let mut records = Vec::new();
                let mut timed_out = 0;

                for (entity_id, outcome) in batch.iter().zip(outcomes) {
                    match outcome {
                        TaskOutcome::Completed(EntityOutcome::Scored(record)) => {
                            summary.eligible += 1;
                            records.push(record);
                        }
                        TaskOutcome::Completed(EntityOutcome::Ineligible) => {
                            summary.record_failure(ErrorKind::InsufficientData);
                        }
                        TaskOutcome::Completed(EntityOutcome::Failed(e)) => {
                            summary.eligible += 1;
                            summary.failed += 1;
                            summary.record_failure(e.kind());
                            if e.is_retryable() {
                                debug!(entity = %entity_id, error = %e, "Scoring failed, will retry");
                            } else {
                                warn!(entity = %entity_id, error = %e, "Scoring failed, excluding entity");
                                pending.remove(entity_id);
                                permanently_failed += 1;
                            }
                        }
                        TaskOutcome::TimedOut => {
                            timed_out += 1;
                            summary.failed += 1;
                            summary.record_failure(ErrorKind::BatchTimeout);
                        }
                        TaskOutcome::Panicked(message) => {
                            warn!(entity = %entity_id, panic = %message, "Scoring panicked, excluding entity");
                            summary.failed += 1;
                            summary.record_failure(ErrorKind::TaskFailed);
                            pending.remove(entity_id);
                            permanently_failed += 1;
                        }
                    }
                }

                if timed_out > 0 {
                    summary.timed_out += timed_out;
                    warn!(
                        pass,
                        timed_out,
                        timeout_secs = self.config.batch_timeout_secs,
                        "Batch deadline exceeded"
                    );
                }

                if records.is_empty() {
                    continue;
                }
                match self.sink.upsert_scores(&records).await {
                    Ok(_) => {
                        for record in records {
                            pending.remove(&record.entity_id);
                            scored.insert(record.entity_id.clone(), record);
                            summary.scored += 1;
                        }
                    }
                    Err(e) => {
                        warn!(pass, records = records.len(), error = %e, "Failed to persist batch scores");
                        summary.failed += records.len();
                        for _ in &records {
                            summary.record_failure(e.kind());
                        }
                    }
                }
            }

            info!(
                pass,
                min_history_days = step.min_history_days,
                attempted = summary.attempted,
                eligible = summary.eligible,
                scored = summary.scored,
                failed = summary.failed,
                pending = pending.len(),
                "Coverage pass complete"
            );

            let added = summary.scored;
            passes.push(summary);

            if cancelled {
                termination = Termination::Cancelled;
                break;
            }
            if pending.is_empty() {
                termination = Termination::Exhausted;
                break;
            }
            if added == 0 && self.policy.is_loosest(pass) {
                termination = Termination::NoNewEligible;
                break;
            }
        }

        // Ranking barrier: every pass has finished before any group is ranked
        let records: Vec<ScoreRecord> = scored.into_values().collect();
        let rankings = PeerRankingEngine::rank_all(&records);
        let rankings_written = match self.sink.upsert_rankings(&rankings).await {
            Ok(n) => n,
            Err(e) => {
                warn!(rankings = rankings.len(), error = %e, "Failed to persist rankings");
                0
            }
        };

        let summary = CoverageSummary {
            as_of,
            total_entities,
            scored: records.len(),
            permanently_failed,
            unscored: pending.len(),
            rankings_written,
            passes,
            termination,
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            %as_of,
            scored = summary.scored,
            total = summary.total_entities,
            coverage_pct = summary.coverage_pct(),
            termination = %summary.termination,
            "Coverage run complete"
        );

        Ok(summary)
    }

    async fn score_batch(
        &self,
        batch: &[String],
        step: &RelaxationStep,
        as_of: NaiveDate,
    ) -> Vec<TaskOutcome<EntityOutcome>> {
        let metrics = RelaxationPolicy::metrics_config(step, self.scoring.calculator().config());
        let scoring = Arc::new(self.scoring.with_metrics_config(metrics));
        let pool = WorkerPool::new(self.config.workers).with_batch_timeout(self.config.batch_timeout());
        let step = *step;

        pool.run(batch.to_vec(), |entity_id: String| {
            let sources = self.sources.clone();
            let scoring = scoring.clone();
            async move {
                match score_one(&sources, &scoring, &step, &entity_id, as_of).await {
                    Ok(Some(record)) => EntityOutcome::Scored(record),
                    Ok(None) => EntityOutcome::Ineligible,
                    Err(e) => EntityOutcome::Failed(e),
                }
            }
        })
        .await
    }
}

/// `Ok(None)` when the entity does not meet the step's history requirements.
async fn score_one(
    sources: &Sources,
    scoring: &ScoringEngine,
    step: &RelaxationStep,
    entity_id: &str,
    as_of: NaiveDate,
) -> Result<Option<ScoreRecord>> {
    let attributes = sources.registry.attributes(entity_id).await?;
    let series = sources.values.series(entity_id, None, Some(as_of)).await?;

    if let Err(e) = RelaxationPolicy::check_eligible(step, &series) {
        debug!(entity = %entity_id, reason = %e, "Not eligible at this step");
        return Ok(None);
    }

    let benchmark = match &attributes.benchmark_id {
        Some(id) => match sources.benchmarks.benchmark_series(id, None, Some(as_of)).await {
            Ok(series) => Some(series),
            Err(e) => {
                debug!(entity = %entity_id, benchmark = %id, error = %e, "Benchmark unavailable");
                None
            }
        },
        None => None,
    };

    scoring
        .score_entity(&series, benchmark.as_ref(), &attributes, as_of)
        .map(Some)
}
