//! Pass-level and run-level coverage statistics.

use chrono::{DateTime, NaiveDate, Utc};
use fund_core::config::RelaxationStep;
use fund_core::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why the pass loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every entity was scored or failed permanently.
    Exhausted,
    /// A pass at the loosest step scored nothing new.
    NoNewEligible,
    /// The safety pass cap was reached.
    PassCap,
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::Exhausted => "exhausted",
            Termination::NoNewEligible => "no_new_eligible",
            Termination::PassCap => "pass_cap",
            Termination::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub pass: usize,
    pub step: RelaxationStep,
    /// Entities still pending when the pass started.
    pub attempted: usize,
    /// Entities meeting the step's history requirements.
    pub eligible: usize,
    pub scored: usize,
    /// Eligible entities whose computation failed, timed out or was not persisted.
    pub failed: usize,
    pub batches: usize,
    pub timed_out: usize,
    /// Every non-success outcome of the pass, including ineligibility.
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
}

impl PassSummary {
    pub(crate) fn new(pass: usize, step: RelaxationStep, attempted: usize) -> Self {
        Self {
            pass,
            step,
            attempted,
            eligible: 0,
            scored: 0,
            failed: 0,
            batches: 0,
            timed_out: 0,
            failures_by_kind: BTreeMap::new(),
        }
    }

    pub(crate) fn record_failure(&mut self, kind: ErrorKind) {
        *self.failures_by_kind.entry(kind).or_insert(0) += 1;
    }

    pub fn failures(&self, kind: ErrorKind) -> usize {
        self.failures_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// Outcome of one coverage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub as_of: NaiveDate,
    pub total_entities: usize,
    pub scored: usize,
    /// Entities excluded for good after invalid input or a missing record.
    pub permanently_failed: usize,
    /// Entities still unscored when the loop stopped.
    pub unscored: usize,
    pub rankings_written: usize,
    pub passes: Vec<PassSummary>,
    pub termination: Termination,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl CoverageSummary {
    /// Scored share of the universe, in percent.
    pub fn coverage_pct(&self) -> f64 {
        if self.total_entities == 0 {
            return 0.0;
        }
        self.scored as f64 / self.total_entities as f64 * 100.0
    }

    /// Failure counts summed over all passes.
    pub fn failures_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut totals = BTreeMap::new();
        for pass in &self.passes {
            for (kind, count) in &pass.failures_by_kind {
                *totals.entry(*kind).or_insert(0) += count;
            }
        }
        totals
    }
}
