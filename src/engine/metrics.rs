//! Run metrics.
//!
//! Rules carry lifetime counters (atomics bumped by every run that shares
//! them). The numbers here are per-run: they are folded from the run's own
//! records once the batch finishes, so two runs over the same `RuleSet` do
//! not see each other's work.
//!
//! ## Design notes
//!
//! - `RuleStats` has one entry per rule in the set, in cascade order, even
//!   for rules that were never reached.
//! - Durations are wall-clock and only meaningful for profiling.

use serde::Serialize;
use std::time::Duration;

use super::record::TransformationRecord;
use crate::rule::RuleId;
use crate::rule_set::RuleSet;

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunMetrics {
    /// Total elapsed time for the run.
    pub total: Duration,
    /// Time spent in the cascade phase (all states).
    pub cascade: Duration,
    /// Time spent building the provenance graph.
    pub graph: Duration,
    /// Raw inputs received, before duplicates were collapsed.
    pub inputs: usize,
    /// Distinct text states processed.
    pub states: usize,
    pub records: usize,
    /// Records that committed a rewrite.
    pub rewrites: usize,
    /// States frozen by an exit rule.
    pub finalized: usize,
    pub rules: Vec<RuleStats>,
}

/// Per-rule activity within one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RuleStats {
    pub rule: RuleId,
    /// Times the rule was visited by a cascade.
    pub applications: usize,
    /// Visits that committed a rewrite.
    pub rewrites: usize,
    /// Visits whose output came from retrying on the original text.
    pub retries: usize,
    /// Visits that failed with an execution error.
    pub errors: usize,
    pub elapsed: Duration,
}

impl RuleStats {
    /// Fold `records` into one entry per rule of `rules`.
    pub fn collect<'r>(rules: &RuleSet, records: impl IntoIterator<Item = &'r TransformationRecord>) -> Vec<RuleStats> {
        let mut stats: Vec<RuleStats> =
            rules.rules().iter().map(|r| RuleStats { rule: r.id(), ..Default::default() }).collect();

        for rec in records {
            let Some(entry) = stats.get_mut(rec.rule_id()) else {
                continue;
            };
            entry.applications += 1;
            entry.elapsed += rec.elapsed;
            if rec.committed() {
                entry.rewrites += 1;
            }
            if rec.retried {
                entry.retries += 1;
            }
            if rec.error.is_some() {
                entry.errors += 1;
            }
        }

        stats
    }
}
