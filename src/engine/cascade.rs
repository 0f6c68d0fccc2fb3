//! The cascade state machine.
//!
//! This module is the operational core of the engine: it walks an ordered rule
//! list over one [`TextState`] and emits one [`TransformationRecord`] per rule
//! it visits.
//!
//! ## Per-rule step
//!
//! ```text
//! reset changed_this_step
//!      │
//!      ▼
//! match+replace on current ──changed──▶ commit ──exit_on_match?──▶ finalize, stop
//!      │
//!      ├─matched, same text, exit_on_match──▶ finalize, stop
//!      │
//!      └─no change──▶ retry_from_original && ever_changed?
//!                        │
//!                        ▼
//!               simulate on original ──matched──▶ interference scan, commit
//! ```
//!
//! An execution error (oversized input, match timeout) turns the step into a
//! no-match: the record carries the error and the state is left as it was.
//!
//! ## Batches
//!
//! [`CascadeEngine::run_batch`] fans states out over the rayon pool. Cascades
//! share nothing but the rule counters, which are atomics. The cancellation
//! token is checked before each state starts; a cascade already running is
//! allowed to finish.

use rayon::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::interference::find_interfering_rules;
use super::record::TransformationRecord;
use crate::error::{CategorizeError, RuleExecutionError};
use crate::rule::{ExecLimits, Rewrite, Rule, RuleId};
use crate::rule_set::RuleSet;
use crate::state::TextState;

/// Applies a [`RuleSet`] to text states.
///
/// The engine is stateless over rules: it can be shared by reference across
/// threads and reused for any number of states.
#[derive(Debug, Clone, Copy)]
pub struct CascadeEngine<'a> {
    rules: &'a RuleSet,
    limits: ExecLimits,
    detect_interference: bool,
}

impl<'a> CascadeEngine<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        CascadeEngine { rules, limits: ExecLimits::default(), detect_interference: true }
    }

    pub fn with_limits(mut self, limits: ExecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn detect_interference(mut self, enabled: bool) -> Self {
        self.detect_interference = enabled;
        self
    }

    pub fn rules(&self) -> &'a RuleSet {
        self.rules
    }

    /// Run the whole cascade over `state`, rewriting it in place.
    ///
    /// A state that is already final is left alone and yields no records.
    pub fn run(&self, state: &mut TextState) -> Vec<TransformationRecord> {
        let mut records = Vec::new();
        if state.is_final() {
            trace!(state = %state.id(), "already final, cascade skipped");
            return records;
        }

        for (idx, rule) in self.rules.rules().iter().enumerate() {
            records.push(self.apply(idx, rule, state));
            if state.is_final() {
                debug!(state = %state.id(), rule = rule.id(), category = ?state.category(), "exit rule matched");
                break;
            }
        }

        records
    }

    /// Run every state, in parallel when `parallel` is set.
    ///
    /// Records come back grouped per state, in the order of `states`.
    pub fn run_batch(
        &self,
        states: &mut [TextState],
        parallel: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<TransformationRecord>>, CategorizeError> {
        self.run_batch_observed(states, parallel, cancel, |_| {})
    }

    /// [`run_batch`](Self::run_batch), calling `done` after each state's
    /// cascade finishes.
    pub(crate) fn run_batch_observed<F>(
        &self,
        states: &mut [TextState],
        parallel: bool,
        cancel: &CancellationToken,
        done: F,
    ) -> Result<Vec<Vec<TransformationRecord>>, CategorizeError>
    where
        F: Fn(&TextState) + Sync,
    {
        let total = states.len();
        let step = |state: &mut TextState| {
            if cancel.is_cancelled() {
                return None;
            }
            let records = self.run(state);
            done(state);
            Some(records)
        };

        let results: Vec<Option<Vec<TransformationRecord>>> =
            if parallel { states.par_iter_mut().map(step).collect() } else { states.iter_mut().map(step).collect() };

        if cancel.is_cancelled() {
            let processed = results.iter().filter(|r| r.is_some()).count();
            if processed < total {
                return Err(CategorizeError::Cancelled { processed, total });
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Apply the rule at cascade position `idx` to `state`.
    fn apply(&self, idx: usize, rule: &Arc<Rule>, state: &mut TextState) -> TransformationRecord {
        let source = state.snapshot();
        state.begin_step();
        let input = state.current().to_string();

        let first = match rule.simulate(&input, &self.limits) {
            Ok(rw) => rw,
            Err(err) => {
                warn!(state = %state.id(), rule = rule.id(), %err, "rule execution failed, treated as no match");
                return self.record(source, state, rule, Step::failed(input, err));
            }
        };

        if first.changes(&input) {
            commit(rule, state, &first);
            trace!(state = %state.id(), rule = rule.id(), output = %first.output, "rewrite");
            return self.record(source, state, rule, Step::applied(input, first, false));
        }
        rule.record_elapsed(first.elapsed);

        if first.matched && rule.exit_on_match() {
            state.finalize();
            return self.record(source, state, rule, Step::applied(input, first, false));
        }

        if !(rule.retry_from_original() && state.ever_changed()) {
            return self.record(source, state, rule, Step::applied(input, first, false));
        }

        let original = state.original().to_string();
        let retry = match rule.simulate(&original, &self.limits) {
            Ok(rw) => rw,
            Err(err) => {
                warn!(state = %state.id(), rule = rule.id(), %err, "retry from original failed");
                return self.record(source, state, rule, Step::failed(input, err));
            }
        };
        if !retry.matched {
            rule.record_elapsed(retry.elapsed);
            return self.record(source, state, rule, Step::applied(input, first, false));
        }

        let interfering = if self.detect_interference {
            find_interfering_rules(&self.rules.rules()[..idx], rule, &original, &self.limits)
        } else {
            Vec::new()
        };
        for &earlier in &interfering {
            warn!(
                state = %state.id(),
                rule = rule.id(),
                interfering = earlier,
                original = %original,
                "earlier rule interferes with a rule that matches the original"
            );
        }

        commit(rule, state, &retry);
        debug!(state = %state.id(), rule = rule.id(), output = %retry.output, "retried from original");
        let mut step = Step::applied(original, retry, true);
        step.interfering = interfering;
        self.record(source, state, rule, step)
    }

    fn record(&self, source: Arc<TextState>, state: &TextState, rule: &Arc<Rule>, step: Step) -> TransformationRecord {
        TransformationRecord {
            source,
            target: state.snapshot(),
            rule: Arc::clone(rule),
            matched: step.matched,
            input: step.input,
            output: step.output,
            retried: step.retried,
            interfering: step.interfering,
            elapsed: step.elapsed,
            error: step.error,
        }
    }
}

/// Write `rw.output` into `state` and update the rule's counters.
///
/// Exit-on-match freezes the category on any match, whether the output came
/// from `current` or from a retry on `original`.
fn commit(rule: &Rule, state: &mut TextState, rw: &Rewrite) {
    if state.commit(rw.output.clone()) {
        rule.record_match(rw.elapsed);
    } else {
        rule.record_elapsed(rw.elapsed);
    }
    if rw.matched && rule.exit_on_match() {
        state.finalize();
    }
}

/// Record payload for one step, before snapshots are attached.
struct Step {
    matched: bool,
    input: String,
    output: String,
    retried: bool,
    interfering: Vec<RuleId>,
    elapsed: Duration,
    error: Option<RuleExecutionError>,
}

impl Step {
    fn applied(input: String, rw: Rewrite, retried: bool) -> Self {
        Step {
            matched: rw.matched,
            input,
            output: rw.output,
            retried,
            interfering: Vec::new(),
            elapsed: rw.elapsed,
            error: None,
        }
    }

    fn failed(input: String, err: RuleExecutionError) -> Self {
        let elapsed = match &err {
            RuleExecutionError::Timeout { elapsed, .. } => *elapsed,
            RuleExecutionError::InputTooLarge { .. } => Duration::ZERO,
        };
        Step {
            matched: false,
            output: input.clone(),
            input,
            retried: false,
            interfering: Vec::new(),
            elapsed,
            error: Some(err),
        }
    }
}
