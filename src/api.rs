use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::{CascadeEngine, Interference, RuleStats, RunMetrics, TransformationRecord};
use crate::error::{CategorizeError, RuleCompilationError};
use crate::graph::{self, Graph, GraphBuilder, TierMode};
use crate::rule::{DEFAULT_REGEX_SIZE_LIMIT, ExecLimits};
use crate::rule_set::{RuleSet, RuleSetBuilder};
use crate::state::TextState;

/// Options that affect a categorization run.
#[derive(Debug, Clone)]
pub struct Options {
    /// How snapshots are grouped into aggregate nodes.
    pub tier_mode: TierMode,
    /// Run cascades on the rayon pool.
    pub parallel: bool,
    /// Scan earlier rules when a rule only matches on retry.
    pub detect_interference: bool,
    /// Matches slower than this count as failed.
    pub match_timeout: Option<Duration>,
    /// Inputs longer than this (in bytes) are not matched at all.
    pub max_input_len: Option<usize>,
    /// Compiled program size cap per pattern.
    pub regex_size_limit: usize,
    /// Build the provenance graph. Without it, resolution falls back to the
    /// final text of each state.
    pub build_graph: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            tier_mode: TierMode::default(),
            parallel: true,
            detect_interference: true,
            match_timeout: None,
            max_input_len: None,
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            build_graph: true,
        }
    }
}

impl Options {
    fn limits(&self) -> ExecLimits {
        ExecLimits { max_input_len: self.max_input_len, match_timeout: self.match_timeout }
    }
}

/// A rule set plus the options to run it with.
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: RuleSet,
    options: Options,
}

impl Categorizer {
    pub fn new(rules: RuleSet) -> Self {
        Categorizer { rules, options: Options::default() }
    }

    pub fn with_options(rules: RuleSet, options: Options) -> Self {
        Categorizer { rules, options }
    }

    /// Compile `builder` with `options.regex_size_limit`.
    pub fn from_builder(builder: RuleSetBuilder, options: Options) -> Result<Self, RuleCompilationError> {
        let rules = builder.build_with_limit(options.regex_size_limit)?;
        Ok(Categorizer { rules, options })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Categorize `inputs`. Duplicates are processed once.
    pub fn categorize<I, S>(&self, inputs: I) -> Result<Categorization, CategorizeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.categorize_with_cancel(inputs, &CancellationToken::new())
    }

    /// Like [`categorize`](Self::categorize), stopping early once `cancel`
    /// fires. States already running finish; the rest are never started.
    pub fn categorize_with_cancel<I, S>(
        &self,
        inputs: I,
        cancel: &CancellationToken,
    ) -> Result<Categorization, CategorizeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = Instant::now();
        let inputs: Vec<S> = inputs.into_iter().collect();
        let mut states = TextState::batch(&inputs);

        let engine = CascadeEngine::new(&self.rules)
            .with_limits(self.options.limits())
            .detect_interference(self.options.detect_interference);

        // Initial snapshots, so inputs no rule touches still get a detail node.
        let seeds: Vec<Arc<TextState>> =
            if self.options.build_graph { states.iter().map(TextState::snapshot).collect() } else { Vec::new() };

        let cascade_start = Instant::now();
        let records: Vec<TransformationRecord> =
            engine.run_batch(&mut states, self.options.parallel, cancel)?.into_iter().flatten().collect();
        let cascade = cascade_start.elapsed();

        let graph_start = Instant::now();
        let graph =
            self.options.build_graph.then(|| GraphBuilder::build_seeded(self.options.tier_mode, &seeds, &records));
        let graph_elapsed = graph_start.elapsed();

        let interferences: Vec<Interference> = records.iter().flat_map(Interference::from_record).collect();

        let metrics = RunMetrics {
            total: start.elapsed(),
            cascade,
            graph: graph_elapsed,
            inputs: inputs.len(),
            states: states.len(),
            records: records.len(),
            rewrites: records.iter().filter(|r| r.committed()).count(),
            finalized: states.iter().filter(|s| s.is_final()).count(),
            rules: RuleStats::collect(&self.rules, &records),
        };
        info!(
            inputs = metrics.inputs,
            states = metrics.states,
            rewrites = metrics.rewrites,
            finalized = metrics.finalized,
            interferences = interferences.len(),
            elapsed = ?metrics.total,
            "categorization finished"
        );

        Ok(Categorization::new(states, records, graph, metrics, interferences))
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct Categorization {
    pub states: Vec<TextState>,
    pub records: Vec<TransformationRecord>,
    pub graph: Option<Graph>,
    pub metrics: RunMetrics,
    pub interferences: Vec<Interference>,
    /// Lowercased original to the first state with that original.
    #[serde(skip)]
    by_original: HashMap<String, usize>,
}

impl Categorization {
    fn new(
        states: Vec<TextState>,
        records: Vec<TransformationRecord>,
        graph: Option<Graph>,
        metrics: RunMetrics,
        interferences: Vec<Interference>,
    ) -> Self {
        let mut by_original = HashMap::with_capacity(states.len());
        for (idx, state) in states.iter().enumerate() {
            by_original.entry(state.original().to_lowercase()).or_insert(idx);
        }
        Categorization { states, records, graph, metrics, interferences, by_original }
    }

    /// State whose original equals `original`, ignoring case.
    pub fn state_for(&self, original: &str) -> Option<&TextState> {
        self.by_original.get(&original.to_lowercase()).and_then(|&idx| self.states.get(idx))
    }

    /// Final description for `original`; the input itself when unknown.
    pub fn resolve_final(&self, original: &str) -> String {
        match &self.graph {
            Some(g) => graph::resolve_final(g, original),
            None => match self.state_for(original) {
                Some(state) => state.current().to_string(),
                None => {
                    debug!(original, "unknown input, returning it unchanged");
                    original.to_string()
                }
            },
        }
    }

    /// Structured walk for `original`. Empty when the graph was not built.
    pub fn debug_trail(&self, original: &str) -> Vec<graph::DebugStep> {
        self.graph.as_ref().map(|g| graph::debug_trail(g, original)).unwrap_or_default()
    }
}

/// Write the resolved final description of every item back onto it.
///
/// Runs on the rayon pool; `get_text` and `set_category` must be thread-safe.
pub fn assign_categories<T, G, F>(items: &mut [T], get_text: G, set_category: F, categorization: &Categorization)
where
    T: Send,
    G: Fn(&T) -> &str + Sync,
    F: Fn(&mut T, String) + Sync,
{
    items.par_iter_mut().for_each(|item| {
        let category = categorization.resolve_final(get_text(item));
        set_category(item, category);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleOptions;

    #[derive(Debug, Default)]
    struct Transaction {
        description: String,
        category: Option<String>,
    }

    fn transactions(descriptions: &[&str]) -> Vec<Transaction> {
        descriptions.iter().map(|d| Transaction { description: d.to_string(), category: None }).collect()
    }

    fn categorizer(options: Options) -> Categorizer {
        let builder = RuleSetBuilder::new()
            .add(r"\d{2}/\d{2}/\d{4}", "")
            .add(r"\s+$", "")
            .add_with("(coop|esselunga)", "Spesa", RuleOptions::EXIT_ON_MATCH)
            .add("carburante", "Auto");
        Categorizer::from_builder(builder, options).unwrap()
    }

    #[test]
    fn duplicates_are_processed_once() {
        let result = categorizer(Options::default()).categorize(["coop 01/02/2024", "COOP", "coop 01/02/2024"]).unwrap();
        assert_eq!(result.metrics.inputs, 3);
        assert_eq!(result.metrics.states, 2);
        assert_eq!(result.metrics.finalized, 2);
    }

    #[test]
    fn assigns_resolved_categories() {
        let c = categorizer(Options::default());
        let mut items = transactions(&["Esselunga 03/03/2024 ", "carburante", "bollo"]);
        let result = c.categorize(items.iter().map(|t| t.description.as_str())).unwrap();

        assign_categories(&mut items, |t| t.description.as_str(), |t, c| t.category = Some(c), &result);

        let categories: Vec<Option<&str>> = items.iter().map(|t| t.category.as_deref()).collect();
        assert_eq!(categories, [Some("Spesa"), Some("Auto"), Some("bollo")]);
    }

    #[test]
    fn empty_description_passes_through() {
        let c = categorizer(Options::default());
        let result = c.categorize([""]).unwrap();
        assert_eq!(result.resolve_final(""), "");
        assert_eq!(result.state_for("").map(TextState::ever_changed), Some(false));
    }

    #[test]
    fn untouched_inputs_still_get_a_detail_node() {
        let c = Categorizer::new(RuleSetBuilder::new().build().unwrap());
        let result = c.categorize(["Bonifico da GOOGLE PAY", "pizza"]).unwrap();
        assert!(result.records.is_empty());

        let graph = result.graph.as_ref().unwrap();
        assert_eq!(graph.detail_count(), 2);
        let start = graph.start_node("bonifico da google pay").unwrap();
        assert_eq!(graph.outgoing(start).count(), 0);
        assert_eq!(result.resolve_final("Bonifico da GOOGLE PAY"), "Bonifico da GOOGLE PAY");
    }

    #[test]
    fn resolution_without_graph_uses_final_text() {
        let c = categorizer(Options { build_graph: false, parallel: false, ..Options::default() });
        let result = c.categorize(["esselunga 10/10/2023"]).unwrap();
        assert!(result.graph.is_none());
        assert_eq!(result.resolve_final("ESSELUNGA 10/10/2023"), "Spesa");
        assert_eq!(result.resolve_final("sconosciuto"), "sconosciuto");
        assert!(result.debug_trail("esselunga 10/10/2023").is_empty());
    }

    #[test]
    fn invalid_pattern_fails_before_processing() {
        let builder = RuleSetBuilder::new().add("ok", "fine").add("(broken", "x");
        let err = Categorizer::from_builder(builder, Options::default()).unwrap_err();
        assert_eq!(err.pattern, "(broken");
    }

    #[test]
    fn cancelled_run_reports_progress() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = categorizer(Options::default()).categorize_with_cancel(["a", "b"], &cancel).unwrap_err();
        match err {
            CategorizeError::Cancelled { processed, total } => {
                assert_eq!(processed, 0);
                assert_eq!(total, 2);
            }
        }
    }

    #[test]
    fn rule_stats_count_this_run_only() {
        let c = categorizer(Options { parallel: false, ..Options::default() });
        let first = c.categorize(["coop"]).unwrap();
        let second = c.categorize(["esselunga", "coop 12/12/2012"]).unwrap();

        let exit_rule = 2;
        assert_eq!(first.metrics.rules[exit_rule].rewrites, 1);
        assert_eq!(second.metrics.rules[exit_rule].rewrites, 2);
        assert_eq!(c.rules().rules()[exit_rule].match_count(), 3);
        // The exit rule stops both cascades before the last rule.
        assert_eq!(second.metrics.rules[3].applications, 0);
    }
}
