//! Rule sets and the fluent builder that assembles them.
//!
//! A run is split into two phases:
//!
//! 1. **Build** (this module): collect [`RuleDef`]s, tag them, merge their
//!    options, then compile every pattern eagerly. A single bad pattern fails
//!    the whole build, so no cascade ever sees an uncompiled rule.
//! 2. **Run** (see `engine/cascade.rs`): apply the compiled, ordered rules to
//!    each text state.
//!
//! ## Invariants
//!
//! - `RuleId` is the index of the rule in `RuleSet::rules`. Ids are assigned at
//!   build time and never change.
//! - Rule order in the set is cascade order.

use std::sync::Arc;
use tracing::warn;

use crate::error::RuleCompilationError;
use crate::rule::{DEFAULT_REGEX_SIZE_LIMIT, Rule, RuleDef, RuleId, RuleOptions};

/// An ordered, compiled list of rules shared by every cascade of a run.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    /// Compile `defs` in order. Fails on the first invalid pattern.
    pub fn compile(defs: Vec<RuleDef>, size_limit: usize) -> Result<Self, RuleCompilationError> {
        let rules = defs
            .into_iter()
            .enumerate()
            .map(|(id, def)| def.compile(id, size_limit).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RuleSet { rules })
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn get(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.rules.get(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Ids of rules carrying `tag`, in cascade order.
    pub fn tagged(&self, tag: &str) -> Vec<RuleId> {
        self.rules.iter().filter(|r| r.category_tags().iter().any(|t| t == tag)).map(|r| r.id()).collect()
    }
}

/// Fluent collector of rule definitions.
///
/// ```
/// use recascade::{RuleOptions, RuleSetBuilder};
///
/// let rules = RuleSetBuilder::new()
///     .add(r"pizza|pasta", "FOOD")
///     .add(r"\bpam\b", "SPESA")
///     .categorize("Mangiare")
///     .exit_on_match()
///     .build()
///     .unwrap();
/// assert_eq!(rules.len(), 2);
/// assert!(rules.rules().iter().all(|r| r.exit_on_match()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleSetBuilder {
    defs: Vec<RuleDef>,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule with default options.
    pub fn add(self, pattern: &str, replacement: &str) -> Self {
        self.add_with(pattern, replacement, RuleOptions::default())
    }

    pub fn add_with(mut self, pattern: &str, replacement: &str, options: RuleOptions) -> Self {
        self.defs.push(RuleDef::new(pattern, replacement, options));
        self
    }

    /// Add a rule with a label and category tags.
    pub fn add_described(
        mut self,
        pattern: &str,
        replacement: &str,
        label: &str,
        tags: &[&str],
        options: RuleOptions,
    ) -> Self {
        let mut def = RuleDef::new(pattern, replacement, options);
        def.label = label.to_string();
        for tag in tags {
            def.add_tag(tag);
        }
        self.defs.push(def);
        self
    }

    pub fn add_def(mut self, def: RuleDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Tag every rule added so far with `category`.
    pub fn categorize(mut self, category: &str) -> Self {
        for def in &mut self.defs {
            def.add_tag(category);
        }
        self
    }

    /// Merge `options` into every rule added so far.
    ///
    /// `EXIT_ON_MATCH` always wins over `CONTINUE_ON_MATCH`. Asking to continue
    /// on a rule that already exits is a conflict: the exit is kept and a
    /// warning is logged.
    pub fn with_options(mut self, options: RuleOptions) -> Self {
        for def in &mut self.defs {
            let (merged, conflict) = merge_options(def.options, options);
            if conflict {
                warn!(
                    pattern = %def.pattern,
                    old = ?def.options,
                    requested = ?options,
                    merged = ?merged,
                    "conflicting rule options merged"
                );
            }
            def.options = merged;
        }
        self
    }

    pub fn ignore_retry(self) -> Self {
        self.with_options(RuleOptions::IGNORE_RETRY)
    }

    pub fn exit_on_match(self) -> Self {
        self.with_options(RuleOptions::EXIT_ON_MATCH)
    }

    /// Append every rule of `other`, keeping its order.
    pub fn extend(mut self, other: RuleSetBuilder) -> Self {
        self.defs.extend(other.defs);
        self
    }

    /// Concatenate several builders into one, in argument order.
    pub fn combine(builders: impl IntoIterator<Item = RuleSetBuilder>) -> Self {
        builders.into_iter().fold(RuleSetBuilder::new(), RuleSetBuilder::extend)
    }

    pub fn defs(&self) -> &[RuleDef] {
        &self.defs
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn build(self) -> Result<RuleSet, RuleCompilationError> {
        self.build_with_limit(DEFAULT_REGEX_SIZE_LIMIT)
    }

    pub fn build_with_limit(self, size_limit: usize) -> Result<RuleSet, RuleCompilationError> {
        RuleSet::compile(self.defs, size_limit)
    }
}

/// Returns the merged options and whether the request conflicted.
fn merge_options(old: RuleOptions, new: RuleOptions) -> (RuleOptions, bool) {
    let mut merged = old | new;
    let conflict =
        old.contains(RuleOptions::EXIT_ON_MATCH) && new.contains(RuleOptions::CONTINUE_ON_MATCH);
    if merged.contains(RuleOptions::EXIT_ON_MATCH) {
        merged.remove(RuleOptions::CONTINUE_ON_MATCH);
    }
    (merged, conflict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_insertion_order() {
        let set = RuleSetBuilder::new().add("a", "1").add("b", "2").add("c", "3").build().unwrap();
        let ids: Vec<RuleId> = set.rules().iter().map(|r| r.id()).collect();
        assert_eq!(ids, [0, 1, 2]);
        assert_eq!(set.get(1).unwrap().pattern(), "b");
    }

    #[test]
    fn one_bad_pattern_fails_the_build() {
        let err = RuleSetBuilder::new().add("ok", "x").add_described("[z-a]", "", "bad", &[], RuleOptions::default());
        let err = err.build().unwrap_err();
        assert_eq!(err.label, "bad");
    }

    #[test]
    fn categorize_applies_to_existing_rules_only() {
        let set = RuleSetBuilder::new()
            .add("pizza", "FOOD")
            .categorize("Mangiare")
            .categorize("Mangiare")
            .add("esso", "Auto")
            .build()
            .unwrap();
        assert_eq!(set.get(0).unwrap().category_tags(), ["Mangiare"]);
        assert!(set.get(1).unwrap().category_tags().is_empty());
        assert_eq!(set.tagged("Mangiare"), [0]);
    }

    #[test]
    fn exit_beats_continue() {
        let (merged, conflict) = merge_options(RuleOptions::CONTINUE_ON_MATCH, RuleOptions::EXIT_ON_MATCH);
        assert_eq!(merged, RuleOptions::EXIT_ON_MATCH);
        assert!(!conflict);

        let (merged, conflict) = merge_options(RuleOptions::EXIT_ON_MATCH, RuleOptions::CONTINUE_ON_MATCH);
        assert_eq!(merged, RuleOptions::EXIT_ON_MATCH);
        assert!(conflict);
    }

    #[test]
    fn ignore_retry_merges_without_conflict() {
        let set = RuleSetBuilder::new().add("a", "b").exit_on_match().ignore_retry().build().unwrap();
        let rule = set.get(0).unwrap();
        assert!(rule.exit_on_match());
        assert!(!rule.retry_from_original());
    }

    #[test]
    fn combine_keeps_builder_order() {
        let cleaning = RuleSetBuilder::new().add(r"\s+", " ");
        let food = RuleSetBuilder::new().add("pizza", "FOOD").exit_on_match();
        let combined = RuleSetBuilder::combine([cleaning, food]);
        assert_eq!(combined.len(), 2);
        let set = combined.build().unwrap();
        assert!(!set.get(0).unwrap().exit_on_match());
        assert!(set.get(1).unwrap().exit_on_match());
    }
}
