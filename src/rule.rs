//! Pattern/replacement rules.
//!
//! A [`Rule`] is compiled once (see [`RuleDef::compile`]) and then shared,
//! read-only, by every cascade in a run. The only mutable part is the pair of
//! usage counters, which are atomics so concurrent cascades can bump them
//! without coordination.

use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{RuleCompilationError, RuleExecutionError};

/// Rule identifier (index into the owning `RuleSet`).
pub type RuleId = usize;

/// Compiled-program cap used when no explicit limit is configured.
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);

bitflags::bitflags! {
    /// Behavioral flags of a rule.
    ///
    /// `CONTINUE_ON_MATCH` is the plain default and carries no behavior of its
    /// own; it only matters when merging options (see
    /// `RuleSetBuilder::with_options`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
    pub struct RuleOptions: u8 {
        const CONTINUE_ON_MATCH = 1 << 0;
        const EXIT_ON_MATCH     = 1 << 1;
        const IGNORE_RETRY      = 1 << 2;
    }
}

impl Default for RuleOptions {
    fn default() -> Self {
        RuleOptions::CONTINUE_ON_MATCH
    }
}

/// Uncompiled rule definition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleDef {
    pub pattern: String,
    pub replacement: String,
    pub label: String,
    pub category_tags: Vec<String>,
    pub options: RuleOptions,
}

impl RuleDef {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>, options: RuleOptions) -> Self {
        RuleDef { pattern: pattern.into(), replacement: replacement.into(), options, ..Default::default() }
    }

    /// Append `tag` unless already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.category_tags.iter().any(|t| t == tag) {
            self.category_tags.push(tag.to_string());
        }
    }

    /// Compile the pattern (case-insensitive) and produce a shareable rule.
    pub fn compile(self, id: RuleId, size_limit: usize) -> Result<Rule, RuleCompilationError> {
        let regex = RegexBuilder::new(&self.pattern).case_insensitive(true).size_limit(size_limit).build().map_err(
            |source| RuleCompilationError { label: self.label.clone(), pattern: self.pattern.clone(), source },
        )?;

        let mut category_tags: Vec<String> = Vec::with_capacity(self.category_tags.len());
        for tag in self.category_tags {
            if !category_tags.contains(&tag) {
                category_tags.push(tag);
            }
        }

        Ok(Rule {
            id,
            regex,
            replacement: self.replacement,
            label: self.label,
            category_tags,
            options: self.options,
            counters: RuleCounters::default(),
        })
    }
}

/// Limits applied to every rule application.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecLimits {
    pub max_input_len: Option<usize>,
    pub match_timeout: Option<Duration>,
}

/// Outcome of running a rule's pattern against one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub matched: bool,
    pub output: String,
    pub elapsed: Duration,
}

impl Rewrite {
    /// Matched and produced a different string.
    pub fn changes(&self, input: &str) -> bool {
        self.matched && self.output != input
    }
}

#[derive(Debug, Default)]
struct RuleCounters {
    matches: AtomicU64,
    elapsed_nanos: AtomicU64,
}

/// A compiled pattern/replacement rule.
pub struct Rule {
    id: RuleId,
    regex: Regex,
    replacement: String,
    label: String,
    category_tags: Vec<String>,
    options: RuleOptions,
    counters: RuleCounters,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("pattern", &self.regex.as_str())
            .field("replacement", &self.replacement)
            .field("label", &self.label)
            .field("options", &self.options)
            .finish()
    }
}

impl Rule {
    /// Compile a standalone rule with id 0 and the default size limit.
    pub fn new(
        pattern: impl Into<String>,
        replacement: impl Into<String>,
        options: RuleOptions,
    ) -> Result<Self, RuleCompilationError> {
        RuleDef::new(pattern, replacement, options).compile(0, DEFAULT_REGEX_SIZE_LIMIT)
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn category_tags(&self) -> &[String] {
        &self.category_tags
    }

    pub fn options(&self) -> RuleOptions {
        self.options
    }

    pub fn exit_on_match(&self) -> bool {
        self.options.contains(RuleOptions::EXIT_ON_MATCH)
    }

    pub fn retry_from_original(&self) -> bool {
        !self.options.contains(RuleOptions::IGNORE_RETRY)
    }

    pub fn match_count(&self) -> u64 {
        self.counters.matches.load(Ordering::Relaxed)
    }

    /// Time spent in every application of this rule, misses included.
    pub fn total_elapsed(&self) -> Duration {
        Duration::from_nanos(self.counters.elapsed_nanos.load(Ordering::Relaxed))
    }

    /// Label if set, otherwise the pattern, cut to `max_len` chars with a
    /// trailing ellipsis.
    pub fn display_name(&self, max_len: usize) -> String {
        if max_len == 0 {
            return String::new();
        }
        let source = if self.label.trim().is_empty() { self.pattern() } else { self.label.as_str() };
        if source.chars().count() <= max_len {
            return source.to_string();
        }
        let mut out: String = source.chars().take(max_len - 1).collect();
        out.push('\u{2026}');
        out
    }

    /// Run the pattern against `input` without touching any counter.
    pub fn simulate(&self, input: &str, limits: &ExecLimits) -> Result<Rewrite, RuleExecutionError> {
        if let Some(limit) = limits.max_input_len {
            if input.len() > limit {
                return Err(RuleExecutionError::InputTooLarge { rule: self.id, len: input.len(), limit });
            }
        }

        let start = Instant::now();
        let matched = self.regex.is_match(input);
        let output =
            if matched { self.regex.replace_all(input, self.replacement.as_str()).into_owned() } else { input.to_string() };
        let elapsed = start.elapsed();

        if let Some(limit) = limits.match_timeout {
            if elapsed > limit {
                return Err(RuleExecutionError::Timeout { rule: self.id, elapsed, limit });
            }
        }

        Ok(Rewrite { matched, output, elapsed })
    }

    /// Count a committed rewrite.
    pub(crate) fn record_match(&self, elapsed: Duration) {
        self.counters.matches.fetch_add(1, Ordering::Relaxed);
        self.record_elapsed(elapsed);
    }

    /// Account time for an application that did not rewrite anything.
    pub(crate) fn record_elapsed(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.counters.elapsed_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Rule", 7)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("pattern", self.pattern())?;
        s.serialize_field("replacement", &self.replacement)?;
        s.serialize_field("label", &self.label)?;
        s.serialize_field("category_tags", &self.category_tags)?;
        s.serialize_field("options", &self.options)?;
        s.serialize_field("match_count", &self.match_count())?;
        s.end()
    }
}

/// Serialize a shared rule as its id. Used by graph and record types so an
/// exported graph does not repeat full rule bodies on every edge.
pub(crate) fn serialize_rule_id<S: Serializer>(rule: &Arc<Rule>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(rule.id as u64)
}
