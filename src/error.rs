//! Error types.
//!
//! Only [`RuleCompilationError`] and [`CategorizeError`] abort a run. Everything
//! else is recovered where it happens and surfaced as data: execution errors
//! ride on the step's `TransformationRecord`, graph warnings are collected by
//! the builder.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::graph::NodeId;
use crate::rule::RuleId;

/// A rule pattern that failed to compile. Raised while building a rule set,
/// before any input is processed.
#[derive(Debug, Error)]
#[error("rule '{label}' has an invalid pattern '{pattern}': {source}")]
pub struct RuleCompilationError {
    pub label: String,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// A single rule application that could not complete. The step is treated as
/// "no match" and the text state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum RuleExecutionError {
    /// Input longer than `Options::max_input_len`.
    #[error("rule {rule}: input of {len} bytes exceeds the {limit} byte limit")]
    InputTooLarge { rule: RuleId, len: usize, limit: usize },

    /// The match took longer than `Options::match_timeout`.
    #[error("rule {rule}: match took {elapsed:?}, limit is {limit:?}")]
    Timeout { rule: RuleId, elapsed: Duration, limit: Duration },
}

/// An edge the graph builder refused to add.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum GraphWarning {
    #[error("self-loop on node {node} (rule {rule:?}) skipped")]
    SelfLoop { node: NodeId, rule: Option<RuleId> },

    #[error("duplicate membership edge {detail} -> {aggregate} skipped")]
    DuplicateMembership { detail: NodeId, aggregate: NodeId },
}

/// Errors from the batch categorization entry points.
#[derive(Debug, Error)]
pub enum CategorizeError {
    /// The run's cancellation token fired between two text states.
    #[error("categorization cancelled after {processed} of {total} inputs")]
    Cancelled { processed: usize, total: usize },
}
