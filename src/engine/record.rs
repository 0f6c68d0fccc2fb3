//! Transformation records: the only channel between the cascade and the
//! graph builder.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RuleExecutionError;
use crate::rule::{Rule, RuleId, serialize_rule_id};
use crate::state::TextState;

/// One rule application against one text state.
///
/// Emitted for every rule the cascade visits, whether or not it changed
/// anything. `source` and `target` are snapshots taken before and after the
/// step; they share a `StateKey` when nothing was committed.
#[derive(Debug, Clone, Serialize)]
pub struct TransformationRecord {
    pub source: Arc<TextState>,
    pub target: Arc<TextState>,
    #[serde(serialize_with = "serialize_rule_id")]
    pub rule: Arc<Rule>,
    /// Pattern matched (against `current`, or against `original` on retry).
    pub matched: bool,
    pub input: String,
    pub output: String,
    /// `input` is the state's original text, not its current text.
    pub retried: bool,
    /// Earlier rules whose rewrite stops this rule from matching the original.
    pub interfering: Vec<RuleId>,
    pub elapsed: Duration,
    pub error: Option<RuleExecutionError>,
}

impl TransformationRecord {
    pub fn rule_id(&self) -> RuleId {
        self.rule.id()
    }

    /// The step committed a rewrite.
    pub fn committed(&self) -> bool {
        self.source.key() != self.target.key()
    }

    /// Matched and produced a different string from its input.
    pub fn rewrote(&self) -> bool {
        self.matched && self.output != self.input
    }
}

/// An interfering-rule finding, flattened for callers that only want the
/// diagnostics of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Interference {
    /// The rule that only matched on retry.
    pub rule: RuleId,
    /// The earlier rule whose output defeats it.
    pub interfering: RuleId,
    pub original: String,
}

impl Interference {
    pub fn from_record(record: &TransformationRecord) -> impl Iterator<Item = Interference> + '_ {
        record.interfering.iter().map(move |&interfering| Interference {
            rule: record.rule_id(),
            interfering,
            original: record.source.original().to_string(),
        })
    }
}
