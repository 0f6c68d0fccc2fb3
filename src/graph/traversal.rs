//! Graph walks.
//!
//! A walk starts at the detail node of an original description and keeps
//! taking the first outgoing detail edge:
//!
//! ```text
//! start(original) ──first edge──▶ node ──first edge──▶ node ── ... ──▶ terminal
//!                                                 │
//!                  stop when: no outgoing edge ───┤
//!                             target already seen ┤
//!                             edge rule exits ────┘
//! ```
//!
//! The visited set and a step bound equal to the number of detail nodes keep
//! the walk finite even on a malformed graph.

use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use super::Graph;
use super::model::{DetailEdge, NodeId};
use crate::rule::RuleId;

/// Length `display_name` is cut to in debug trails.
const DISPLAY_NAME_LEN: usize = 60;

/// One traversed edge, for debugging a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugStep {
    pub step: usize,
    pub rule: RuleId,
    pub name: String,
    pub pattern: String,
    pub output: String,
    /// First category tag of the rule, if any.
    pub category: Option<String>,
}

/// Final description for `original`, or `original` itself when the graph
/// has never seen it.
pub fn resolve_final(graph: &Graph, original: &str) -> String {
    try_resolve_final(graph, original).unwrap_or_else(|| {
        debug!(original, "no start node, returning input unchanged");
        original.to_string()
    })
}

/// Like [`resolve_final`], but reports a miss as `None`.
pub fn try_resolve_final(graph: &Graph, original: &str) -> Option<String> {
    let start = graph.start_node(original)?;
    let terminal = walk(graph, start).last().map_or(start, |edge| edge.target);
    graph.detail(terminal).map(|node| node.state.current().to_string())
}

/// The edges a resolution of `original` follows. Empty on a miss.
pub fn debug_trail(graph: &Graph, original: &str) -> Vec<DebugStep> {
    let Some(start) = graph.start_node(original) else {
        return Vec::new();
    };
    walk(graph, start)
        .into_iter()
        .enumerate()
        .map(|(step, edge)| DebugStep {
            step,
            rule: edge.rule.id(),
            name: edge.rule.display_name(DISPLAY_NAME_LEN),
            pattern: edge.rule.pattern().to_string(),
            output: edge.output.clone(),
            category: edge.rule.category_tags().first().cloned(),
        })
        .collect()
}

fn walk(graph: &Graph, start: NodeId) -> Vec<&DetailEdge> {
    let mut path = Vec::new();
    let mut visited = HashSet::from([start]);
    let mut current = start;

    for _ in 0..graph.detail_count() {
        let Some(edge) = graph.outgoing(current).next() else {
            break;
        };
        if !visited.insert(edge.target) {
            debug!(node = current, target = edge.target, "cycle in detail edges, walk stopped");
            break;
        }
        path.push(edge);
        current = edge.target;
        if edge.rule.exit_on_match() {
            break;
        }
    }

    path
}
