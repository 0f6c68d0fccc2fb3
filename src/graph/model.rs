//! Node and edge types of the provenance graph.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::keys::TierKey;
use crate::rule::{Rule, RuleId, serialize_rule_id};
use crate::state::TextState;

/// Index into `Graph::nodes`. Assigned in creation order, never reused.
pub type NodeId = usize;

/// Index into `Graph::edges`.
pub type EdgeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Detail,
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Membership,
    Detail,
    Aggregate,
}

/// One snapshot of one text state.
#[derive(Debug, Clone, Serialize)]
pub struct DetailNode {
    pub id: NodeId,
    pub state: Arc<TextState>,
}

/// A tier: every snapshot that maps to the same [`TierKey`].
#[derive(Debug, Clone, Serialize)]
pub struct AggregateNode {
    pub id: NodeId,
    pub tier: TierKey,
    /// Detail nodes in this tier, in the order they joined.
    pub members: Vec<NodeId>,
    /// Frozen categories of members plus tags of the rules that produced them.
    pub categories: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphNode {
    Detail(DetailNode),
    Aggregate(AggregateNode),
}

impl GraphNode {
    pub fn id(&self) -> NodeId {
        match self {
            GraphNode::Detail(n) => n.id,
            GraphNode::Aggregate(n) => n.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            GraphNode::Detail(_) => NodeKind::Detail,
            GraphNode::Aggregate(_) => NodeKind::Aggregate,
        }
    }

    pub fn as_detail(&self) -> Option<&DetailNode> {
        match self {
            GraphNode::Detail(n) => Some(n),
            GraphNode::Aggregate(_) => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&AggregateNode> {
        match self {
            GraphNode::Aggregate(n) => Some(n),
            GraphNode::Detail(_) => None,
        }
    }
}

/// Detail node to the aggregate of its tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipEdge {
    pub detail: NodeId,
    pub aggregate: NodeId,
}

/// One committed rewrite between two snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct DetailEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(serialize_with = "serialize_rule_id")]
    pub rule: Arc<Rule>,
    pub input: String,
    pub output: String,
    pub retried: bool,
}

/// All rewrites by one rule from one tier to another.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(serialize_with = "serialize_rule_id")]
    pub rule: Arc<Rule>,
    pub count: usize,
    /// Detail edges folded into this one.
    pub details: Vec<EdgeId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphEdge {
    Membership(MembershipEdge),
    Detail(DetailEdge),
    Aggregate(AggregateEdge),
}

impl GraphEdge {
    pub fn kind(&self) -> EdgeKind {
        match self {
            GraphEdge::Membership(_) => EdgeKind::Membership,
            GraphEdge::Detail(_) => EdgeKind::Detail,
            GraphEdge::Aggregate(_) => EdgeKind::Aggregate,
        }
    }

    pub fn endpoints(&self) -> (NodeId, NodeId) {
        match self {
            GraphEdge::Membership(e) => (e.detail, e.aggregate),
            GraphEdge::Detail(e) => (e.source, e.target),
            GraphEdge::Aggregate(e) => (e.source, e.target),
        }
    }

    /// Rule behind a transformation edge. Membership edges have none.
    pub fn rule_id(&self) -> Option<RuleId> {
        match self {
            GraphEdge::Membership(_) => None,
            GraphEdge::Detail(e) => Some(e.rule.id()),
            GraphEdge::Aggregate(e) => Some(e.rule.id()),
        }
    }

    pub fn as_detail(&self) -> Option<&DetailEdge> {
        match self {
            GraphEdge::Detail(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&AggregateEdge> {
        match self {
            GraphEdge::Aggregate(e) => Some(e),
            _ => None,
        }
    }
}

/// Edges the builder refused, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkippedEdges {
    pub self_loops: usize,
    pub duplicate_memberships: usize,
}
