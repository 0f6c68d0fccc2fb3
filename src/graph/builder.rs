//! Record stream to provenance graph.
//!
//! ```text
//! TransformationRecord ──▶ detail(source) ──membership──▶ aggregate(tier of source)
//!                      ──▶ detail(target) ──membership──▶ aggregate(tier of target)
//!                      ──▶ DetailEdge     source ─▶ target       (skipped if equal)
//!                      ──▶ AggregateEdge  tier   ─▶ tier, folded (skipped if equal)
//! ```
//!
//! Every lookup and id assignment happens inside one critical section, so
//! `ingest` can be called from any number of threads. The resulting node and
//! edge sets do not depend on arrival order; only the numeric ids do. Callers
//! that need stable ids feed records in a fixed order (the batch API does).

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use super::Graph;
use super::keys::{AggregateEdgeKey, TierKey, TierMode};
use super::model::{
    AggregateEdge, AggregateNode, DetailEdge, DetailNode, EdgeId, GraphEdge, GraphNode, MembershipEdge, NodeId,
    SkippedEdges,
};
use crate::engine::TransformationRecord;
use crate::error::GraphWarning;
use crate::rule::Rule;
use crate::state::{StateKey, TextState};

/// Thread-safe, incremental graph builder.
#[derive(Debug)]
pub struct GraphBuilder {
    mode: TierMode,
    inner: Mutex<BuilderState>,
}

#[derive(Debug, Default)]
struct BuilderState {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    details: HashMap<StateKey, NodeId>,
    tiers: HashMap<TierKey, NodeId>,
    memberships: HashSet<(NodeId, NodeId)>,
    aggregate_edges: HashMap<AggregateEdgeKey, EdgeId>,
    skipped: SkippedEdges,
}

impl GraphBuilder {
    pub fn new(mode: TierMode) -> Self {
        GraphBuilder { mode, inner: Mutex::new(BuilderState::default()) }
    }

    pub fn mode(&self) -> TierMode {
        self.mode
    }

    /// Build a graph from a finished record list.
    ///
    /// In `Depth` mode every snapshot is placed in its tier before any edge is
    /// folded, which lays ids out tier by tier as the layered view expects.
    pub fn build<'r>(mode: TierMode, records: impl IntoIterator<Item = &'r TransformationRecord> + Clone) -> Graph {
        GraphBuilder::build_seeded(mode, &[], records)
    }

    /// Like [`build`](Self::build), with `seeds` placed first so that every
    /// state gets a detail node, including those no record mentions.
    pub fn build_seeded<'r>(
        mode: TierMode,
        seeds: &[Arc<TextState>],
        records: impl IntoIterator<Item = &'r TransformationRecord> + Clone,
    ) -> Graph {
        let builder = GraphBuilder::new(mode);
        builder.seed(seeds);
        if mode == TierMode::Depth {
            builder.prepopulate(records.clone());
        }
        for rec in records {
            builder.ingest(rec);
        }
        builder.finish()
    }

    /// Create detail nodes (and their tiers) for every snapshot in `records`,
    /// ordered by depth, without adding any transformation edge.
    pub fn prepopulate<'r>(&self, records: impl IntoIterator<Item = &'r TransformationRecord>) {
        let mut snapshots: Vec<&Arc<TextState>> = records.into_iter().flat_map(|r| [&r.source, &r.target]).collect();
        snapshots.sort_by_key(|s| (s.revision(), s.id()));
        snapshots.dedup_by_key(|s| s.key());

        let mut state = self.inner.lock();
        for snap in snapshots {
            state.detail(self.mode, snap, None);
        }
    }

    /// Create a detail node (and its tier) for each snapshot, with no edges.
    pub fn seed<'s>(&self, snapshots: impl IntoIterator<Item = &'s Arc<TextState>>) {
        let mut state = self.inner.lock();
        for snap in snapshots {
            state.detail(self.mode, snap, None);
        }
    }

    /// Fold one record into the graph.
    pub fn ingest(&self, record: &TransformationRecord) {
        let mut state = self.inner.lock();
        let (source, from) = state.detail(self.mode, &record.source, None);
        let (target, to) = state.detail(self.mode, &record.target, Some(&record.rule));

        if source == target {
            state.skip(GraphWarning::SelfLoop { node: source, rule: Some(record.rule_id()) });
            return;
        }

        let detail_edge = state.edges.len();
        state.edges.push(GraphEdge::Detail(DetailEdge {
            source,
            target,
            rule: Arc::clone(&record.rule),
            input: record.input.clone(),
            output: record.output.clone(),
            retried: record.retried,
        }));

        if from == to {
            state.skip(GraphWarning::SelfLoop { node: from, rule: Some(record.rule_id()) });
            return;
        }
        state.fold_aggregate_edge(from, to, &record.rule, detail_edge);
    }

    pub fn skipped(&self) -> SkippedEdges {
        self.inner.lock().skipped
    }

    /// Freeze the builder into a queryable graph.
    pub fn finish(self) -> Graph {
        let state = self.inner.into_inner();
        debug!(
            nodes = state.nodes.len(),
            edges = state.edges.len(),
            self_loops = state.skipped.self_loops,
            duplicate_memberships = state.skipped.duplicate_memberships,
            "graph built"
        );
        Graph::new(self.mode, state.nodes, state.edges, state.skipped)
    }
}

impl BuilderState {
    /// Detail node for `snap` and the aggregate of its tier, both created on
    /// first sight.
    ///
    /// `produced_by` is the rule whose step ended in `snap`; its tags are
    /// added to the tier's categories when the step actually moved the state.
    fn detail(
        &mut self,
        mode: TierMode,
        snap: &Arc<TextState>,
        produced_by: Option<&Arc<Rule>>,
    ) -> (NodeId, NodeId) {
        let id = match self.details.get(&snap.key()) {
            Some(&id) => id,
            None => {
                let id = self.nodes.len();
                self.nodes.push(GraphNode::Detail(DetailNode { id, state: Arc::clone(snap) }));
                self.details.insert(snap.key(), id);
                trace!(node = id, state = %snap, "detail node");
                id
            }
        };

        let tier = self.aggregate(TierKey::of(mode, snap));
        self.link(id, tier);

        if let Some(GraphNode::Aggregate(agg)) = self.nodes.get_mut(tier) {
            if let Some(category) = snap.category() {
                agg.categories.insert(category.to_string());
            }
            if let Some(rule) = produced_by {
                if snap.changed_this_step() {
                    agg.categories.extend(rule.category_tags().iter().cloned());
                }
            }
        }

        (id, tier)
    }

    fn aggregate(&mut self, tier: TierKey) -> NodeId {
        if let Some(&id) = self.tiers.get(&tier) {
            return id;
        }
        let id = self.nodes.len();
        trace!(node = id, tier = ?tier, "aggregate node");
        self.nodes.push(GraphNode::Aggregate(AggregateNode {
            id,
            tier: tier.clone(),
            members: Vec::new(),
            categories: Default::default(),
        }));
        self.tiers.insert(tier, id);
        id
    }

    /// Membership edge `detail -> aggregate`, at most once per pair.
    fn link(&mut self, detail: NodeId, aggregate: NodeId) {
        if !self.memberships.insert((detail, aggregate)) {
            self.skip(GraphWarning::DuplicateMembership { detail, aggregate });
            return;
        }
        self.edges.push(GraphEdge::Membership(MembershipEdge { detail, aggregate }));
        if let Some(GraphNode::Aggregate(agg)) = self.nodes.get_mut(aggregate) {
            agg.members.push(detail);
        }
    }

    fn fold_aggregate_edge(&mut self, source: NodeId, target: NodeId, rule: &Arc<Rule>, detail_edge: EdgeId) {
        let key = AggregateEdgeKey { source, target, rule: rule.id() };
        if let Some(&idx) = self.aggregate_edges.get(&key) {
            if let Some(GraphEdge::Aggregate(edge)) = self.edges.get_mut(idx) {
                edge.count += 1;
                edge.details.push(detail_edge);
            }
            return;
        }
        let idx = self.edges.len();
        self.edges.push(GraphEdge::Aggregate(AggregateEdge {
            source,
            target,
            rule: Arc::clone(rule),
            count: 1,
            details: vec![detail_edge],
        }));
        self.aggregate_edges.insert(key, idx);
    }

    fn skip(&mut self, warning: GraphWarning) {
        match warning {
            GraphWarning::SelfLoop { .. } => self.skipped.self_loops += 1,
            GraphWarning::DuplicateMembership { .. } => self.skipped.duplicate_memberships += 1,
        }
        debug!(%warning, "edge skipped");
    }
}
