//! Provenance graph.
//!
//! The cascade only emits records; this module turns them into a graph that
//! answers "how did this description become that one":
//!
//! ```text
//!                 ┌───────────── aggregate "FOOD" ◀───────────┐
//!                 │ membership                     membership │
//!  "pizza margherita"@0 ──rule 3──▶ "FOOD"@1   "pizza diavola"@0 ──rule 3──▶ "FOOD"@1
//!       (detail)                    (detail)        (detail)                 (detail)
//! ```
//!
//! - Detail nodes are snapshots of a single text state (one per `StateKey`).
//! - Aggregate nodes group snapshots into tiers (see [`TierMode`]).
//! - Detail edges record single rewrites; aggregate edges count the rewrites
//!   one rule performs from one tier to another.
//!
//! Construction is in `builder.rs` and walks are in `traversal.rs`. A
//! [`Graph`] is immutable once built and indexes what traversal needs
//! (outgoing detail edges per node, start node per lowercased original).

#[path = "graph/builder.rs"]
mod builder;
#[path = "graph/keys.rs"]
mod keys;
#[path = "graph/model.rs"]
mod model;
#[path = "graph/traversal.rs"]
mod traversal;

use serde::Serialize;
use std::collections::HashMap;

pub use builder::GraphBuilder;
pub use keys::{TierKey, TierMode};
pub use model::{
    AggregateEdge, AggregateNode, DetailEdge, DetailNode, EdgeId, EdgeKind, GraphEdge, GraphNode, MembershipEdge,
    NodeId, NodeKind, SkippedEdges,
};
pub use traversal::{DebugStep, debug_trail, resolve_final, try_resolve_final};

#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    mode: TierMode,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    skipped: SkippedEdges,
    /// Detail edges leaving each node, in discovery order.
    #[serde(skip)]
    outgoing: Vec<Vec<EdgeId>>,
    /// Lowercased original text to the detail node a walk starts from.
    #[serde(skip)]
    starts: HashMap<String, NodeId>,
}

impl Graph {
    pub(crate) fn new(mode: TierMode, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>, skipped: SkippedEdges) -> Self {
        let mut outgoing = vec![Vec::new(); nodes.len()];
        for (idx, edge) in edges.iter().enumerate() {
            if let GraphEdge::Detail(e) = edge {
                outgoing[e.source].push(idx);
            }
        }

        // Lowest revision first, then lowest id.
        let mut ranked: HashMap<String, (u32, NodeId)> = HashMap::new();
        for node in nodes.iter().filter_map(GraphNode::as_detail) {
            let rank = (node.state.revision(), node.id);
            ranked
                .entry(node.state.original().to_lowercase())
                .and_modify(|best| *best = (*best).min(rank))
                .or_insert(rank);
        }
        let starts = ranked.into_iter().map(|(text, (_, id))| (text, id)).collect();

        Graph { mode, nodes, edges, skipped, outgoing, starts }
    }

    pub fn mode(&self) -> TierMode {
        self.mode
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn detail(&self, id: NodeId) -> Option<&DetailNode> {
        self.node(id).and_then(GraphNode::as_detail)
    }

    pub fn detail_nodes(&self) -> impl Iterator<Item = &DetailNode> {
        self.nodes.iter().filter_map(GraphNode::as_detail)
    }

    pub fn aggregate_nodes(&self) -> impl Iterator<Item = &AggregateNode> {
        self.nodes.iter().filter_map(GraphNode::as_aggregate)
    }

    pub fn detail_edges(&self) -> impl Iterator<Item = &DetailEdge> {
        self.edges.iter().filter_map(GraphEdge::as_detail)
    }

    pub fn aggregate_edges(&self) -> impl Iterator<Item = &AggregateEdge> {
        self.edges.iter().filter_map(GraphEdge::as_aggregate)
    }

    /// Detail edges leaving `node`, in the order they were added.
    pub fn outgoing(&self, node: NodeId) -> impl Iterator<Item = &DetailEdge> {
        self.outgoing
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|&idx| self.edges.get(idx).and_then(GraphEdge::as_detail))
    }

    /// Aggregate node of the tier `detail` belongs to.
    pub fn tier_of(&self, detail: NodeId) -> Option<&AggregateNode> {
        self.edges.iter().find_map(|edge| match edge {
            GraphEdge::Membership(m) if m.detail == detail => self.node(m.aggregate).and_then(GraphNode::as_aggregate),
            _ => None,
        })
    }

    /// Detail node a walk for `original` starts from (case-insensitive).
    pub fn start_node(&self, original: &str) -> Option<NodeId> {
        self.starts.get(&original.to_lowercase()).copied()
    }

    pub fn skipped(&self) -> SkippedEdges {
        self.skipped
    }

    pub fn detail_count(&self) -> usize {
        self.detail_nodes().count()
    }

    /// See [`resolve_final`].
    pub fn resolve_final(&self, original: &str) -> String {
        resolve_final(self, original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CascadeEngine, TransformationRecord};
    use crate::rule::RuleOptions;
    use crate::rule_set::{RuleSet, RuleSetBuilder};
    use crate::state::TextState;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn food_rules() -> RuleSet {
        RuleSetBuilder::new()
            .add(r"\d+", "")
            .add_described(r"pizza \w+", "FOOD", "food", &["ristorazione"], RuleOptions::default())
            .build()
            .unwrap()
    }

    fn records(rules: &RuleSet, inputs: &[&str]) -> Vec<TransformationRecord> {
        let engine = CascadeEngine::new(rules);
        let mut states = TextState::batch(inputs);
        states.iter_mut().flat_map(|s| engine.run(s)).collect()
    }

    #[test]
    fn converging_inputs_share_a_text_tier() {
        let rules = food_rules();
        let recs = records(&rules, &["pizza margherita", "pizza diavola"]);
        let graph = GraphBuilder::build(TierMode::Text, &recs);

        let food: Vec<&AggregateNode> =
            graph.aggregate_nodes().filter(|a| a.tier == TierKey::Text("FOOD".into())).collect();
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].members.len(), 2);
        assert!(food[0].categories.contains("ristorazione"));

        let edge = graph.aggregate_edges().next().unwrap();
        assert_eq!(edge.count, 1);
        assert_eq!(graph.aggregate_edges().count(), 2);
    }

    #[test]
    fn no_self_loops_and_noops_are_counted() {
        let rules = food_rules();
        let recs = records(&rules, &["pizza margherita", "Bonifico da GOOGLE PAY"]);
        let graph = GraphBuilder::build(TierMode::Text, &recs);

        for edge in graph.edges() {
            if edge.kind() != EdgeKind::Membership {
                let (a, b) = edge.endpoints();
                assert_ne!(a, b, "{edge:?}");
            }
        }
        // Rule 0 leaves both inputs alone, rule 1 leaves the transfer alone.
        assert_eq!(graph.skipped().self_loops, 3);
        assert_eq!(graph.detail_edges().count(), 1);
    }

    #[test]
    fn seeded_states_without_records_get_a_detail_node() {
        let rules = RuleSetBuilder::new().build().unwrap();
        let mut states = TextState::batch(["Bonifico da GOOGLE PAY", "pizza margherita"]);
        let seeds: Vec<Arc<TextState>> = states.iter().map(TextState::snapshot).collect();
        let engine = CascadeEngine::new(&rules);
        let recs: Vec<TransformationRecord> = states.iter_mut().flat_map(|s| engine.run(s)).collect();
        assert!(recs.is_empty());

        let graph = GraphBuilder::build_seeded(TierMode::Text, &seeds, &recs);
        assert_eq!(graph.detail_count(), 2);
        let start = graph.start_node("bonifico da google pay").unwrap();
        assert_eq!(graph.outgoing(start).count(), 0);
        assert!(graph.tier_of(start).is_some());
        assert_eq!(graph.resolve_final("Bonifico da GOOGLE PAY"), "Bonifico da GOOGLE PAY");
    }

    #[test]
    fn depth_mode_groups_by_revision() {
        let rules = food_rules();
        let recs = records(&rules, &["pizza margherita 12", "pizza diavola", "spesa"]);
        let graph = GraphBuilder::build(TierMode::Depth, &recs);

        let tiers: Vec<&TierKey> = graph.aggregate_nodes().map(|a| &a.tier).collect();
        assert_eq!(tiers, [&TierKey::Depth(0), &TierKey::Depth(1), &TierKey::Depth(2)]);

        let depth0 = graph.aggregate_nodes().next().unwrap();
        assert_eq!(depth0.members.len(), 3);

        // Pre-population places every snapshot before the first edge.
        let first_edge = graph.edges().iter().position(|e| e.kind() != EdgeKind::Membership).unwrap();
        assert!(graph.edges()[..first_edge].iter().all(|e| e.kind() == EdgeKind::Membership));
        assert_eq!(first_edge, graph.detail_count());
    }

    #[test]
    fn concurrent_ingest_matches_sequential() {
        let rules = food_rules();
        let inputs: Vec<String> = (0..50).map(|i| format!("pizza n{} {}", i % 7, i)).collect();
        let recs = records(&rules, &inputs.iter().map(String::as_str).collect::<Vec<_>>());

        let sequential = GraphBuilder::build(TierMode::Text, &recs);

        let builder = Arc::new(GraphBuilder::new(TierMode::Text));
        std::thread::scope(|scope| {
            for chunk in recs.chunks(9) {
                let builder = Arc::clone(&builder);
                scope.spawn(move || chunk.iter().for_each(|r| builder.ingest(r)));
            }
        });
        let parallel = Arc::into_inner(builder).unwrap().finish();

        let texts = |g: &Graph| -> HashSet<(String, u32, usize)> {
            g.detail_nodes().map(|n| (n.state.current().to_string(), n.state.revision(), n.state.id().0)).collect()
        };
        assert_eq!(texts(&sequential), texts(&parallel));
        assert_eq!(sequential.edges().len(), parallel.edges().len());
        assert_eq!(sequential.skipped(), parallel.skipped());
    }

    #[test]
    fn serializes_with_kind_tags() {
        let rules = food_rules();
        let recs = records(&rules, &["pizza margherita"]);
        let graph = GraphBuilder::build(TierMode::Text, &recs);
        let json = serde_json::to_value(&graph).unwrap();

        let kinds: HashSet<&str> = json["edges"].as_array().unwrap().iter().filter_map(|e| e["kind"].as_str()).collect();
        assert_eq!(kinds, HashSet::from(["membership", "detail", "aggregate"]));
        assert_eq!(json["nodes"][0]["kind"], "detail");
    }
}
