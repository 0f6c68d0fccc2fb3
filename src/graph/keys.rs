//! Deduplication keys for graph construction.
//!
//! The builder folds a stream of records into nodes and edges. Without stable
//! keys the same snapshot or the same tier transition would be added once per
//! record that mentions it. Three keys cover every lookup:
//!
//! - `StateKey` (from `state.rs`) identifies a detail node.
//! - [`TierKey`] identifies an aggregate node.
//! - [`AggregateEdgeKey`] identifies an aggregate edge.
//!
//! ## What counts as "the same tier"
//!
//! Depends on [`TierMode`]:
//!
//! - `Text`: snapshots with the same `current` text share a tier, whatever
//!   state or depth they came from. Two inputs that converge on the same
//!   intermediate string meet in one aggregate.
//! - `Depth`: snapshots with the same revision share a tier. This is the older
//!   layered view: tier `n` holds every state after `n` rewrites.

use serde::Serialize;

use super::model::NodeId;
use crate::rule::RuleId;
use crate::state::TextState;

/// How snapshots are grouped into aggregate nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum TierMode {
    /// One aggregate per distinct `current` text.
    #[default]
    Text,
    /// One aggregate per cascade depth across the whole batch.
    Depth,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TierKey {
    Text(String),
    Depth(u32),
}

impl TierKey {
    pub(crate) fn of(mode: TierMode, state: &TextState) -> Self {
        match mode {
            TierMode::Text => TierKey::Text(state.current().to_string()),
            TierMode::Depth => TierKey::Depth(state.revision()),
        }
    }
}

/// `(source aggregate, target aggregate, rule)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AggregateEdgeKey {
    pub(crate) source: NodeId,
    pub(crate) target: NodeId,
    pub(crate) rule: RuleId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateId;

    #[test]
    fn text_tier_ignores_origin() {
        let mut a = TextState::new(StateId(0), "pizza margherita");
        let mut b = TextState::new(StateId(1), "pizza diavola");
        a.commit("FOOD".into());
        b.commit("FOOD".into());
        assert_eq!(TierKey::of(TierMode::Text, &a), TierKey::of(TierMode::Text, &b));
    }

    #[test]
    fn depth_tier_follows_revision() {
        let mut a = TextState::new(StateId(0), "x");
        let b = TextState::new(StateId(1), "y");
        assert_eq!(TierKey::of(TierMode::Depth, &a), TierKey::of(TierMode::Depth, &b));
        a.commit("z".into());
        assert_eq!(TierKey::of(TierMode::Depth, &a), TierKey::Depth(1));
    }
}
