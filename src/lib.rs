//! Ordered regex rule cascades with a provenance graph.
//!
//! Free-text descriptions (bank transactions, typically) are rewritten by an
//! ordered list of pattern/replacement rules until the list runs out or a rule
//! marked exit-on-match fires. Every rule application is recorded, and the
//! records are folded into a graph that explains how each input reached its
//! final form.
//!
//! ```
//! use recascade::{Categorizer, RuleOptions, RuleSetBuilder};
//!
//! let rules = RuleSetBuilder::new()
//!     .add(r"\d{2}/\d{2}/\d{4}", "")
//!     .add_with("pizza", "Ristorazione", RuleOptions::EXIT_ON_MATCH)
//!     .build()
//!     .unwrap();
//!
//! let result = Categorizer::new(rules).categorize(["Pizza Napoli 12/04/2023"]).unwrap();
//! assert_eq!(result.resolve_final("pizza napoli 12/04/2023"), "Ristorazione Napoli ");
//! ```

#[macro_use]
mod macros;
mod api;
mod engine;
mod error;
mod graph;
pub mod patterns;
mod rule;
mod rule_set;
mod state;

pub use api::{Categorization, Categorizer, Options, assign_categories};
pub use engine::{CascadeEngine, Interference, RuleStats, RunMetrics, TransformationRecord};
pub use error::{CategorizeError, GraphWarning, RuleCompilationError, RuleExecutionError};
pub use graph::{
    AggregateEdge, AggregateNode, DebugStep, DetailEdge, DetailNode, EdgeId, EdgeKind, Graph, GraphBuilder,
    GraphEdge, GraphNode, MembershipEdge, NodeId, NodeKind, SkippedEdges, TierKey, TierMode, debug_trail,
    resolve_final, try_resolve_final,
};
pub use rule::{DEFAULT_REGEX_SIZE_LIMIT, ExecLimits, Rewrite, Rule, RuleDef, RuleId, RuleOptions};
pub use rule_set::{RuleSet, RuleSetBuilder};
pub use state::{StateId, StateKey, TextState};

/// Cancellation token accepted by [`Categorizer::categorize_with_cancel`].
pub use tokio_util::sync::CancellationToken;
