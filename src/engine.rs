//! Rule cascade engine.
//!
//! This module is the entry point for everything that happens between a
//! compiled [`RuleSet`](crate::RuleSet) and a stream of
//! [`TransformationRecord`]s. It is split into focused submodules under
//! `src/engine/`.
//!
//! ## How the parts work together
//!
//! ```text
//! RuleSet ───────────────┐
//!                        │
//! TextState batch ───────┼─ CascadeEngine::run_batch      (cascade.rs)
//!                        │    - one cascade per state, rayon pool
//!                        │    - rules in order, stop on exit
//!                        │    - retry on original when a rule misses
//!                        │         └─ find_interfering_rules (interference.rs)
//!                        v
//!           Vec<TransformationRecord>                   (record.rs)
//!                        │
//!                        ├──▶ RuleStats::collect        (metrics.rs)
//!                        └──▶ GraphBuilder::ingest      (crate::graph)
//! ```
//!
//! The engine never builds the graph itself. Records are the only thing it
//! hands downstream, which keeps cascades free of shared mutable state apart
//! from the rule counters.
//!
//! ## Responsibilities by module
//!
//! - `cascade.rs`: the per-state state machine and the batch runner.
//! - `interference.rs`: which earlier rules hide a match on the original text.
//! - `record.rs`: the record type and flattened interference findings.
//! - `metrics.rs`: per-run timing and per-rule statistics.
//!
//! ## Debugging
//!
//! Everything is logged through `tracing`:
//!
//! - `trace`: every rewrite and every new graph node.
//! - `debug`: retries, exits, skipped graph edges and the graph summary.
//! - `info`: one summary per categorization run.
//! - `warn`: execution errors and interfering rules.
//!
//! Install a subscriber to see them.

#[path = "engine/cascade.rs"]
mod cascade;
#[path = "engine/interference.rs"]
mod interference;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/record.rs"]
mod record;


pub use cascade::CascadeEngine;
pub use metrics::{RuleStats, RunMetrics};
pub use record::{Interference, TransformationRecord};
