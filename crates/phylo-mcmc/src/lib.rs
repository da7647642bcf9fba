#![deny(missing_docs)]

//! Metropolis-Hastings engine for Bayesian sampling of multiple alignments,
//! phylogenetic trees and evolutionary model parameters.
//!
//! The engine owns proposal scheduling, acceptance arithmetic, adaptive
//! burn-in tuning and parallel tempering; everything model-specific is
//! reached through the collaborator traits in `phylo-core`. Runs are
//! replayable: every random draw of a chain comes from one seeded stream,
//! and tempered chains share a second stream so their swap decisions agree
//! without extra communication.

/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Core sampling kernel and the public `run` entry point.
pub mod kernel;
/// Alignment resampling move.
pub mod moves_align;
/// Indel, substitution and extension parameter moves.
pub mod moves_param;
/// Topology and branch length moves.
pub mod moves_tree;
/// Per-move acceptance counters.
pub mod stats;
/// Parallel tempering: swap protocol and the multi-chain runner.
pub mod tempering;
/// Burn-in proposal-span tuner.
pub mod tuning;
/// Truncated-window proposal primitives.
pub mod window;

pub use config::{AutomationFlags, CalibrationConfig, ProposalWeights, RunConfig, TuningConfig};
pub use kernel::{run, ChainState, MoveKind, RunSummary, StopHandle};
pub use stats::{AcceptCounter, MoveCounters};
pub use tempering::{run_tempered, DuplexLink, PeerLink, SwapMessage, TemperedChain};
