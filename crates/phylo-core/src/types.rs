//! Shared data types exchanged between the engine and its collaborators.

use serde::{Deserialize, Serialize};

/// Complete description of one chain's tree/alignment state.
///
/// Snapshots serve two purposes: they are the payload shipped from a worker
/// chain to the coordinator when the cold chain lives on a worker, and they
/// give tests a way to assert that a rejected move restored the state
/// bit-for-bit. `PartialEq` compares every field, including the cached
/// likelihood table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Node names; leaves first, indexed consistently with the other arrays.
    pub names: Vec<String>,
    /// Left child index per node, `-1` for leaves.
    pub left: Vec<i32>,
    /// Right child index per node, `-1` for leaves.
    pub right: Vec<i32>,
    /// Parent index per node, `-1` for the root.
    pub parent: Vec<i32>,
    /// Branch length above each node.
    pub edge_lengths: Vec<f64>,
    /// Ungapped sequence per node.
    pub sequences: Vec<String>,
    /// Alignment matrix: per node, the column index of each character.
    pub alignment: Vec<Vec<i32>>,
    /// Cached per-node likelihood table (one vector of partials per column).
    pub likelihood_table: Vec<Vec<Vec<f64>>>,
    /// Insertion/deletion process parameters `[R, lambda, mu]`.
    pub indel_params: [f64; 3],
    /// Free parameters of the substitution model.
    pub subst_params: Vec<f64>,
    /// Total log-likelihood of the state.
    pub log_like: f64,
    /// Index of the root node.
    pub root: usize,
}

/// Per-iteration notification payload delivered to reporters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct McmcStep {
    /// Total log-likelihood after the iteration's move.
    pub new_log_like: f64,
    /// Whether the chain is still in the burn-in phase.
    pub burn_in: bool,
}

/// Mutable proposal step sizes shared by the tuner and the move evaluators.
///
/// Owned by the run controller and handed to evaluators by reference; the
/// tuner is the only writer and only touches it during burn-in. The state is
/// never reset mid-run, so spans calibrated during burn-in carry over into
/// the sampling phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningState {
    /// Alignment resampling window multiplier.
    pub window_multiplier: f64,
    /// Proposal window width for branch lengths.
    pub edge_span: f64,
    /// Proposal window width for the indel parameter R.
    pub r_span: f64,
    /// Proposal window width for the insertion rate lambda.
    pub lambda_span: f64,
    /// Proposal window width for the deletion rate mu.
    pub mu_span: f64,
}

impl Default for TuningState {
    fn default() -> Self {
        Self {
            window_multiplier: 1.0,
            edge_span: 0.1,
            r_span: 0.1,
            lambda_span: 0.02,
            mu_span: 0.02,
        }
    }
}
