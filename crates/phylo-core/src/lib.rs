#![deny(missing_docs)]

//! Collaborator contracts and shared types for the phylo MCMC engine.
//!
//! The proposal/acceptance engine in `phylo-mcmc` never computes a tree or
//! alignment likelihood itself. Everything expensive lives behind the
//! [`TreeState`] trait, pluggable model extensions behind [`ModelExtension`],
//! run-length heuristics behind [`Automation`] and output behind
//! [`Reporter`]. This crate defines those seams plus the deterministic RNG
//! handle and structured error type every phylo crate shares.

pub mod errors;
pub mod rng;
mod types;

pub use errors::{ErrorInfo, PhyloError};
pub use rng::{derive_substream_seed, RngHandle};
pub use types::{McmcStep, StateSnapshot, TuningState};

/// Contract for the tree/alignment collaborator owned by one chain.
///
/// Nodes are addressed by index in `0..node_count()`; the engine never
/// inspects tree structure beyond what these accessors expose. Every
/// mutating operation comes paired with an exact inverse (`restore_*`,
/// `swap_back_uncle`, or re-applying the saved value) and the engine relies
/// on those pairs being true inverses: a rejected move must leave the state
/// bit-identical to the pre-move snapshot.
pub trait TreeState: Send {
    /// Number of nodes in the tree (leaves and internal nodes).
    fn node_count(&self) -> usize;

    /// Index of the root node; the root has no branch above it.
    fn root(&self) -> usize;

    /// Recomputes the total log-likelihood of the current state from scratch.
    fn total_log_like(&self) -> f64;

    /// Recomputes the total log-prior of the current state.
    fn total_log_prior(&self) -> f64;

    /// Number of leaves at or below the given node.
    fn leaf_count(&self, node: usize) -> usize;

    /// `Some(rank)` with `rank < 3` when `node` is the root or one of its
    /// immediate children, i.e. ineligible for the topology move; `None`
    /// for every eligible node.
    fn root_attachment_rank(&self, node: usize) -> Option<usize>;

    /// Branch length above the given node.
    fn edge_length(&self, node: usize) -> f64;

    /// Current indel process parameters `[R, lambda, mu]`.
    fn indel_params(&self) -> [f64; 3];

    /// Current free parameters of the substitution model.
    fn subst_params(&self) -> Vec<f64>;

    /// Number of free substitution-model parameters. Zero disables the
    /// substitution-parameter move.
    fn subst_param_count(&self) -> usize;

    /// Log-prior of the substitution model at its current parameters.
    fn subst_log_prior(&self) -> f64;

    /// Printable Newick-style rendering of the current topology.
    fn printed_tree(&self) -> String;

    /// Current leaf alignment as one gapped row per leaf.
    fn leaf_alignment(&self) -> Vec<String>;

    /// Full snapshot of the current state.
    fn snapshot(&self) -> StateSnapshot;

    /// Marks a random subtree rooted at `root` for realignment. The
    /// inclusion probability at depth `d` is `level_probs[d]`, and nodes
    /// deeper than the schedule are never included.
    fn mark_subtree(&mut self, root: usize, level_probs: &[f64], rng: &mut RngHandle);

    /// Resamples the alignment of the marked subtree and returns the log
    /// proposal density correction to add to the acceptance exponent. The
    /// window multiplier scales the realignment window width.
    fn resample_marked_alignment(
        &mut self,
        root: usize,
        window_multiplier: f64,
        rng: &mut RngHandle,
    ) -> f64;

    /// Restores the alignment exactly as it was before the last
    /// `resample_marked_alignment` call for `root`.
    fn restore_alignment(&mut self, root: usize);

    /// Index of the sibling of `nephew`'s parent.
    fn uncle_of(&self, nephew: usize) -> usize;

    /// Swaps `nephew` with its uncle, resampling the affected alignments,
    /// and returns the log proposal correction of the swap.
    fn swap_with_uncle(&mut self, nephew: usize, rng: &mut RngHandle) -> f64;

    /// Exact inverse of `swap_with_uncle`, called with the original uncle.
    fn swap_back_uncle(&mut self, uncle: usize, rng: &mut RngHandle);

    /// Verifies parent/child back-references across the whole tree.
    /// Debug-only self-check; a failure indicates a broken rollback.
    fn check_structure(&self) -> Result<(), PhyloError>;

    /// Sets the branch length above `node` without recomputing anything.
    fn set_edge_length(&mut self, node: usize, length: f64);

    /// Recomputes the cached likelihood contributions along the path from
    /// `node` up to the root after a branch length change.
    fn recompute_edge_path(&mut self, node: usize);

    /// Sets one indel parameter (0 = R, 1 = lambda, 2 = mu) without
    /// recomputing anything.
    fn set_indel_param(&mut self, index: usize, value: f64);

    /// Refreshes the per-node indel HMM matrices and the indel likelihood
    /// after an indel parameter change.
    fn refresh_indel_models(&mut self);

    /// Asks the substitution model to propose new parameters from its own
    /// sampler, returning its Metropolis-Hastings log-ratio contribution.
    fn sample_subst_param(&mut self, rng: &mut RngHandle) -> f64;

    /// Restores the substitution parameters proposed by the last
    /// `sample_subst_param` call.
    fn restore_subst_param(&mut self);

    /// Refreshes the per-node transition matrices and the substitution
    /// likelihood after a substitution parameter change.
    fn refresh_subst_models(&mut self);
}

/// Callback handed to a model extension so it can request a Metropolis
/// decision for its own proposal.
pub trait MetropolisJudge {
    /// The chain's move RNG stream; the extension draws any randomness for
    /// its proposal from here so the chain stays replayable.
    fn rng(&mut self) -> &mut RngHandle;

    /// Applies the Metropolis test for the extension's proposal.
    /// `log_like_ratio` is the extension's own proposal contribution and
    /// `new_total_log_like` the freshly recomputed total including the
    /// extension's terms. Returns whether the proposal was accepted; on
    /// rejection the extension is responsible for rolling back its own
    /// state.
    fn decide(&mut self, log_like_ratio: f64, new_total_log_like: f64) -> bool;
}

/// Contract for pluggable model-extension modules.
///
/// Every method has a default implementation, so an extension only overrides
/// the hooks it cares about and a no-op extension is zero code. The
/// `log_like_*` methods exist so an extension can contribute its own terms
/// to the recomputed total after each move type; the defaults delegate to
/// the tree collaborator.
pub trait ModelExtension: Send {
    /// Called once before the first burn-in step.
    fn before_sampling(&mut self, _tree: &dyn TreeState) {}

    /// Called once after the last sample, including on cooperative stop.
    fn after_sampling(&mut self) {}

    /// Proposal weight for the extension's own parameter move. Re-read
    /// before every dispatch; zero disables the move.
    fn param_change_weight(&self) -> u32 {
        0
    }

    /// Total log-likelihood including extension terms.
    fn total_log_like(&self, tree: &dyn TreeState) -> f64 {
        tree.total_log_like()
    }

    /// Total log-prior including extension terms.
    fn total_log_prior(&self, tree: &dyn TreeState) -> f64 {
        tree.total_log_prior()
    }

    /// Total log-likelihood after an alignment change below `root`.
    fn log_like_align_change(&self, tree: &dyn TreeState, _root: usize) -> f64 {
        tree.total_log_like()
    }

    /// Total log-likelihood after a topology change around `nephew`.
    fn log_like_tree_change(&self, tree: &dyn TreeState, _nephew: usize) -> f64 {
        tree.total_log_like()
    }

    /// Total log-likelihood after a branch length change at `node`.
    fn log_like_edge_len_change(&self, tree: &dyn TreeState, _node: usize) -> f64 {
        tree.total_log_like()
    }

    /// Total log-likelihood after a change of indel parameter `index`.
    fn log_like_indel_param_change(&self, tree: &dyn TreeState, _index: usize) -> f64 {
        tree.total_log_like()
    }

    /// Total log-likelihood after a substitution parameter change.
    fn log_like_subst_param_change(&self, tree: &dyn TreeState) -> f64 {
        tree.total_log_like()
    }

    /// Total log-likelihood after an extension parameter change.
    fn log_like_mod_ext_param_change(&self, tree: &dyn TreeState) -> f64 {
        tree.total_log_like()
    }

    /// Announces an upcoming alignment move below `root`.
    fn before_align_change(&mut self, _tree: &dyn TreeState, _root: usize) {}

    /// Reports the outcome of an alignment move.
    fn after_align_change(&mut self, _tree: &dyn TreeState, _root: usize, _accepted: bool) {}

    /// Announces an upcoming topology move around `nephew`.
    fn before_tree_change(&mut self, _tree: &dyn TreeState, _nephew: usize) {}

    /// Reports the outcome of a topology move.
    fn after_tree_change(&mut self, _tree: &dyn TreeState, _node: usize, _accepted: bool) {}

    /// Announces an upcoming branch length move at `node`.
    fn before_edge_len_change(&mut self, _tree: &dyn TreeState, _node: usize) {}

    /// Reports the outcome of a branch length move.
    fn after_edge_len_change(&mut self, _tree: &dyn TreeState, _node: usize, _accepted: bool) {}

    /// Announces an upcoming indel parameter move for parameter `index`.
    fn before_indel_param_change(&mut self, _tree: &dyn TreeState, _index: usize) {}

    /// Reports the outcome of an indel parameter move.
    fn after_indel_param_change(&mut self, _tree: &dyn TreeState, _index: usize, _accepted: bool) {}

    /// Announces an upcoming substitution parameter move.
    fn before_subst_param_change(&mut self, _tree: &dyn TreeState) {}

    /// Reports the outcome of a substitution parameter move.
    fn after_subst_param_change(&mut self, _tree: &dyn TreeState, _accepted: bool) {}

    /// Announces an upcoming extension parameter move.
    fn before_mod_ext_param_change(&mut self, _tree: &dyn TreeState) {}

    /// Reports the outcome of an extension parameter move.
    fn after_mod_ext_param_change(&mut self, _tree: &dyn TreeState, _accepted: bool) {}

    /// Proposes a change to the extension's own parameters. The extension
    /// mutates its state, then calls `judge.decide` with its proposal's
    /// log-likelihood-ratio contribution and the recomputed total; on a
    /// `false` outcome it must roll its state back itself.
    fn propose_param_change(&mut self, _tree: &mut dyn TreeState, _judge: &mut dyn MetropolisJudge) {
    }

    /// Lets the extension rescale its own proposal widths when the tuner
    /// runs.
    fn modify_proposal_widths(&mut self, _tuning: &mut TuningState) {}
}

/// Contract for the run-length automation heuristics.
///
/// The engine only collects the inputs (log-likelihood history, calibration
/// alignments, similarity scores) and acts on the verdicts; the statistics
/// behind the verdicts are the collaborator's business.
pub trait Automation: Send + Sync {
    /// Whether the chain has stopped improving, given the log-likelihoods
    /// recorded every 50 burn-in steps.
    fn should_stop_burn_in(&self, log_likes: &[f64]) -> bool;

    /// Recommended sampling interval derived from the alignment snapshots
    /// collected during the calibration window at the given probe rate.
    fn sampling_rate_from_space(&self, alignments: &[Vec<String>], probe_rate: usize) -> usize;

    /// Similarity between the cumulative consensus of all samples so far
    /// and the consensus excluding the latest sample.
    fn consensus_similarity(&self, alignments: &[Vec<String>]) -> f64;

    /// Whether sampling can stop, given the history of consensus
    /// similarity scores. Only consulted once at least 5 samples exist.
    fn should_stop_sampling(&self, similarities: &[f64]) -> bool;
}

/// Contract for the reporting collaborator.
///
/// Reporting is best-effort: `new_sample` and `log_line` may fail with I/O
/// errors, which the engine logs and swallows. A reporter failure never
/// aborts a chain.
pub trait Reporter: Send {
    /// Called once before the first burn-in step.
    fn before_first_sample(&mut self, _tree: &dyn TreeState) {}

    /// Called after every iteration with the current step summary.
    fn new_step(&mut self, _step: &McmcStep) {}

    /// Called periodically so interactive consumers can refresh.
    fn new_peek(&mut self) {}

    /// Delivers sample `index` of `total` from the cold chain.
    fn new_sample(
        &mut self,
        _state: &StateSnapshot,
        _index: usize,
        _total: usize,
    ) -> std::io::Result<()> {
        Ok(())
    }

    /// Called once after the final sample.
    fn after_last_sample(&mut self) {}

    /// Appends a line to the run log.
    fn log_line(&mut self, _line: &str) -> std::io::Result<()> {
        Ok(())
    }
}
