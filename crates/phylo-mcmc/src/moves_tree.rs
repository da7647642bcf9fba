use phylo_core::errors::ErrorInfo;
use phylo_core::{ModelExtension, PhyloError, RngHandle, TreeState};

use crate::config::TuningConfig;
use crate::kernel::ChainState;
use crate::window::{propose_in_window, window_overlap};

/// Swaps a random eligible node with its uncle.
///
/// The root and its two children are ineligible; a draw over the reduced
/// index range is remapped into the tail of the index space so selection
/// stays uniform over the eligible set. On rejection the swap is undone by
/// the collaborator's exact inverse, and in debug builds the parent/child
/// back-references are validated both before and after the rollback.
pub fn sample_topology(
    chain: &mut ChainState,
    tree: &mut dyn TreeState,
    ext: &mut dyn ModelExtension,
    rng: &mut RngHandle,
) -> Result<(), PhyloError> {
    let node_count = tree.node_count();
    if node_count <= 3 {
        return Ok(());
    }
    chain.counters.topology.attempt();
    let old_log_like = chain.total_log_like;

    let mut nephew = rng.next_index(node_count - 3);
    if let Some(rank) = tree.root_attachment_rank(nephew) {
        // The draw hit one of the excluded root-adjacent nodes; remap it to
        // the eligible nodes hiding in the last three index slots.
        let mut tail_eligible = [0usize; 3];
        let mut found = 0;
        let mut slot = rank;
        for index in node_count - 3..node_count {
            match tree.root_attachment_rank(index) {
                None => {
                    tail_eligible[found] = index;
                    found += 1;
                }
                Some(other) if other < rank => slot -= 1,
                Some(_) => {}
            }
        }
        nephew = tail_eligible[slot];
    }
    let uncle = tree.uncle_of(nephew);

    ext.before_tree_change(tree, nephew);
    let bpp = tree.swap_with_uncle(nephew, rng);
    let new_log_like = ext.log_like_tree_change(tree, nephew);

    if rng.next_f64().ln() < bpp + (new_log_like - old_log_like) * chain.heat {
        chain.counters.topology.accept();
        chain.total_log_like = new_log_like;
        ext.after_tree_change(tree, uncle, true);
    } else {
        if cfg!(debug_assertions) {
            tree.check_structure().map_err(structure_failure)?;
        }
        tree.swap_back_uncle(uncle, rng);
        if cfg!(debug_assertions) {
            tree.check_structure().map_err(structure_failure)?;
        }
        ext.after_tree_change(tree, nephew, false);
    }
    Ok(())
}

fn structure_failure(err: PhyloError) -> PhyloError {
    PhyloError::Consistency(
        ErrorInfo::new(
            "broken-topology-rollback",
            "tree structure check failed around a rejected topology move",
        )
        .with_context("cause", err.to_string()),
    )
}

/// Proposes a new branch length from a window truncated below at the
/// configured minimum.
///
/// The move proposes the length directly rather than its logarithm, so the
/// transform Jacobian contributes a `-(new - old)` term to the heated
/// exponent; the boundary truncation contributes the usual ratio of window
/// overlap lengths.
pub fn sample_edge(
    chain: &mut ChainState,
    tree: &mut dyn TreeState,
    ext: &mut dyn ModelExtension,
    span: f64,
    cfg: &TuningConfig,
    rng: &mut RngHandle,
) -> Result<(), PhyloError> {
    chain.counters.edge.attempt();

    // Uniform over all non-root nodes.
    let mut node = rng.next_index(tree.node_count() - 1);
    if node >= tree.root() {
        node += 1;
    }
    let old_length = tree.edge_length(node);
    let old_log_like = chain.total_log_like;
    let min_length = cfg.min_edge_length;

    ext.before_edge_len_change(tree, node);
    let new_length = propose_in_window(old_length, span, rng, |value| value >= min_length);
    tree.set_edge_length(node, new_length);
    tree.recompute_edge_path(node);
    let new_log_like = ext.log_like_edge_len_change(tree, node);

    let half = span / 2.0;
    let exponent = (new_log_like - old_log_like - new_length + old_length) * chain.heat;
    let hastings = window_overlap(Some(old_length - min_length), None, half)
        / window_overlap(Some(new_length - min_length), None, half);

    if rng.next_f64() < exponent.exp() * hastings {
        chain.counters.edge.accept();
        chain.total_log_like = new_log_like;
        ext.after_edge_len_change(tree, node, true);
    } else {
        tree.set_edge_length(node, old_length);
        tree.recompute_edge_path(node);
        ext.after_edge_len_change(tree, node, false);
    }
    Ok(())
}
