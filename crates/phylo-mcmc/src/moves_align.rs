use phylo_core::{ModelExtension, PhyloError, RngHandle, TreeState, TuningState};

use crate::kernel::{weighted_choose_f64, ChainState};

/// Exponent applied to subtree leaf counts when picking the realignment
/// root; larger values bias selection towards bigger subtrees.
pub const LEAF_COUNT_POWER: f64 = 1.0;

/// Inclusion probability of a node at each depth below the selected root
/// when marking the subtree for realignment. Depths past the end of the
/// schedule are never included.
pub const SUBTREE_LEVEL_PROBS: [f64; 5] = [0.9, 0.6, 0.4, 0.2, 0.0];

/// Resamples the alignment of a randomly marked subtree.
///
/// The realignment itself is delegated to the tree collaborator, which
/// returns the log proposal density correction (`bpp`) of the HMM sampling;
/// that term enters the acceptance exponent unmodified alongside the heated
/// likelihood delta.
pub fn sample_alignment(
    chain: &mut ChainState,
    tree: &mut dyn TreeState,
    ext: &mut dyn ModelExtension,
    tuning: &TuningState,
    rng: &mut RngHandle,
) -> Result<(), PhyloError> {
    chain.counters.alignment.attempt();

    let weights: Vec<f64> = (0..tree.node_count())
        .map(|node| (tree.leaf_count(node) as f64).powf(LEAF_COUNT_POWER))
        .collect();
    let root = weighted_choose_f64(&weights, rng);
    tree.mark_subtree(root, &SUBTREE_LEVEL_PROBS, rng);

    ext.before_align_change(tree, root);
    let old_log_like = chain.total_log_like;
    let bpp = tree.resample_marked_alignment(root, tuning.window_multiplier, rng);
    let new_log_like = ext.log_like_align_change(tree, root);

    if rng.next_f64().ln() < bpp + (new_log_like - old_log_like) * chain.heat {
        chain.total_log_like = new_log_like;
        chain.counters.alignment.accept();
        ext.after_align_change(tree, root, true);
    } else {
        tree.restore_alignment(root);
        ext.after_align_change(tree, root, false);
    }
    Ok(())
}
