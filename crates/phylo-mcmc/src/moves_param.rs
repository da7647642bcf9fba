use phylo_core::{MetropolisJudge, ModelExtension, PhyloError, RngHandle, TreeState, TuningState};

use crate::kernel::ChainState;
use crate::window::{propose_in_window, window_overlap};

/// Perturbs one of the three indel parameters, chosen uniformly.
///
/// Each parameter carries its own window span and boundary geometry:
/// R lives in (0, 1), lambda in (0, mu) and mu above lambda. The rate
/// parameters are proposed directly, so lambda and mu additionally carry
/// the `-(new - old)` Jacobian term in the heated exponent.
pub fn sample_indel_param(
    chain: &mut ChainState,
    tree: &mut dyn TreeState,
    ext: &mut dyn ModelExtension,
    tuning: &TuningState,
    rng: &mut RngHandle,
) -> Result<(), PhyloError> {
    let index = rng.next_index(3);
    ext.before_indel_param_change(tree, index);

    let params = tree.indel_params();
    let old = params[index];
    let old_log_like = chain.total_log_like;

    let (span, new) = match index {
        0 => {
            chain.counters.r.attempt();
            let span = tuning.r_span;
            let new = propose_in_window(old, span, rng, |v| v > 0.0 && v < 1.0);
            (span, new)
        }
        1 => {
            chain.counters.lambda.attempt();
            let mu = params[2];
            let span = tuning.lambda_span;
            let new = propose_in_window(old, span, rng, |v| v > 0.0 && v < mu);
            (span, new)
        }
        _ => {
            chain.counters.mu.attempt();
            let lambda = params[1];
            let span = tuning.mu_span;
            let new = propose_in_window(old, span, rng, |v| v > lambda);
            (span, new)
        }
    };

    tree.set_indel_param(index, new);
    tree.refresh_indel_models();
    let new_log_like = ext.log_like_indel_param_change(tree, index);

    let half = span / 2.0;
    let (exponent, hastings) = match index {
        0 => {
            let exponent = (new_log_like - old_log_like) * chain.heat;
            let hastings = window_overlap(Some(old), Some(1.0 - old), half)
                / window_overlap(Some(new), Some(1.0 - new), half);
            (exponent, hastings)
        }
        1 => {
            let mu = params[2];
            let exponent = (new_log_like - old_log_like - new + old) * chain.heat;
            let hastings = window_overlap(Some(old), Some(mu - old), half)
                / window_overlap(Some(new), Some(mu - new), half);
            (exponent, hastings)
        }
        _ => {
            let lambda = params[1];
            let exponent = (new_log_like - old_log_like - new + old) * chain.heat;
            let hastings = window_overlap(Some(old - lambda), None, half)
                / window_overlap(Some(new - lambda), None, half);
            (exponent, hastings)
        }
    };

    let accepted = rng.next_f64() < exponent.exp() * hastings;
    if accepted {
        match index {
            0 => chain.counters.r.accept(),
            1 => chain.counters.lambda.accept(),
            _ => chain.counters.mu.accept(),
        }
        chain.total_log_like = new_log_like;
    } else {
        tree.set_indel_param(index, old);
        tree.refresh_indel_models();
    }
    ext.after_indel_param_change(tree, index, accepted);
    Ok(())
}

/// Delegates a substitution-parameter proposal to the model's own sampler.
///
/// A model with zero free parameters makes this a designed no-op (still
/// counted as attempted when dispatched, which configuration normally
/// prevents by zeroing the weight). The model's sampler returns its own MH
/// log-ratio contribution `mh`; the acceptance probability is
/// `exp(mh + ln prior + delta) * heat`, with the heat outside the exponent
/// exactly as the reference behaviour prescribes.
pub fn sample_subst_param(
    chain: &mut ChainState,
    tree: &mut dyn TreeState,
    ext: &mut dyn ModelExtension,
    rng: &mut RngHandle,
) -> Result<(), PhyloError> {
    chain.counters.substitution.attempt();
    if tree.subst_param_count() == 0 {
        return Ok(());
    }

    ext.before_subst_param_change(tree);
    let mh = tree.sample_subst_param(rng);
    let old_log_like = chain.total_log_like;
    tree.refresh_subst_models();
    let new_log_like = ext.log_like_subst_param_change(tree);

    let acceptance =
        (mh + tree.subst_log_prior() + new_log_like - old_log_like).exp() * chain.heat;
    if rng.next_f64() < acceptance {
        chain.counters.substitution.accept();
        chain.total_log_like = new_log_like;
        ext.after_subst_param_change(tree, true);
    } else {
        tree.restore_subst_param();
        tree.refresh_subst_models();
        ext.after_subst_param_change(tree, false);
    }
    Ok(())
}

/// Metropolis callback handed to the extension during its parameter move.
pub(crate) struct KernelJudge<'a> {
    pub(crate) chain: &'a mut ChainState,
    pub(crate) rng: &'a mut RngHandle,
    pub(crate) accepted: bool,
}

impl MetropolisJudge for KernelJudge<'_> {
    fn rng(&mut self) -> &mut RngHandle {
        self.rng
    }

    fn decide(&mut self, log_like_ratio: f64, new_total_log_like: f64) -> bool {
        let old = self.chain.total_log_like;
        if self.rng.next_f64() < (log_like_ratio + new_total_log_like - old).exp() {
            self.chain.total_log_like = new_total_log_like;
            self.accepted = true;
            true
        } else {
            false
        }
    }
}

/// Runs the fully delegated model-extension move.
///
/// The extension proposes, asks the judge for a Metropolis decision and
/// rolls back its own state when the judge says no.
pub fn sample_mod_ext_param(
    chain: &mut ChainState,
    tree: &mut dyn TreeState,
    ext: &mut dyn ModelExtension,
    rng: &mut RngHandle,
) -> Result<(), PhyloError> {
    chain.counters.extension.attempt();
    ext.before_mod_ext_param_change(tree);
    let accepted = {
        let mut judge = KernelJudge {
            chain,
            rng,
            accepted: false,
        };
        ext.propose_param_change(tree, &mut judge);
        judge.accepted
    };
    if accepted {
        chain.counters.extension.accept();
    }
    ext.after_mod_ext_param_change(tree, accepted);
    Ok(())
}
