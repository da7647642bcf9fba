use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use phylo_core::errors::ErrorInfo;
use phylo_core::{
    Automation, McmcStep, ModelExtension, PhyloError, Reporter, RngHandle, TreeState, TuningState,
};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::determinism;
use crate::moves_align::sample_alignment;
use crate::moves_param::{sample_indel_param, sample_mod_ext_param, sample_subst_param};
use crate::moves_tree::{sample_edge, sample_topology};
use crate::stats::MoveCounters;
use crate::tempering::ParallelCtx;
use crate::tuning::tune_burn_in;

/// Tolerance for the debug-build check that the cached total
/// log-likelihood matches a fresh recomputation after every move.
pub const CONSISTENCY_TOL: f64 = 1e-5;

/// Hard cap on automated burn-in length, in steps.
pub const AUTO_BURN_IN_CAP: usize = 10_000_000;

/// Hard cap on the automated sampling interval, in steps.
pub const AUTO_PERIOD_CAP: usize = 1_000_000;

/// Burn-in log-likelihoods are recorded for the automation heuristic at
/// this stride.
const BURN_IN_LOG_STRIDE: usize = 50;

/// Consensus convergence is only consulted once this many samples exist.
const CONVERGENCE_MIN_SAMPLES: usize = 5;

/// The six move types, in dispatch-weight order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveKind {
    /// Subtree realignment.
    Alignment,
    /// Nephew/uncle topology swap.
    Topology,
    /// Branch length perturbation.
    EdgeLength,
    /// Indel process parameter perturbation.
    IndelParam,
    /// Substitution model parameter resampling.
    SubstParam,
    /// Model-extension parameter move.
    ModExtParam,
}

impl MoveKind {
    fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Alignment,
            1 => Self::Topology,
            2 => Self::EdgeLength,
            3 => Self::IndelParam,
            4 => Self::SubstParam,
            _ => Self::ModExtParam,
        }
    }

    /// Stable lowercase name for logs and error context.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alignment => "alignment",
            Self::Topology => "topology",
            Self::EdgeLength => "edge-length",
            Self::IndelParam => "indel-param",
            Self::SubstParam => "subst-param",
            Self::ModExtParam => "modext-param",
        }
    }
}

/// Shared flag for cooperative cancellation. Cloning yields another handle
/// to the same flag, so one handle can stop every chain of a tempered run.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Creates a fresh, unset handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a cooperative stop. Chains notice before their next move.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Mutable per-chain bookkeeping threaded through the move evaluators.
#[derive(Debug)]
pub struct ChainState {
    /// Chain temperature in (0, 1]; 1.0 is the cold chain.
    pub heat: f64,
    /// Cached total log-likelihood of the current state.
    pub total_log_like: f64,
    /// Whether the chain is still in burn-in.
    pub burn_in: bool,
    /// Per-move acceptance counters.
    pub counters: MoveCounters,
}

impl ChainState {
    fn new(heat: f64) -> Self {
        Self {
            heat,
            total_log_like: 0.0,
            burn_in: true,
            counters: MoveCounters::default(),
        }
    }
}

/// What a finished chain reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Post-burn-in acceptance rate per move type.
    pub acceptance_rates: BTreeMap<String, f64>,
    /// Number of samples delivered (on the cold chain) or reached.
    pub samples_taken: usize,
    /// Sampling interval actually used, after any calibration.
    pub sample_rate: usize,
    /// Burn-in length actually run, after any automation.
    pub burn_in_steps: usize,
    /// Cached total log-likelihood at the end of the run.
    pub final_log_like: f64,
    /// Heat held at the end of the run.
    pub final_heat: f64,
    /// Whether the run ended on a cooperative stop rather than completing.
    pub stopped: bool,
    /// Human-readable acceptance summary.
    pub info: String,
}

/// Draws an index from `0..weights.len()` with probability proportional to
/// the integer weights. At least one weight must be positive.
pub fn weighted_choose_u32(weights: &[u32], rng: &mut RngHandle) -> usize {
    let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    debug_assert!(total > 0, "no positive weight");
    let mut draw = rng.next_index(total as usize) as u64;
    for (index, &weight) in weights.iter().enumerate() {
        let weight = u64::from(weight);
        if draw < weight {
            return index;
        }
        draw -= weight;
    }
    weights.iter().rposition(|&w| w > 0).unwrap_or(0)
}

/// Draws an index with probability proportional to the real weights.
/// Rounding at the upper edge falls back to the last positive weight, so a
/// zero-weight entry is never selected.
pub fn weighted_choose_f64(weights: &[f64], rng: &mut RngHandle) -> usize {
    let total: f64 = weights.iter().sum();
    debug_assert!(total > 0.0, "no positive weight");
    let mut draw = rng.next_f64() * total;
    for (index, &weight) in weights.iter().enumerate() {
        draw -= weight;
        if draw < 0.0 && weight > 0.0 {
            return index;
        }
    }
    weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
}

/// Runs one unheated chain to completion.
///
/// The configuration is validated first; the run then walks burn-in, the
/// optional sampling-rate calibration window and the sampling phase, and
/// reports every sample to `reporter`. A cooperative stop via `stop` is not
/// an error and is surfaced through [`RunSummary::stopped`].
pub fn run(
    config: &RunConfig,
    tree: &mut dyn TreeState,
    ext: &mut dyn ModelExtension,
    automation: &dyn Automation,
    reporter: &mut dyn Reporter,
    stop: &StopHandle,
) -> Result<RunSummary, PhyloError> {
    config.validate()?;
    run_chain(
        config,
        tree,
        ext,
        automation,
        reporter,
        stop.clone(),
        1.0,
        0,
        None,
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn run_chain(
    config: &RunConfig,
    tree: &mut dyn TreeState,
    ext: &mut dyn ModelExtension,
    automation: &dyn Automation,
    reporter: &mut dyn Reporter,
    stop: StopHandle,
    heat: f64,
    rank: usize,
    parallel: Option<ParallelCtx>,
) -> Result<RunSummary, PhyloError> {
    let sampler = Sampler {
        config,
        tree,
        ext,
        automation,
        reporter,
        stop,
        rng: RngHandle::from_seed(determinism::move_stream_seed(config.seed, rank)),
        chain: ChainState::new(heat),
        tuning: TuningState::default(),
        parallel,
        swap_countdown: config.swap_rate,
        burn_in_steps: 0,
        effective_sample_rate: config.sample_rate,
        samples_taken: 0,
    };
    sampler.run()
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Completed,
    Stopped,
}

struct Sampler<'a> {
    config: &'a RunConfig,
    tree: &'a mut dyn TreeState,
    ext: &'a mut dyn ModelExtension,
    automation: &'a dyn Automation,
    reporter: &'a mut dyn Reporter,
    stop: StopHandle,
    rng: RngHandle,
    chain: ChainState,
    tuning: TuningState,
    parallel: Option<ParallelCtx>,
    swap_countdown: usize,
    burn_in_steps: usize,
    effective_sample_rate: usize,
    samples_taken: usize,
}

impl Sampler<'_> {
    fn run(mut self) -> Result<RunSummary, PhyloError> {
        self.ext.before_sampling(&*self.tree);
        self.reporter.before_first_sample(&*self.tree);
        self.chain.total_log_like = self.ext.total_log_like(&*self.tree);

        let flow = match self.main_loop() {
            Ok(flow) => flow,
            Err(err) => {
                self.ext.after_sampling();
                return Err(err);
            }
        };
        self.reporter.after_last_sample();
        self.ext.after_sampling();

        Ok(RunSummary {
            acceptance_rates: self.chain.counters.acceptance_rates(),
            samples_taken: self.samples_taken,
            sample_rate: self.effective_sample_rate,
            burn_in_steps: self.burn_in_steps,
            final_log_like: self.chain.total_log_like,
            final_heat: self.chain.heat,
            stopped: flow == Flow::Stopped,
            info: self.chain.counters.info_string(),
        })
    }

    fn main_loop(&mut self) -> Result<Flow, PhyloError> {
        if self.burn_in()? == Flow::Stopped {
            return Ok(Flow::Stopped);
        }
        if self.config.automation.sampling_rate {
            match self.calibrate_sample_rate()? {
                Some(rate) => self.effective_sample_rate = rate,
                None => return Ok(Flow::Stopped),
            }
        }
        // The calibration window runs under burn-in bookkeeping; neither
        // its moves nor burn-in's leak into the reported rates.
        self.chain.counters.reset_all();
        self.chain.burn_in = false;
        self.sampling()
    }

    fn burn_in(&mut self) -> Result<Flow, PhyloError> {
        if self.config.automation.burn_in {
            let mut trace = Vec::new();
            let mut step = 0;
            while step < AUTO_BURN_IN_CAP {
                if !self.step_once()? {
                    return Ok(Flow::Stopped);
                }
                step += 1;
                if step % BURN_IN_LOG_STRIDE == 0 {
                    trace.push(self.chain.total_log_like);
                    if self.automation.should_stop_burn_in(&trace) {
                        break;
                    }
                }
                self.maybe_tune(step);
            }
            self.burn_in_steps = step;
        } else {
            for step in 1..=self.config.burn_in {
                if !self.step_once()? {
                    return Ok(Flow::Stopped);
                }
                self.maybe_tune(step);
            }
            self.burn_in_steps = self.config.burn_in;
        }
        Ok(Flow::Completed)
    }

    /// Nudges proposal spans towards the target acceptance band at the
    /// sampling cadence. Runs through burn-in and calibration, never in
    /// the sampling phase.
    fn maybe_tune(&mut self, step: usize) {
        if !self.config.automation.proposal_spans {
            return;
        }
        if step % self.config.sample_rate != 0 {
            return;
        }
        tune_burn_in(
            &mut self.tuning,
            &mut self.chain.counters,
            &self.config.tuning,
        );
        self.ext.modify_proposal_widths(&mut self.tuning);
    }

    /// Runs the calibration window and returns the recommended sampling
    /// interval, or `None` on a cooperative stop.
    fn calibrate_sample_rate(&mut self) -> Result<Option<usize>, PhyloError> {
        let probe_rate = self.config.calibration.probe_rate;
        let mut probes = Vec::new();
        for step in 1..=self.config.calibration.window {
            if !self.step_once()? {
                return Ok(None);
            }
            if step % probe_rate == 0 {
                probes.push(self.tree.leaf_alignment());
            }
            self.maybe_tune(step);
        }
        let rate = self
            .automation
            .sampling_rate_from_space(&probes, probe_rate)
            .clamp(1, AUTO_PERIOD_CAP);
        Ok(Some(rate))
    }

    fn sampling(&mut self) -> Result<Flow, PhyloError> {
        let rate = self.effective_sample_rate;
        let open_ended = self.config.automation.sample_count;
        // A planned total of zero tells reporters the run is open-ended.
        let planned = if open_ended {
            0
        } else {
            self.config.cycles / rate
        };

        let mut sample_alignments: Vec<Vec<String>> = Vec::new();
        let mut similarities = Vec::new();
        let mut index = 0;
        loop {
            if !open_ended && index >= planned {
                break;
            }
            for _ in 0..rate {
                if !self.step_once()? {
                    return Ok(Flow::Stopped);
                }
                if let Err(err) = self.maybe_swap() {
                    return self.rendezvous_failure(err);
                }
            }
            self.reporter.new_peek();
            if let Err(err) = self.report_sample(index, planned) {
                return self.rendezvous_failure(err);
            }
            index += 1;
            self.samples_taken = index;
            if open_ended {
                sample_alignments.push(self.tree.leaf_alignment());
                similarities.push(self.automation.consensus_similarity(&sample_alignments));
                if index > CONVERGENCE_MIN_SAMPLES
                    && self.automation.should_stop_sampling(&similarities)
                {
                    break;
                }
            }
        }
        Ok(Flow::Completed)
    }

    /// A peer that honours a stop request drops its end of the swap and
    /// sample channels, so a chain parked in a rendezvous for the same
    /// ordinal sees a channel failure instead of the flag. With a stop
    /// pending that failure is the stopped outcome, not an error.
    fn rendezvous_failure(&self, err: PhyloError) -> Result<Flow, PhyloError> {
        if self.stop.is_stopped() && matches!(err, PhyloError::Channel(_)) {
            return Ok(Flow::Stopped);
        }
        Err(err)
    }

    /// One dispatch-and-evaluate iteration. Returns `false` when a
    /// cooperative stop was requested before the move ran.
    fn step_once(&mut self) -> Result<bool, PhyloError> {
        if self.stop.is_stopped() {
            return Ok(false);
        }
        let mut weights = self.config.proposal_weights.as_array();
        weights[4] = if self.tree.subst_param_count() == 0 {
            0
        } else {
            weights[4]
        };
        weights[5] = self.ext.param_change_weight();
        // The substitution weight can be the only positive core weight, so
        // zeroing it for a parameterless model may leave nothing to draw.
        if weights.iter().all(|&w| w == 0) {
            return Err(PhyloError::Config(
                ErrorInfo::new("no-enabled-move", "every enabled proposal weight is zero")
                    .with_hint(
                        "a model without free substitution parameters needs a positive \
                         weight on another move type",
                    ),
            ));
        }
        let kind = MoveKind::from_index(weighted_choose_u32(&weights, &mut self.rng));
        match kind {
            MoveKind::Alignment => sample_alignment(
                &mut self.chain,
                self.tree,
                self.ext,
                &self.tuning,
                &mut self.rng,
            )?,
            MoveKind::Topology => {
                sample_topology(&mut self.chain, self.tree, self.ext, &mut self.rng)?
            }
            MoveKind::EdgeLength => sample_edge(
                &mut self.chain,
                self.tree,
                self.ext,
                self.tuning.edge_span,
                &self.config.tuning,
                &mut self.rng,
            )?,
            MoveKind::IndelParam => sample_indel_param(
                &mut self.chain,
                self.tree,
                self.ext,
                &self.tuning,
                &mut self.rng,
            )?,
            MoveKind::SubstParam => {
                sample_subst_param(&mut self.chain, self.tree, self.ext, &mut self.rng)?
            }
            MoveKind::ModExtParam => {
                sample_mod_ext_param(&mut self.chain, self.tree, self.ext, &mut self.rng)?
            }
        }
        if cfg!(debug_assertions) {
            self.check_consistency(kind)?;
        }
        self.reporter.new_step(&McmcStep {
            new_log_like: self.chain.total_log_like,
            burn_in: self.chain.burn_in,
        });
        Ok(true)
    }

    /// Every move must leave the cached total in agreement with a fresh
    /// recomputation; divergence means a broken rollback or a stale cache.
    fn check_consistency(&self, kind: MoveKind) -> Result<(), PhyloError> {
        let recomputed = self.ext.total_log_like(&*self.tree);
        if (recomputed - self.chain.total_log_like).abs() > CONSISTENCY_TOL {
            return Err(PhyloError::Consistency(
                ErrorInfo::new(
                    "loglike-divergence",
                    "cached total log-likelihood diverged from recomputation",
                )
                .with_context("move", kind.as_str().to_string())
                .with_context("cached", self.chain.total_log_like.to_string())
                .with_context("recomputed", recomputed.to_string()),
            ));
        }
        Ok(())
    }

    /// Counts down to the next swap attempt of a tempered run; a no-op on
    /// single-chain runs.
    fn maybe_swap(&mut self) -> Result<(), PhyloError> {
        if self.parallel.is_none() {
            return Ok(());
        }
        self.swap_countdown -= 1;
        if self.swap_countdown > 0 {
            return Ok(());
        }
        self.swap_countdown = self.config.swap_rate;
        let log_prior = self.ext.total_log_prior(&*self.tree);
        if let Some(ctx) = &mut self.parallel {
            ctx.attempt_swap(&mut self.chain, log_prior)?;
        }
        Ok(())
    }

    /// Delivers one sample. In a tempered run the cold chain's snapshot is
    /// first routed to the coordinator; reporter failures are logged and
    /// swallowed so a dead sink never aborts the chain.
    fn report_sample(&mut self, index: usize, planned: usize) -> Result<(), PhyloError> {
        let snapshot = match &mut self.parallel {
            Some(ctx) => {
                let own = (self.chain.heat == 1.0).then(|| self.tree.snapshot());
                ctx.resolve_cold_sample(own)?
            }
            None => Some(self.tree.snapshot()),
        };
        if let Some(snapshot) = snapshot {
            if let Err(err) = self.reporter.new_sample(&snapshot, index, planned) {
                eprintln!("sample {index} could not be reported: {err}");
            }
            // The snapshot may have arrived from another chain, in which
            // case the local tree is not the one being reported.
            let local_is_cold = self.parallel.is_none() || self.chain.heat == 1.0;
            let tree = if local_is_cold {
                self.tree.printed_tree()
            } else {
                String::new()
            };
            let indel = snapshot.indel_params;
            let line = format!(
                "{}\nReport\tLogLikelihood\t{}\tR\t{}\tLambda\t{}\tMu\t{}\t{}",
                self.chain.counters.info_string(),
                snapshot.log_like,
                indel[0],
                indel[1],
                indel[2],
                tree,
            );
            if let Err(err) = self.reporter.log_line(&line) {
                eprintln!("run log line for sample {index} was lost: {err}");
            }
        }
        Ok(())
    }
}
