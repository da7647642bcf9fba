use std::path::Path;

use phylo_core::errors::ErrorInfo;
use phylo_core::PhyloError;
use serde::{Deserialize, Serialize};

/// YAML-configurable parameters governing one MCMC run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of burn-in steps (ignored when burn-in automation is on).
    #[serde(default = "default_burn_in")]
    pub burn_in: usize,
    /// Total number of post-burn-in steps.
    #[serde(default = "default_cycles")]
    pub cycles: usize,
    /// Number of steps between samples.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: usize,
    /// Number of steps between chain swap proposals (parallel runs only).
    #[serde(default = "default_swap_rate")]
    pub swap_rate: usize,
    /// Master seed for the per-chain move streams.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Independent seed for the swap stream shared by all chains.
    #[serde(default = "default_swap_seed")]
    pub swap_seed: u64,
    /// Relative weights for selecting among the six move types.
    #[serde(default)]
    pub proposal_weights: ProposalWeights,
    /// Which automation heuristics to consult.
    #[serde(default)]
    pub automation: AutomationFlags,
    /// Adaptive tuning behaviour.
    #[serde(default)]
    pub tuning: TuningConfig,
    /// Sampling-rate calibration window settings.
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

fn default_burn_in() -> usize {
    10_000
}

fn default_cycles() -> usize {
    100_000
}

fn default_sample_rate() -> usize {
    100
}

fn default_swap_rate() -> usize {
    100
}

fn default_seed() -> u64 {
    1
}

fn default_swap_seed() -> u64 {
    1
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            burn_in: default_burn_in(),
            cycles: default_cycles(),
            sample_rate: default_sample_rate(),
            swap_rate: default_swap_rate(),
            seed: default_seed(),
            swap_seed: default_swap_seed(),
            proposal_weights: ProposalWeights::default(),
            automation: AutomationFlags::default(),
            tuning: TuningConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parses a configuration from a YAML document.
    pub fn from_yaml_str(source: &str) -> Result<Self, PhyloError> {
        let config: Self = serde_yaml::from_str(source).map_err(|err| {
            PhyloError::Serde(ErrorInfo::new("config-parse", err.to_string()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a YAML file.
    pub fn load_yaml(path: &Path) -> Result<Self, PhyloError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Checks the configuration for values the sampler cannot run with.
    pub fn validate(&self) -> Result<(), PhyloError> {
        let weights = &self.proposal_weights;
        let fixed_total = weights.alignment
            + weights.topology
            + weights.edge_length
            + weights.indel_param
            + weights.subst_param;
        if fixed_total == 0 {
            return Err(PhyloError::Config(
                ErrorInfo::new(
                    "zero-weights",
                    "all non-extension proposal weights are zero",
                )
                .with_hint("at least one of the five core move weights must be positive"),
            ));
        }
        if self.sample_rate == 0 {
            return Err(PhyloError::Config(ErrorInfo::new(
                "zero-sample-rate",
                "sample_rate must be positive",
            )));
        }
        if self.swap_rate == 0 {
            return Err(PhyloError::Config(ErrorInfo::new(
                "zero-swap-rate",
                "swap_rate must be positive",
            )));
        }
        self.tuning.validate()?;
        self.calibration.validate()?;
        Ok(())
    }
}

/// Relative weights used for the weighted random move selection.
///
/// The extension weight is a starting value only; it is refreshed from the
/// model-extension collaborator immediately before every dispatch. A zero
/// weight permanently disables a move type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalWeights {
    /// Alignment resampling move.
    #[serde(default = "default_alignment_weight")]
    pub alignment: u32,
    /// Subtree/uncle topology swap.
    #[serde(default = "default_topology_weight")]
    pub topology: u32,
    /// Branch length move.
    #[serde(default = "default_edge_weight")]
    pub edge_length: u32,
    /// Indel parameter move (R, lambda or mu).
    #[serde(default = "default_indel_weight")]
    pub indel_param: u32,
    /// Substitution model parameter move.
    #[serde(default = "default_subst_weight")]
    pub subst_param: u32,
    /// Model-extension parameter move.
    #[serde(default)]
    pub mod_ext_param: u32,
}

fn default_alignment_weight() -> u32 {
    35
}

fn default_topology_weight() -> u32 {
    20
}

fn default_edge_weight() -> u32 {
    15
}

fn default_indel_weight() -> u32 {
    15
}

fn default_subst_weight() -> u32 {
    10
}

impl Default for ProposalWeights {
    fn default() -> Self {
        Self {
            alignment: default_alignment_weight(),
            topology: default_topology_weight(),
            edge_length: default_edge_weight(),
            indel_param: default_indel_weight(),
            subst_param: default_subst_weight(),
            mod_ext_param: 0,
        }
    }
}

impl ProposalWeights {
    /// Returns the weights in dispatch order: alignment, topology, edge,
    /// indel, substitution, extension.
    pub fn as_array(&self) -> [u32; 6] {
        [
            self.alignment,
            self.topology,
            self.edge_length,
            self.indel_param,
            self.subst_param,
            self.mod_ext_param,
        ]
    }
}

/// Enable flags for the run-length automation heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationFlags {
    /// Determine the burn-in length from the log-likelihood trace.
    #[serde(default)]
    pub burn_in: bool,
    /// Determine the sampling interval from a post-burn-in calibration window.
    #[serde(default)]
    pub sampling_rate: bool,
    /// Leave the sample count open-ended and stop on consensus convergence.
    #[serde(default)]
    pub sample_count: bool,
    /// Adaptively rescale proposal spans during burn-in.
    #[serde(default = "default_true")]
    pub proposal_spans: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AutomationFlags {
    fn default() -> Self {
        Self {
            burn_in: false,
            sampling_rate: false,
            sample_count: false,
            proposal_spans: true,
        }
    }
}

/// Parameters of the burn-in proposal-span tuner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Lower edge of the target acceptance band.
    #[serde(default = "default_min_acceptance")]
    pub min_acceptance: f64,
    /// Upper edge of the target acceptance band.
    #[serde(default = "default_max_acceptance")]
    pub max_acceptance: f64,
    /// Minimum attempts before an acceptance rate is trusted.
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,
    /// Multiplier applied to spans on under-acceptance; spans are divided
    /// by it on over-acceptance, so a value below one widens over-accepting
    /// proposals.
    #[serde(default = "default_span_multiplier")]
    pub span_multiplier: f64,
    /// Factor the alignment window multiplier is divided by on
    /// over-acceptance and multiplied by on under-acceptance.
    #[serde(default = "default_window_change_factor")]
    pub window_change_factor: f64,
    /// Lower clamp for the alignment window multiplier.
    #[serde(default = "default_min_window_multiplier")]
    pub min_window_multiplier: f64,
    /// Upper clamp for the alignment window multiplier.
    #[serde(default = "default_max_window_multiplier")]
    pub max_window_multiplier: f64,
    /// Smallest branch length the edge move may propose.
    #[serde(default = "default_min_edge_length")]
    pub min_edge_length: f64,
}

fn default_min_acceptance() -> f64 {
    0.2
}

fn default_max_acceptance() -> f64 {
    0.4
}

fn default_min_samples() -> u64 {
    100
}

fn default_span_multiplier() -> f64 {
    0.7
}

fn default_window_change_factor() -> f64 {
    2.0
}

fn default_min_window_multiplier() -> f64 {
    0.25
}

fn default_max_window_multiplier() -> f64 {
    4.0
}

fn default_min_edge_length() -> f64 {
    0.01
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            min_acceptance: default_min_acceptance(),
            max_acceptance: default_max_acceptance(),
            min_samples: default_min_samples(),
            span_multiplier: default_span_multiplier(),
            window_change_factor: default_window_change_factor(),
            min_window_multiplier: default_min_window_multiplier(),
            max_window_multiplier: default_max_window_multiplier(),
            min_edge_length: default_min_edge_length(),
        }
    }
}

impl TuningConfig {
    fn validate(&self) -> Result<(), PhyloError> {
        if !(0.0..=1.0).contains(&self.min_acceptance)
            || !(0.0..=1.0).contains(&self.max_acceptance)
            || self.min_acceptance >= self.max_acceptance
        {
            return Err(PhyloError::Config(
                ErrorInfo::new("bad-acceptance-band", "acceptance band must satisfy 0 <= min < max <= 1")
                    .with_context("min", self.min_acceptance.to_string())
                    .with_context("max", self.max_acceptance.to_string()),
            ));
        }
        if !(self.span_multiplier > 0.0 && self.span_multiplier < 1.0) {
            return Err(PhyloError::Config(
                ErrorInfo::new("bad-span-multiplier", "span_multiplier must lie in (0, 1)")
                    .with_context("value", self.span_multiplier.to_string()),
            ));
        }
        if self.window_change_factor <= 1.0 {
            return Err(PhyloError::Config(ErrorInfo::new(
                "bad-window-factor",
                "window_change_factor must exceed 1",
            )));
        }
        if self.min_window_multiplier <= 0.0
            || self.min_window_multiplier >= self.max_window_multiplier
        {
            return Err(PhyloError::Config(ErrorInfo::new(
                "bad-window-bounds",
                "window multiplier bounds must satisfy 0 < min < max",
            )));
        }
        if self.min_edge_length <= 0.0 {
            return Err(PhyloError::Config(ErrorInfo::new(
                "bad-min-edge",
                "min_edge_length must be positive",
            )));
        }
        Ok(())
    }
}

/// Settings for the sampling-rate calibration window that runs after
/// burn-in when sampling-rate automation is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Steps between alignment snapshots taken for the distance heuristic.
    #[serde(default = "default_probe_rate")]
    pub probe_rate: usize,
    /// Length of the calibration window, in steps.
    #[serde(default = "default_calibration_window")]
    pub window: usize,
}

fn default_probe_rate() -> usize {
    100
}

fn default_calibration_window() -> usize {
    25_000
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            probe_rate: default_probe_rate(),
            window: default_calibration_window(),
        }
    }
}

impl CalibrationConfig {
    fn validate(&self) -> Result<(), PhyloError> {
        if self.probe_rate == 0 {
            return Err(PhyloError::Config(ErrorInfo::new(
                "zero-probe-rate",
                "calibration probe_rate must be positive",
            )));
        }
        if self.window == 0 {
            return Err(PhyloError::Config(ErrorInfo::new(
                "zero-calibration-window",
                "calibration window must be positive",
            )));
        }
        Ok(())
    }
}
