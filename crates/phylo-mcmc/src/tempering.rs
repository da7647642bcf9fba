use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use phylo_core::errors::ErrorInfo;
use phylo_core::{
    Automation, ModelExtension, PhyloError, Reporter, RngHandle, StateSnapshot, TreeState,
};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::determinism;
use crate::kernel::{self, ChainState, RunSummary, StopHandle};

/// State summary two peers exchange during a swap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwapMessage {
    /// Sender's cached total log-likelihood.
    pub log_like: f64,
    /// Sender's total log-prior.
    pub log_prior: f64,
    /// Sender's current heat.
    pub heat: f64,
}

/// Symmetric acceptance statistic for a heat swap between two chains.
///
/// Both peers evaluate this with their roles flipped and obtain the same
/// value, so a shared random draw lets them reach the same decision
/// without further communication.
pub fn swap_statistic(mine: &SwapMessage, theirs: &SwapMessage) -> f64 {
    let my_mass = mine.log_like + mine.log_prior;
    let their_mass = theirs.log_like + theirs.log_prior;
    mine.heat * their_mass + theirs.heat * my_mass
        - theirs.heat * their_mass
        - mine.heat * my_mass
}

/// Swap decision for a shared uniform draw `u`.
pub fn swap_decision(mine: &SwapMessage, theirs: &SwapMessage, u: f64) -> bool {
    swap_statistic(mine, theirs) > u.ln()
}

/// Blocking bidirectional exchange with one peer chain.
///
/// `exchange` is a rendezvous: it completes only once both sides have sent
/// and received, and a swap is never fire-and-forget.
pub trait PeerLink: Send {
    /// Sends `msg` to the peer and blocks until the peer's message arrives.
    fn exchange(&mut self, msg: &SwapMessage) -> Result<SwapMessage, PhyloError>;
}

/// In-process peer link over a pair of mpsc channels.
pub struct DuplexLink {
    tx: Sender<SwapMessage>,
    rx: Receiver<SwapMessage>,
}

impl DuplexLink {
    /// Creates both endpoints of a duplex link.
    pub fn pair() -> (Self, Self) {
        let (tx_ab, rx_ab) = channel();
        let (tx_ba, rx_ba) = channel();
        (
            Self {
                tx: tx_ab,
                rx: rx_ba,
            },
            Self {
                tx: tx_ba,
                rx: rx_ab,
            },
        )
    }
}

impl PeerLink for DuplexLink {
    fn exchange(&mut self, msg: &SwapMessage) -> Result<SwapMessage, PhyloError> {
        self.tx.send(*msg).map_err(|_| {
            PhyloError::Channel(ErrorInfo::new("peer-gone", "swap peer hung up before send"))
        })?;
        self.rx.recv().map_err(|_| {
            PhyloError::Channel(ErrorInfo::new("peer-gone", "swap peer hung up before reply"))
        })
    }
}

/// Per-sample message from a worker chain to the coordinator.
pub(crate) enum ColdReport {
    /// The sender holds the cold chain; here is its full state.
    State(Box<StateSnapshot>),
    /// The sender is not the cold chain.
    NotCold,
}

pub(crate) enum SampleRole {
    /// Rank 0: collects one report per worker at each sample.
    Coordinator(Vec<Receiver<ColdReport>>),
    /// Any other rank: reports to the coordinator at each sample.
    Worker(Sender<ColdReport>),
}

/// Cross-chain plumbing handed to the kernel for one chain of a tempered
/// run.
pub(crate) struct ParallelCtx {
    pub(crate) rank: usize,
    chains: usize,
    links: BTreeMap<usize, Box<dyn PeerLink>>,
    swap_rng: RngHandle,
    role: SampleRole,
}

impl ParallelCtx {
    pub(crate) fn new(
        rank: usize,
        chains: usize,
        links: BTreeMap<usize, Box<dyn PeerLink>>,
        swap_seed: u64,
        role: SampleRole,
    ) -> Self {
        Self {
            rank,
            chains,
            links,
            swap_rng: RngHandle::from_seed(determinism::swap_stream_seed(swap_seed)),
            role,
        }
    }

    /// Runs one swap attempt of the global swap schedule.
    ///
    /// Every chain draws the same peer pair and decision draw from its own
    /// copy of the swap stream; the two selected peers then exchange
    /// summaries and independently reach the same verdict. Only heats move
    /// between chains, never states.
    pub(crate) fn attempt_swap(
        &mut self,
        chain: &mut ChainState,
        log_prior: f64,
    ) -> Result<(), PhyloError> {
        let peer_a = self.swap_rng.next_index(self.chains);
        let mut peer_b = peer_a;
        while peer_b == peer_a {
            peer_b = self.swap_rng.next_index(self.chains);
        }
        let shared_u = self.swap_rng.next_f64();

        if self.rank != peer_a && self.rank != peer_b {
            return Ok(());
        }
        let partner = if self.rank == peer_a { peer_b } else { peer_a };
        let mine = SwapMessage {
            log_like: chain.total_log_like,
            log_prior,
            heat: chain.heat,
        };
        let link = self.links.get_mut(&partner).ok_or_else(|| {
            PhyloError::Channel(
                ErrorInfo::new("missing-link", "no link to swap partner")
                    .with_context("rank", self.rank.to_string())
                    .with_context("partner", partner.to_string()),
            )
        })?;
        let theirs = link.exchange(&mine)?;
        if swap_decision(&mine, &theirs, shared_u) {
            chain.heat = theirs.heat;
        }
        Ok(())
    }

    /// Sample rendezvous: routes the cold chain's snapshot to the
    /// coordinator. Returns the snapshot to report on the coordinator,
    /// `None` on workers (and on the coordinator if no chain is cold).
    pub(crate) fn resolve_cold_sample(
        &mut self,
        own: Option<StateSnapshot>,
    ) -> Result<Option<StateSnapshot>, PhyloError> {
        match &mut self.role {
            SampleRole::Worker(tx) => {
                let report = match own {
                    Some(snapshot) => ColdReport::State(Box::new(snapshot)),
                    None => ColdReport::NotCold,
                };
                tx.send(report).map_err(|_| {
                    PhyloError::Channel(ErrorInfo::new(
                        "coordinator-gone",
                        "coordinator hung up before sample report",
                    ))
                })?;
                Ok(None)
            }
            SampleRole::Coordinator(receivers) => {
                let mut cold = own;
                for rx in receivers.iter() {
                    let report = rx.recv().map_err(|_| {
                        PhyloError::Channel(ErrorInfo::new(
                            "worker-gone",
                            "worker hung up before sample report",
                        ))
                    })?;
                    if let ColdReport::State(snapshot) = report {
                        cold = Some(*snapshot);
                    }
                }
                Ok(cold)
            }
        }
    }
}

/// One chain of a tempered run.
pub struct TemperedChain {
    /// The chain's exclusively owned tree/alignment state.
    pub tree: Box<dyn TreeState>,
    /// The chain's model extension stack.
    pub ext: Box<dyn ModelExtension>,
    /// Initial heat; exactly one chain must start at 1.0.
    pub heat: f64,
}

struct NullReporter;

impl Reporter for NullReporter {}

/// Runs one MCMC chain per OS thread with periodic temperature swaps.
///
/// Only the cold chain's samples reach the reporter, via the coordinator
/// on rank 0. Returns the per-chain summaries in rank order.
pub fn run_tempered(
    config: &RunConfig,
    chains: Vec<TemperedChain>,
    automation: &dyn Automation,
    mut reporter: Box<dyn Reporter>,
    stop: &StopHandle,
) -> Result<Vec<RunSummary>, PhyloError> {
    config.validate()?;
    if chains.len() < 2 {
        return Err(PhyloError::Config(ErrorInfo::new(
            "too-few-chains",
            "a tempered run needs at least two chains",
        )));
    }
    if config.automation.sampling_rate || config.automation.sample_count {
        return Err(PhyloError::Config(
            ErrorInfo::new(
                "per-chain-automation",
                "sampling-rate and sample-count automation are per-chain and would desynchronise swap rendezvous",
            )
            .with_hint("fix sample_rate and cycles for tempered runs"),
        ));
    }
    if !chains.iter().any(|chain| chain.heat == 1.0) {
        return Err(PhyloError::Config(ErrorInfo::new(
            "no-cold-chain",
            "one chain must start at heat 1.0",
        )));
    }
    if chains
        .iter()
        .any(|chain| !(chain.heat > 0.0 && chain.heat <= 1.0))
    {
        return Err(PhyloError::Config(ErrorInfo::new(
            "bad-heat",
            "chain heats must lie in (0, 1]",
        )));
    }

    let count = chains.len();
    let mut link_maps: Vec<BTreeMap<usize, Box<dyn PeerLink>>> =
        (0..count).map(|_| BTreeMap::new()).collect();
    for low in 0..count {
        for high in low + 1..count {
            let (a, b) = DuplexLink::pair();
            link_maps[low].insert(high, Box::new(a) as Box<dyn PeerLink>);
            link_maps[high].insert(low, Box::new(b) as Box<dyn PeerLink>);
        }
    }

    let mut sample_txs = Vec::new();
    let mut sample_rxs = Vec::new();
    for _ in 1..count {
        let (tx, rx) = channel();
        sample_txs.push(tx);
        sample_rxs.push(rx);
    }

    let mut roles = Vec::with_capacity(count);
    roles.push(SampleRole::Coordinator(sample_rxs));
    roles.extend(sample_txs.into_iter().map(SampleRole::Worker));

    let mut results: Vec<Option<Result<RunSummary, PhyloError>>> =
        (0..count).map(|_| None).collect();
    thread::scope(|scope| {
        let mut handles = Vec::new();
        let reporter_ref: &mut dyn Reporter = reporter.as_mut();
        let mut reporter_holder = Some(reporter_ref);
        for (rank, ((mut chain, links), role)) in chains
            .into_iter()
            .zip(link_maps.into_iter())
            .zip(roles.into_iter())
            .enumerate()
        {
            let ctx = ParallelCtx::new(rank, count, links, config.swap_seed, role);
            let stop = stop.clone();
            let coordinator_reporter = if rank == 0 {
                reporter_holder.take()
            } else {
                None
            };
            let handle = scope.spawn(move || {
                let mut null = NullReporter;
                let reporter: &mut dyn Reporter = match coordinator_reporter {
                    Some(actual) => actual,
                    None => &mut null,
                };
                kernel::run_chain(
                    config,
                    chain.tree.as_mut(),
                    chain.ext.as_mut(),
                    automation,
                    reporter,
                    stop,
                    chain.heat,
                    rank,
                    Some(ctx),
                )
            });
            handles.push(handle);
        }
        for (rank, handle) in handles.into_iter().enumerate() {
            results[rank] = Some(handle.join().unwrap_or_else(|_| {
                Err(PhyloError::Channel(ErrorInfo::new(
                    "chain-panic",
                    "chain thread panicked",
                )))
            }));
        }
    });

    results
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| {
            Err(PhyloError::Channel(ErrorInfo::new(
                "chain-lost",
                "chain thread produced no result",
            )))
        }))
        .collect()
}
