use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attempt/acceptance pair for one move type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptCounter {
    /// Number of times the move was attempted.
    pub attempted: u64,
    /// Number of accepted proposals.
    pub accepted: u64,
}

impl AcceptCounter {
    /// Records an attempt.
    pub fn attempt(&mut self) {
        self.attempted += 1;
    }

    /// Records an acceptance.
    pub fn accept(&mut self) {
        self.accepted += 1;
    }

    /// Empirical acceptance rate; zero when nothing was attempted.
    pub fn rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }

    /// Clears both counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-move-type acceptance counters for one chain.
///
/// The three indel parameters are tracked separately because the tuner
/// adjusts their spans independently. All counters reset at the
/// burn-in/sampling boundary; the tuner additionally resets the counter of
/// any move whose span it just adjusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCounters {
    /// Alignment resampling move.
    pub alignment: AcceptCounter,
    /// Topology swap move.
    pub topology: AcceptCounter,
    /// Branch length move.
    pub edge: AcceptCounter,
    /// Indel parameter R.
    pub r: AcceptCounter,
    /// Insertion rate lambda.
    pub lambda: AcceptCounter,
    /// Deletion rate mu.
    pub mu: AcceptCounter,
    /// Substitution model parameter move.
    pub substitution: AcceptCounter,
    /// Model-extension parameter move.
    pub extension: AcceptCounter,
}

impl MoveCounters {
    /// Clears every counter.
    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Acceptance rates keyed by move name, in stable order.
    pub fn acceptance_rates(&self) -> BTreeMap<String, f64> {
        [
            ("alignment", self.alignment),
            ("topology", self.topology),
            ("edge-length", self.edge),
            ("indel-r", self.r),
            ("indel-lambda", self.lambda),
            ("indel-mu", self.mu),
            ("subst-param", self.substitution),
            ("modext-param", self.extension),
        ]
        .into_iter()
        .map(|(name, counter)| (name.to_string(), counter.rate()))
        .collect()
    }

    /// Human readable acceptance summary for the run log.
    pub fn info_string(&self) -> String {
        format!(
            "Acceptances: [Alignment: {:.6}, Edge: {:.6}, Topology: {:.6}, R: {:.6}, lambda: {:.6}, mu: {:.6}, Substitution: {:.6}]",
            self.alignment.rate(),
            self.edge.rate(),
            self.topology.rate(),
            self.r.rate(),
            self.lambda.rate(),
            self.mu.rate(),
            self.substitution.rate(),
        )
    }
}
