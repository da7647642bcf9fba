#![allow(dead_code)]

//! Shared fixtures: an in-memory tree collaborator with an exact
//! closed-form likelihood, plus test doubles for the extension, automation
//! and reporting seams.

use std::io;
use std::sync::{Arc, Mutex};

use phylo_core::{
    Automation, McmcStep, ModelExtension, PhyloError, Reporter, RngHandle, StateSnapshot,
    TreeState,
};
use phylo_core::errors::ErrorInfo;
use phylo_mcmc::RunConfig;

/// Four-leaf fixture tree: leaves 0..=3, internal node 4 over leaves 0 and
/// 1, internal node 5 over leaves 2 and 3, root 6 over nodes 4 and 5.
///
/// The likelihood is a cheap closed-form function of the complete mutable
/// state (structure, branch lengths, parameters and the alignment code), so
/// the engine's cached-total consistency check holds exactly and a restored
/// state recomputes to the restored total.
pub struct MockTree {
    names: Vec<String>,
    left: Vec<i32>,
    right: Vec<i32>,
    parent: Vec<i32>,
    edge_lengths: Vec<f64>,
    indel: [f64; 3],
    subst: Vec<f64>,
    align_code: i32,
    saved_align_code: i32,
    saved_subst: Vec<f64>,
}

impl MockTree {
    pub fn four_leaf() -> Self {
        Self {
            names: ["A", "B", "C", "D", "AB", "CD", "root"]
                .into_iter()
                .map(String::from)
                .collect(),
            left: vec![-1, -1, -1, -1, 0, 2, 4],
            right: vec![-1, -1, -1, -1, 1, 3, 5],
            parent: vec![4, 4, 5, 5, 6, 6, -1],
            edge_lengths: vec![0.1, 0.2, 0.15, 0.25, 0.3, 0.2, 0.0],
            indel: [0.5, 0.02, 0.03],
            subst: vec![1.0, 2.0],
            align_code: 0,
            saved_align_code: 0,
            saved_subst: Vec::new(),
        }
    }

    /// Same tree under a substitution model with no free parameters.
    pub fn without_subst_params() -> Self {
        let mut tree = Self::four_leaf();
        tree.subst = Vec::new();
        tree
    }

    fn exchange(&mut self, a: usize, b: usize) {
        let parent_a = self.parent[a] as usize;
        let parent_b = self.parent[b] as usize;
        let (a32, b32) = (a as i32, b as i32);
        if self.left[parent_a] == a32 {
            self.left[parent_a] = b32;
        } else {
            self.right[parent_a] = b32;
        }
        if self.left[parent_b] == b32 {
            self.left[parent_b] = a32;
        } else {
            self.right[parent_b] = a32;
        }
        self.parent[a] = parent_b as i32;
        self.parent[b] = parent_a as i32;
    }
}

impl TreeState for MockTree {
    fn node_count(&self) -> usize {
        self.names.len()
    }

    fn root(&self) -> usize {
        self.parent.iter().position(|&p| p < 0).unwrap()
    }

    fn total_log_like(&self) -> f64 {
        let mut total = -10.0;
        for (index, &length) in self.edge_lengths.iter().enumerate() {
            total -= length * (index as f64 + 1.0);
        }
        for (index, &parent) in self.parent.iter().enumerate() {
            total -= 0.01 * (index as f64 + 1.0) * f64::from(parent + 1);
        }
        total -= 3.0 * self.indel[0] + 5.0 * self.indel[1] + 2.0 * self.indel[2];
        for (index, &param) in self.subst.iter().enumerate() {
            total -= param * (index as f64 + 2.0);
        }
        total - 0.01 * f64::from(self.align_code)
    }

    fn total_log_prior(&self) -> f64 {
        -1.0 - 0.1 * self.edge_lengths.iter().sum::<f64>()
    }

    fn leaf_count(&self, node: usize) -> usize {
        if self.left[node] < 0 {
            1
        } else {
            self.leaf_count(self.left[node] as usize) + self.leaf_count(self.right[node] as usize)
        }
    }

    fn root_attachment_rank(&self, node: usize) -> Option<usize> {
        let root = self.root();
        if node == root {
            Some(0)
        } else if node == self.left[root] as usize {
            Some(1)
        } else if node == self.right[root] as usize {
            Some(2)
        } else {
            None
        }
    }

    fn edge_length(&self, node: usize) -> f64 {
        self.edge_lengths[node]
    }

    fn indel_params(&self) -> [f64; 3] {
        self.indel
    }

    fn subst_params(&self) -> Vec<f64> {
        self.subst.clone()
    }

    fn subst_param_count(&self) -> usize {
        self.subst.len()
    }

    fn subst_log_prior(&self) -> f64 {
        -0.5 * self.subst.iter().map(|p| p * p).sum::<f64>()
    }

    fn printed_tree(&self) -> String {
        fn render(tree: &MockTree, node: usize) -> String {
            if tree.left[node] < 0 {
                format!("{}:{}", tree.names[node], tree.edge_lengths[node])
            } else {
                format!(
                    "({},{}):{}",
                    render(tree, tree.left[node] as usize),
                    render(tree, tree.right[node] as usize),
                    tree.edge_lengths[node],
                )
            }
        }
        format!("{};", render(self, self.root()))
    }

    fn leaf_alignment(&self) -> Vec<String> {
        (0..self.node_count())
            .filter(|&node| self.left[node] < 0)
            .map(|node| format!("{}:{}", self.names[node], self.align_code))
            .collect()
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            names: self.names.clone(),
            left: self.left.clone(),
            right: self.right.clone(),
            parent: self.parent.clone(),
            edge_lengths: self.edge_lengths.clone(),
            sequences: self.names.clone(),
            alignment: vec![vec![self.align_code]],
            likelihood_table: vec![vec![vec![self.total_log_like()]]],
            indel_params: self.indel,
            subst_params: self.subst.clone(),
            log_like: self.total_log_like(),
            root: self.root(),
        }
    }

    fn mark_subtree(&mut self, _root: usize, _level_probs: &[f64], _rng: &mut RngHandle) {}

    fn resample_marked_alignment(
        &mut self,
        _root: usize,
        _window_multiplier: f64,
        rng: &mut RngHandle,
    ) -> f64 {
        self.saved_align_code = self.align_code;
        self.align_code = rng.next_index(100) as i32;
        0.0
    }

    fn restore_alignment(&mut self, _root: usize) {
        self.align_code = self.saved_align_code;
    }

    fn uncle_of(&self, nephew: usize) -> usize {
        let parent = self.parent[nephew] as usize;
        let grand = self.parent[parent] as usize;
        let left = self.left[grand] as usize;
        if left == parent {
            self.right[grand] as usize
        } else {
            left
        }
    }

    fn swap_with_uncle(&mut self, nephew: usize, _rng: &mut RngHandle) -> f64 {
        let uncle = self.uncle_of(nephew);
        self.exchange(nephew, uncle);
        0.0
    }

    fn swap_back_uncle(&mut self, uncle: usize, _rng: &mut RngHandle) {
        let nephew = self.uncle_of(uncle);
        self.exchange(uncle, nephew);
    }

    fn check_structure(&self) -> Result<(), PhyloError> {
        for node in 0..self.node_count() {
            for child in [self.left[node], self.right[node]] {
                if child >= 0 && self.parent[child as usize] != node as i32 {
                    return Err(PhyloError::Consistency(
                        ErrorInfo::new("bad-backref", "child does not point back to parent")
                            .with_context("parent", node.to_string())
                            .with_context("child", child.to_string()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn set_edge_length(&mut self, node: usize, length: f64) {
        self.edge_lengths[node] = length;
    }

    fn recompute_edge_path(&mut self, _node: usize) {}

    fn set_indel_param(&mut self, index: usize, value: f64) {
        self.indel[index] = value;
    }

    fn refresh_indel_models(&mut self) {}

    fn sample_subst_param(&mut self, rng: &mut RngHandle) -> f64 {
        if self.subst.is_empty() {
            panic!("substitution sampler invoked with no free parameters");
        }
        self.saved_subst = self.subst.clone();
        self.subst[0] += rng.next_f64() * 0.1 - 0.05;
        0.0
    }

    fn restore_subst_param(&mut self) {
        self.subst = self.saved_subst.clone();
    }

    fn refresh_subst_models(&mut self) {}
}

/// Extension relying entirely on the trait defaults.
pub struct NoopExtension;

impl ModelExtension for NoopExtension {}

/// Extension that makes every proposed state catastrophically worse, so
/// every move of every type is rejected.
pub struct RejectingExtension;

impl ModelExtension for RejectingExtension {
    fn log_like_align_change(&self, tree: &dyn TreeState, _root: usize) -> f64 {
        tree.total_log_like() - 1.0e6
    }

    fn log_like_tree_change(&self, tree: &dyn TreeState, _nephew: usize) -> f64 {
        tree.total_log_like() - 1.0e6
    }

    fn log_like_edge_len_change(&self, tree: &dyn TreeState, _node: usize) -> f64 {
        tree.total_log_like() - 1.0e6
    }

    fn log_like_indel_param_change(&self, tree: &dyn TreeState, _index: usize) -> f64 {
        tree.total_log_like() - 1.0e6
    }

    fn log_like_subst_param_change(&self, tree: &dyn TreeState) -> f64 {
        tree.total_log_like() - 1.0e6
    }
}

/// Automation double with simple, fully deterministic verdicts.
pub struct FixedAutomation;

impl Automation for FixedAutomation {
    fn should_stop_burn_in(&self, log_likes: &[f64]) -> bool {
        log_likes.len() >= 4
    }

    fn sampling_rate_from_space(&self, _alignments: &[Vec<String>], probe_rate: usize) -> usize {
        probe_rate
    }

    fn consensus_similarity(&self, _alignments: &[Vec<String>]) -> f64 {
        1.0
    }

    fn should_stop_sampling(&self, similarities: &[f64]) -> bool {
        similarities.last().copied().unwrap_or(0.0) > 0.9
    }
}

/// Reporter that records everything it is handed, behind `Arc` so the
/// recording survives the move into a tempered run.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub steps: Arc<Mutex<usize>>,
    pub burn_in_steps: Arc<Mutex<usize>>,
    pub samples: Arc<Mutex<Vec<(usize, usize, f64)>>>,
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl Reporter for RecordingReporter {
    fn new_step(&mut self, step: &McmcStep) {
        *self.steps.lock().unwrap() += 1;
        if step.burn_in {
            *self.burn_in_steps.lock().unwrap() += 1;
        }
    }

    fn new_sample(
        &mut self,
        state: &StateSnapshot,
        index: usize,
        total: usize,
    ) -> io::Result<()> {
        self.samples.lock().unwrap().push((index, total, state.log_like));
        Ok(())
    }

    fn log_line(&mut self, line: &str) -> io::Result<()> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

/// Short run configuration shared by the kernel tests.
pub fn small_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.burn_in = 50;
    config.cycles = 100;
    config.sample_rate = 10;
    config.swap_rate = 5;
    config.seed = 7;
    config.swap_seed = 11;
    config
}
