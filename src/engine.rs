//! Per-thread training/inference state (spec §3 `EngineState`, §4.7
//! update drivers, §4.9 prediction).
//!
//! One `EngineState` is constructed per worker thread and holds shared
//! references to the parameter matrices plus exclusively-owned scratch.
//! Forward/loss/gradient composition happens here; the individual
//! kernels live in `attention`, `loss`, `huffman`, and `negative`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::args::{Args, ModelKind};
use crate::attention::{compute_attn_gradient, compute_attn_hidden, compute_attn_hidden2, AttnInput};
use crate::error::EngineError;
use crate::huffman::{Child, HuffmanTree};
use crate::loss::{self, LossKind};
use crate::matrix::Matrix;
use crate::negative::{NegativeCursor, NegativeTable};
use crate::rng::Rng;
use crate::tables::MathTables;
use crate::vector::Vector;

/// Shared, cross-engine parameter set (spec §5: "all sharing the same
/// parameter matrices by reference"). Cloned cheaply (`Arc`) into every
/// worker's `EngineState`.
pub struct SharedParams {
    pub wi: Arc<Matrix>,
    pub wo: Arc<Matrix>,
    pub attn: Arc<Matrix>,
    pub bias: Arc<Matrix>,
    pub tables: Arc<MathTables>,
}

pub struct EngineState {
    params: SharedParams,
    args: Args,
    loss_kind: LossKind,
    window: i32,

    tree: Option<Arc<HuffmanTree>>,
    neg_table: Option<Arc<NegativeTable>>,
    neg_cursor: NegativeCursor,
    counts_set: bool,

    rng: Rng,

    hidden: Vector,
    output: Vector,
    grad: Vector,
    softmaxattn: Vec<f32>,

    loss_sum: f64,
    nexamples: u64,
}

impl EngineState {
    /// `new(wi, wo, attn, bias, args, seed)` (spec §6). `window` is the
    /// half-width of the position window attention logits are bucketed
    /// over; bucket `p` maps to column `p + window`.
    pub fn new(params: SharedParams, args: Args, window: i32, seed: u64) -> Result<Self, EngineError> {
        let loss_kind = args.validate()?;
        let dim = args.dim;
        let osz = params.wo.rows();

        debug!(dim, osz, ?loss_kind, "constructing engine state");

        Ok(Self {
            params,
            args,
            loss_kind,
            window,
            tree: None,
            neg_table: None,
            neg_cursor: NegativeCursor::new(),
            counts_set: false,
            rng: Rng::new(seed),
            hidden: Vector::new(dim),
            output: Vector::new(osz),
            grad: Vector::new(dim),
            softmaxattn: Vec::new(),
            loss_sum: 0.0,
            nexamples: 0,
        })
    }

    /// `setTargetCounts(counts)` (spec §6): one-shot, populates the
    /// Huffman tree and/or negative table as the configured loss needs.
    pub fn set_target_counts(&mut self, counts: &[u64]) -> Result<(), EngineError> {
        if self.counts_set {
            return Err(EngineError::TargetCountsAlreadySet);
        }
        if counts.is_empty() {
            return Err(EngineError::EmptyTargetCounts);
        }

        match self.loss_kind {
            LossKind::HierarchicalSoftmax => {
                debug!(classes = counts.len(), "building huffman tree");
                self.tree = Some(Arc::new(HuffmanTree::build(counts)));
            }
            LossKind::NegativeSampling { .. } => {
                debug!(classes = counts.len(), "building negative table");
                self.neg_table = Some(Arc::new(NegativeTable::build(counts, &mut self.rng)));
            }
            LossKind::Softmax => {}
        }
        self.counts_set = true;
        Ok(())
    }

    fn position_bucket(&self, p: i32) -> usize {
        (p + self.window) as usize
    }

    fn run_loss(&mut self, target: usize, lr: f32) -> f32 {
        match self.loss_kind {
            LossKind::NegativeSampling { neg } => {
                let table = self
                    .neg_table
                    .as_ref()
                    .expect("set_target_counts must precede update under negative sampling");
                loss::negative_sampling(
                    &self.params.wo,
                    &self.params.tables,
                    table,
                    &mut self.neg_cursor,
                    &self.hidden,
                    &mut self.grad,
                    target,
                    neg,
                    lr,
                )
            }
            LossKind::HierarchicalSoftmax => {
                let tree = self
                    .tree
                    .as_ref()
                    .expect("set_target_counts must precede update under hierarchical softmax");
                loss::hierarchical_softmax(
                    &self.params.wo,
                    &self.params.tables,
                    tree,
                    &self.hidden,
                    &mut self.grad,
                    target,
                    lr,
                )
            }
            LossKind::Softmax => loss::softmax(
                &self.params.wo,
                &self.params.tables,
                &self.hidden,
                &mut self.grad,
                &mut self.output,
                target,
                lr,
            ),
        }
    }

    fn record_loss(&mut self, loss: f32) {
        self.loss_sum += loss as f64;
        self.nexamples += 1;
    }

    /// `update(input, target, lr)` (spec §4.7): bag-of-features mode.
    pub fn update(&mut self, input: &[usize], target: usize, lr: f32) {
        if input.is_empty() {
            return;
        }
        compute_hidden(input, &self.params.wi, &mut self.hidden);

        let loss = self.run_loss(target, lr);
        self.record_loss(loss);

        if self.args.model == ModelKind::Supervised {
            self.grad.mul_scalar(1.0 / input.len() as f32);
        }
        for &idx in input {
            self.params.wi.add_row(&self.grad, idx, 1.0);
        }
    }

    /// `updateAttn(input, target, lr)` (spec §4.7): context-view
    /// attention.
    pub fn update_attn(&mut self, input: &[AttnInput], target: usize, lr: f32) {
        self.update_attn_generic(input, target, lr, false);
    }

    /// `updateAttn2(input, target, lr)` (spec §4.7): feature-view
    /// attention.
    pub fn update_attn2(&mut self, input: &[AttnInput], target: usize, lr: f32) {
        self.update_attn_generic(input, target, lr, true);
    }

    fn update_attn_generic(&mut self, input: &[AttnInput], target: usize, lr: f32, feature_view: bool) {
        if input.is_empty() {
            return;
        }
        let filtered: Vec<AttnInput> = input
            .iter()
            .copied()
            .filter(|p| p.feature as usize != target)
            .collect();
        if filtered.is_empty() {
            return;
        }

        if feature_view {
            compute_attn_hidden2(
                &filtered,
                target as u32,
                &self.params.wi,
                &self.params.attn,
                &self.params.bias,
                |p| self.position_bucket(p),
                &mut self.hidden,
                &mut self.softmaxattn,
            );
        } else {
            compute_attn_hidden(
                &filtered,
                &self.params.wi,
                &self.params.attn,
                &self.params.bias,
                |p| self.position_bucket(p),
                &mut self.hidden,
                &mut self.softmaxattn,
            );
        }

        let loss = self.run_loss(target, lr);
        self.record_loss(loss);

        compute_attn_gradient(
            &filtered,
            &self.softmaxattn,
            &self.hidden,
            &self.grad,
            &self.params.wi,
            &self.params.attn,
            &self.params.bias,
            |p| self.position_bucket(p),
            |p| if feature_view { target } else { p.feature as usize },
        );
    }

    /// `getLoss()` (spec §6): `loss_sum / nexamples`.
    pub fn get_loss(&self) -> f32 {
        (self.loss_sum / self.nexamples.max(1) as f64) as f32
    }

    pub fn nexamples(&self) -> u64 {
        self.nexamples
    }

    pub fn reset_loss(&mut self) {
        self.loss_sum = 0.0;
        self.nexamples = 0;
    }

    /// `predict(input, k)` (spec §4.9): top-`k` classes by score.
    /// Descending by score; ties are unspecified (spec §4.9).
    pub fn predict(&mut self, input: &[usize], k: usize) -> Vec<(f32, usize)> {
        compute_hidden(input, &self.params.wi, &mut self.hidden);

        let mut heap: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);

        match self.loss_kind {
            LossKind::HierarchicalSoftmax => {
                let tree = self
                    .tree
                    .as_ref()
                    .expect("set_target_counts must precede predict under hierarchical softmax")
                    .clone();
                if tree.internal_count() > 0 {
                    dfs_predict(&tree, &self.params.wo, &self.params.tables, &self.hidden, tree.root(), 0.0, k, &mut heap);
                } else {
                    push_bounded(&mut heap, Candidate { score: 0.0, idx: 0 }, k);
                }
            }
            LossKind::NegativeSampling { .. } | LossKind::Softmax => {
                loss::softmax_forward_only(&self.params.wo, &self.hidden, &mut self.output);
                // Scanning all `osz` classes is the expensive part when the
                // vocabulary is large; score them in parallel chunks and
                // merge each chunk's local top-k, mirroring the pack's
                // rayon candidate-scoring pattern.
                let output = &self.output;
                let tables = &self.params.tables;
                let local_heaps: Vec<BinaryHeap<std::cmp::Reverse<Candidate>>> = (0..output
                    .len())
                    .into_par_iter()
                    .fold(
                        || BinaryHeap::with_capacity(k + 1),
                        |mut local, i| {
                            let score = tables.log(output.get(i));
                            push_bounded(&mut local, Candidate { score, idx: i }, k);
                            local
                        },
                    )
                    .collect();
                for local in local_heaps {
                    for std::cmp::Reverse(c) in local {
                        push_bounded(&mut heap, c, k);
                    }
                }
            }
        }

        let mut out: Vec<Candidate> = heap.into_iter().map(|r| r.0).collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        out.into_iter().map(|c| (c.score, c.idx)).collect()
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    score: f32,
    idx: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

fn push_bounded(heap: &mut BinaryHeap<std::cmp::Reverse<Candidate>>, c: Candidate, k: usize) {
    if k == 0 {
        return;
    }
    if heap.len() < k {
        heap.push(std::cmp::Reverse(c));
    } else if let Some(std::cmp::Reverse(worst)) = heap.peek() {
        if c.score > worst.score {
            heap.pop();
            heap.push(std::cmp::Reverse(c));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn dfs_predict(
    tree: &HuffmanTree,
    wo: &Matrix,
    tables: &MathTables,
    hidden: &Vector,
    node: usize,
    score: f32,
    k: usize,
    heap: &mut BinaryHeap<std::cmp::Reverse<Candidate>>,
) {
    if heap.len() >= k {
        if let Some(std::cmp::Reverse(worst)) = heap.peek() {
            if score < worst.score {
                return;
            }
        }
    }

    let f = tables.sigmoid(wo.dot_row(hidden, node));
    let (left, right) = tree.children(node);

    descend(tree, wo, tables, hidden, left, score + tables.log(1.0 - f), k, heap);
    descend(tree, wo, tables, hidden, right, score + tables.log(f), k, heap);
}

#[allow(clippy::too_many_arguments)]
fn descend(
    tree: &HuffmanTree,
    wo: &Matrix,
    tables: &MathTables,
    hidden: &Vector,
    child: Child,
    score: f32,
    k: usize,
    heap: &mut BinaryHeap<std::cmp::Reverse<Candidate>>,
) {
    match child {
        Child::Leaf(class) => push_bounded(heap, Candidate { score, idx: class }, k),
        Child::Internal(n) => dfs_predict(tree, wo, tables, hidden, n, score, k, heap),
    }
}

/// `computeHidden(input, h)` (spec §4.5): `h = (1/|input|) · Σ wi_[idx]`.
/// Undefined (debug-asserted) when `input` is empty.
fn compute_hidden(input: &[usize], wi: &Matrix, hidden: &mut Vector) {
    debug_assert!(!input.is_empty());
    hidden.zero();
    for &idx in input {
        wi.add_scaled_row_into(hidden, idx, 1.0);
    }
    hidden.mul_scalar(1.0 / input.len() as f32);
}
