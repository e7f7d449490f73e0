//! Loss kernels (spec §4.6): binary logistic, negative sampling,
//! hierarchical softmax, full softmax.
//!
//! The three output objectives are a closed set dispatched at the call
//! site through `LossKind`, not through a trait object (spec §9:
//! "represent as a tagged variant... not via virtual calls, to keep the
//! inner loop branch-predictable").

use crate::huffman::HuffmanTree;
use crate::matrix::Matrix;
use crate::negative::{NegativeCursor, NegativeTable};
use crate::tables::MathTables;
use crate::vector::Vector;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossKind {
    NegativeSampling { neg: usize },
    HierarchicalSoftmax,
    Softmax,
}

/// `binaryLogistic(t, y, lr)`: updates `grad` and `wo_[t]` in place,
/// returns the binary cross-entropy term. `grad` is updated with the
/// pre-mutation row of `wo_[t]`, per spec ordering.
pub fn binary_logistic(
    wo: &Matrix,
    tables: &MathTables,
    hidden: &Vector,
    grad: &mut Vector,
    t: usize,
    y: bool,
    lr: f32,
) -> f32 {
    let score = tables.sigmoid(wo.dot_row(hidden, t));
    let alpha = lr * (if y { 1.0 } else { 0.0 } - score);

    wo.add_scaled_row_into(grad, t, alpha);
    wo.add_row(hidden, t, alpha);

    if y {
        -tables.log(score)
    } else {
        -tables.log(1.0 - score)
    }
}

/// Negative sampling (spec §4.6). `grad` is zeroed, then one positive
/// and `neg` negative binary-logistic calls are summed.
#[allow(clippy::too_many_arguments)]
pub fn negative_sampling(
    wo: &Matrix,
    tables: &MathTables,
    neg_table: &NegativeTable,
    neg_cursor: &mut NegativeCursor,
    hidden: &Vector,
    grad: &mut Vector,
    target: usize,
    neg: usize,
    lr: f32,
) -> f32 {
    grad.zero();
    let mut loss = binary_logistic(wo, tables, hidden, grad, target, true, lr);
    for _ in 0..neg {
        let n = neg_cursor.next(neg_table, target as u32) as usize;
        loss += binary_logistic(wo, tables, hidden, grad, n, false, lr);
    }
    loss
}

/// Hierarchical softmax (spec §4.6): one binary-logistic call per
/// ancestor of `target` on its root path, summed.
pub fn hierarchical_softmax(
    wo: &Matrix,
    tables: &MathTables,
    tree: &HuffmanTree,
    hidden: &Vector,
    grad: &mut Vector,
    target: usize,
    lr: f32,
) -> f32 {
    grad.zero();
    let path = tree.path(target);
    let code = tree.code(target);
    let mut loss = 0.0;
    for (&node, &bit) in path.iter().zip(code.iter()) {
        loss += binary_logistic(wo, tables, hidden, grad, node as usize, bit, lr);
    }
    loss
}

/// Full softmax (spec §4.6). `output` is overwritten with the
/// normalized distribution as a side effect, for callers (e.g.
/// `predict`) that want to reuse it.
pub fn softmax(
    wo: &Matrix,
    tables: &MathTables,
    hidden: &Vector,
    grad: &mut Vector,
    output: &mut Vector,
    target: usize,
    lr: f32,
) -> f32 {
    grad.zero();
    wo.mul_vec_into(hidden, output);
    softmax_normalize_in_place(output);

    for i in 0..output.len() {
        let indicator = if i == target { 1.0 } else { 0.0 };
        let alpha = lr * (indicator - output.get(i));
        wo.add_scaled_row_into(grad, i, alpha);
        wo.add_row(hidden, i, alpha);
    }

    -tables.log(output.get(target))
}

/// Forward-only full softmax, with no gradient or `wo_` update: used by
/// `predict` (spec §4.9 step 3) for both negative-sampling and softmax
/// loss modes, since prediction always scores over the full vocabulary.
pub fn softmax_forward_only(wo: &Matrix, hidden: &Vector, output: &mut Vector) {
    wo.mul_vec_into(hidden, output);
    softmax_normalize_in_place(output);
}

fn softmax_normalize_in_place(output: &mut Vector) {
    let slice = output.as_mut_slice();
    let max = slice.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in slice.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in slice.iter_mut() {
        *v /= sum;
    }
}
