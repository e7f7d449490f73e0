//! Attention-weighted forward pass and gradient (spec §4.5, §4.8).
//!
//! Two forward variants share one softmax-over-logits computation:
//! context view indexes the attention matrix by `(feature, position)`,
//! feature view by `(target, position)`. Both write the normalized
//! weights into the caller's `softmaxattn` scratch vector.

use crate::matrix::Matrix;
use crate::vector::Vector;

/// `bias_` is shared and Hogwild-updated exactly like `attn_` (spec §5),
/// so it is represented the same way: a `Matrix` with one column per
/// relative position, indexed `(position_bucket, 0)`.

const EXP_ZERO_CLAMP: f32 = -50.0;

/// One `(feature, relative_position)` pair in a bag of attended inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttnInput {
    pub feature: u32,
    pub position: i32,
}

/// Shared softmax-over-logits step: writes normalized weights into
/// `softmaxattn` (resized to `input.len()`) and returns them.
fn softmax_logits(logits: &[f32], softmaxattn: &mut Vec<f32>) {
    softmaxattn.clear();
    softmaxattn.extend_from_slice(logits);
    let max = softmaxattn.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for w in softmaxattn.iter_mut() {
        let shifted = *w - max;
        *w = if shifted < EXP_ZERO_CLAMP {
            0.0
        } else {
            shifted.exp()
        };
        sum += *w;
    }
    if sum > 0.0 {
        for w in softmaxattn.iter_mut() {
            *w /= sum;
        }
    }
}

/// Context view: logit for pair `i` is `attn[feature_i, position_i] +
/// bias[position_i]`. `position_to_bias` maps a relative position to its
/// row in `bias` (positions may be negative; the bias vector is indexed
/// by an offset the caller establishes — see `engine.rs`).
pub fn compute_attn_hidden(
    input: &[AttnInput],
    wi: &Matrix,
    attn: &Matrix,
    bias: &Matrix,
    position_to_bias: impl Fn(i32) -> usize,
    hidden: &mut Vector,
    softmaxattn: &mut Vec<f32>,
) {
    debug_assert!(!input.is_empty());
    let logits: Vec<f32> = input
        .iter()
        .map(|p| {
            let bpos = position_to_bias(p.position);
            attn.get(p.feature as usize, bpos) + bias.get(bpos, 0)
        })
        .collect();
    softmax_logits(&logits, softmaxattn);

    hidden.zero();
    for (p, &w) in input.iter().zip(softmaxattn.iter()) {
        wi.add_scaled_row_into(hidden, p.feature as usize, w);
    }
}

/// Feature view: logit for pair `i` is `attn[target, position_i] +
/// bias[position_i]` — indexed by the output target rather than the
/// context feature.
pub fn compute_attn_hidden2(
    input: &[AttnInput],
    target: u32,
    wi: &Matrix,
    attn: &Matrix,
    bias: &Matrix,
    position_to_bias: impl Fn(i32) -> usize,
    hidden: &mut Vector,
    softmaxattn: &mut Vec<f32>,
) {
    debug_assert!(!input.is_empty());
    let logits: Vec<f32> = input
        .iter()
        .map(|p| {
            let bpos = position_to_bias(p.position);
            attn.get(target as usize, bpos) + bias.get(bpos, 0)
        })
        .collect();
    softmax_logits(&logits, softmaxattn);

    hidden.zero();
    for (p, &w) in input.iter().zip(softmaxattn.iter()) {
        wi.add_scaled_row_into(hidden, p.feature as usize, w);
    }
}

/// Backpropagate the hidden-space gradient `grad` through the attention
/// softmax into `wi_`, `attn_`, and `bias_` (spec §4.8). `index_of`
/// selects which row of `attn_` each pair updates: the context feature
/// for `updateAttn`, the fixed target for `updateAttn2`.
pub fn compute_attn_gradient(
    input: &[AttnInput],
    softmaxattn: &[f32],
    hidden: &Vector,
    grad: &Vector,
    wi: &Matrix,
    attn: &Matrix,
    bias: &Matrix,
    position_to_bias: impl Fn(i32) -> usize,
    index_of: impl Fn(&AttnInput) -> usize,
) {
    debug_assert_eq!(input.len(), softmaxattn.len());
    let g_dot_hidden = grad.dot(hidden);
    let input_size = input.len() as f32;

    for (p, &alpha) in input.iter().zip(softmaxattn.iter()) {
        let g_attn = alpha * (wi.dot_row(grad, p.feature as usize) - g_dot_hidden);

        // Scaled by `alpha * input_size`, not `alpha` alone: see the
        // documented open question on this asymmetry.
        wi.add_row(grad, p.feature as usize, alpha * input_size);

        let bpos = position_to_bias(p.position);
        let idx = index_of(p);
        attn.set(idx, bpos, attn.get(idx, bpos) + g_attn);
        bias.set(bpos, 0, bias.get(bpos, 0) + g_attn);
    }
}
