//! Engine configuration (spec §3, "Configuration options recognized by
//! the engine").

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::loss::LossKind;

/// `model ∈ {sup, ...}`: when `Supervised`, the per-example gradient is
/// divided by the input size before being scattered back to input rows
/// (spec §4.7 step 4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "sup")]
    Supervised,
    #[serde(rename = "unsupervised")]
    Unsupervised,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Args {
    pub dim: usize,
    pub loss: LossConfig,
    pub model: ModelKind,
}

/// Wire/config-file representation of `loss`: a string tag plus the
/// `neg` count that only applies to negative sampling. Validated into
/// a `LossKind` via `Args::validate`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LossConfig {
    pub kind: LossConfigKind,
    pub neg: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossConfigKind {
    #[serde(rename = "ns")]
    NegativeSampling,
    #[serde(rename = "hs")]
    HierarchicalSoftmax,
    #[serde(rename = "softmax")]
    Softmax,
}

impl Args {
    pub fn validate(&self) -> Result<LossKind, EngineError> {
        if self.dim == 0 {
            return Err(EngineError::InvalidDim(self.dim));
        }
        match self.loss.kind {
            LossConfigKind::NegativeSampling => {
                if self.loss.neg == 0 {
                    return Err(EngineError::InvalidNegativeCount(self.loss.neg));
                }
                Ok(LossKind::NegativeSampling { neg: self.loss.neg })
            }
            LossConfigKind::HierarchicalSoftmax => Ok(LossKind::HierarchicalSoftmax),
            LossConfigKind::Softmax => Ok(LossKind::Softmax),
        }
    }
}
