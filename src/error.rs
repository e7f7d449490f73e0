//! Errors surfaced at configuration and setup boundaries.
//!
//! Per the engine's design, kernel-level preconditions (empty input, out
//! of range indices, calling an update before the target counts are set)
//! are never recoverable errors — they are `debug_assert!`s in the hot
//! path and undefined behavior in release. `EngineError` covers only the
//! handful of mistakes a driver can make while wiring the engine up.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("hidden dimension must be positive, got {0}")]
    InvalidDim(usize),

    #[error("unknown loss kind {0:?}, expected one of: ns, hs, softmax")]
    UnknownLoss(String),

    #[error("negative sample count must be positive when loss = ns, got {0}")]
    InvalidNegativeCount(usize),

    #[error("setTargetCounts was already called for this engine")]
    TargetCountsAlreadySet,

    #[error("target counts vector is empty")]
    EmptyTargetCounts,
}
