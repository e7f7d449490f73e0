pub mod args;
pub mod attention;
pub mod engine;
pub mod error;
pub mod huffman;
pub mod loss;
pub mod matrix;
pub mod negative;
pub mod rng;
pub mod tables;
pub mod vector;

pub use args::{Args, LossConfig, LossConfigKind, ModelKind};
pub use attention::AttnInput;
pub use engine::{EngineState, SharedParams};
pub use error::EngineError;
pub use huffman::HuffmanTree;
pub use loss::LossKind;
pub use matrix::Matrix;
pub use negative::{NegativeCursor, NegativeTable};
pub use rng::Rng;
pub use tables::MathTables;
pub use vector::Vector;
