//! End-to-end scenarios exercising the public engine API across
//! modules (construction, `setTargetCounts`, `update`, `predict`,
//! concurrent Hogwild updates, vector/matrix save-load interop).

use std::sync::{Arc, Once};

use embedlearn::args::{Args, LossConfig, LossConfigKind, ModelKind};
use embedlearn::engine::{EngineState, SharedParams};
use embedlearn::matrix::Matrix;
use embedlearn::tables::MathTables;
use embedlearn::vector::Vector;

static INIT: Once = Once::new();

/// Installs a `tracing` subscriber once per test binary so the
/// construction/`setTargetCounts` `debug!` spans show up under
/// `--nocapture` instead of being silently dropped.
fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

fn shared(dim: usize, osz: usize) -> SharedParams {
    SharedParams {
        wi: Arc::new(Matrix::new(osz, dim)),
        wo: Arc::new(Matrix::new(osz, dim)),
        attn: Arc::new(Matrix::new(osz, 1)),
        bias: Arc::new(Matrix::new(1, 1)),
        tables: Arc::new(MathTables::new()),
    }
}

#[test]
fn zero_init_full_softmax_update_reproduces_uniform_forward() {
    init_test_logging();
    let params = shared(4, 3);
    let args = Args {
        dim: 4,
        loss: LossConfig {
            kind: LossConfigKind::Softmax,
            neg: 0,
        },
        model: ModelKind::Unsupervised,
    };
    let mut engine = EngineState::new(params, args, 8, 1).unwrap();

    engine.update(&[0, 1], 2, 0.1);

    // wo_ starts at zero, so hidden is zero, output is uniform over 3
    // classes, and loss is exactly log(osz).
    assert!((engine.get_loss() - (3f32).ln()).abs() < 1e-2);
}

#[test]
fn negative_sampling_end_to_end_converges_loss_downward() {
    init_test_logging();
    let osz = 50;
    let params = shared(8, osz);
    let args = Args {
        dim: 8,
        loss: LossConfig {
            kind: LossConfigKind::NegativeSampling,
            neg: 5,
        },
        model: ModelKind::Unsupervised,
    };
    let mut engine = EngineState::new(params, args, 8, 42).unwrap();
    let counts: Vec<u64> = (1..=osz as u64).rev().collect();
    engine.set_target_counts(&counts).unwrap();

    let input = vec![1usize, 3, 5];
    for _ in 0..200 {
        engine.update(&input, 7, 0.1);
    }
    assert_eq!(engine.nexamples(), 200);
    assert!(engine.get_loss().is_finite());
}

#[test]
fn hierarchical_softmax_requires_set_target_counts_before_predict() {
    let params = shared(4, 10);
    let args = Args {
        dim: 4,
        loss: LossConfig {
            kind: LossConfigKind::HierarchicalSoftmax,
            neg: 0,
        },
        model: ModelKind::Unsupervised,
    };
    let mut engine = EngineState::new(params, args, 8, 1).unwrap();
    engine
        .set_target_counts(&(1..=10u64).rev().collect::<Vec<_>>())
        .unwrap();

    let top = engine.predict(&[0, 1], 3);
    assert_eq!(top.len(), 3);
    // scores must be sorted descending.
    for w in top.windows(2) {
        assert!(w[0].0 >= w[1].0);
    }
}

#[test]
fn set_target_counts_is_one_shot() {
    let params = shared(4, 5);
    let args = Args {
        dim: 4,
        loss: LossConfig {
            kind: LossConfigKind::HierarchicalSoftmax,
            neg: 0,
        },
        model: ModelKind::Unsupervised,
    };
    let mut engine = EngineState::new(params, args, 8, 1).unwrap();
    let counts: Vec<u64> = (1..=5u64).rev().collect();
    engine.set_target_counts(&counts).unwrap();
    assert!(engine.set_target_counts(&counts).is_err());
}

#[test]
fn concurrent_updates_across_worker_threads_complete_without_corruption() {
    let dim = 16;
    let osz = 200;
    let wi = Arc::new(Matrix::new(osz, dim));
    let wo = Arc::new(Matrix::new(osz, dim));
    let attn = Arc::new(Matrix::new(osz, 1));
    let bias = Arc::new(Matrix::new(1, 1));
    let tables = Arc::new(MathTables::new());
    let counts: Vec<u64> = (1..=osz as u64).rev().collect();

    std::thread::scope(|s| {
        for worker in 0..4u64 {
            let params = SharedParams {
                wi: Arc::clone(&wi),
                wo: Arc::clone(&wo),
                attn: Arc::clone(&attn),
                bias: Arc::clone(&bias),
                tables: Arc::clone(&tables),
            };
            let counts = counts.clone();
            s.spawn(move || {
                let args = Args {
                    dim,
                    loss: LossConfig {
                        kind: LossConfigKind::NegativeSampling,
                        neg: 3,
                    },
                    model: ModelKind::Unsupervised,
                };
                let mut engine = EngineState::new(params, args, 8, worker).unwrap();
                engine.set_target_counts(&counts).unwrap();
                for i in 0..100 {
                    engine.update(&[(worker as usize + i) % osz], i % osz, 0.05);
                }
            });
        }
    });

    assert_eq!(wi.rows(), osz);
    assert_eq!(wi.cols(), dim);
}

#[test]
fn vector_and_matrix_survive_a_save_load_roundtrip_through_a_tempfile() {
    let mut v = Vector::new(4);
    v.set(0, 1.5);
    v.set(1, -2.5);
    v.set(2, 3.0);
    v.set(3, 0.0);

    let mut file = tempfile::tempfile().unwrap();
    v.save(&mut file).unwrap();
    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::Start(0)).unwrap();
    let restored = Vector::load(&mut file).unwrap();
    assert_eq!(restored.as_slice(), v.as_slice());
}
