#![recursion_limit = "256"]

pub mod checkpoint;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod run_dir;
pub mod runner;
pub mod schedule;
pub mod util;

pub use checkpoint::{BestTracker, CheckpointStore, Improvement};
pub use loss::{CriterionKind, JointAgeLoss};
pub use metrics::{accuracy, macro_f1, MetricWindow};
pub use optim::{OptimizerKind, OptimizerVisitor};
pub use runner::{EpochReport, FoldReport, RunReport};
pub use schedule::StepLr;
pub use util::{run_train, Mode, TrainArgs, TrainConfig};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

pub type ADBackend = burn::backend::Autodiff<TrainBackend>;
