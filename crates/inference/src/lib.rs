#![recursion_limit = "256"]

pub mod predictor;
pub mod submission;
pub mod util;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use predictor::{load_classifier, Predictor};
pub use submission::{read_info, write_submission, InfoTable, IMAGE_ID_COLUMN};
pub use util::{run_inference, InferArgs, InferReport};

pub mod prelude {
    pub use crate::predictor::{load_classifier, Predictor};
    pub use crate::util::{run_inference, InferArgs};
    pub use crate::InferenceBackend;
}
