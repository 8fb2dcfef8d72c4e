//! Command-line argument groups shared by the `train` and `infer` binaries.

pub mod common;

pub use common::{
    parse_resize, resize_from_values, DataDirArgs, DataDirOpts, EvalDirArgs, EvalDirOpts, SeedArgs,
    DEFAULT_EVAL_DIR, DEFAULT_MODEL_DIR, DEFAULT_TRAIN_DIR,
};
