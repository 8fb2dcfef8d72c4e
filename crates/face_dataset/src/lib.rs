//! Dataset loading, label packing and Burn-compatible batching for face
//! attribute classification.
//!
//! This crate provides utilities for:
//! - Indexing a folder of `<id>_<gender>_<race>_<age>/<stem>.<ext>` images
//! - Packing mask/gender/age labels into the 18-class combined label
//! - Train/val and k-fold splitting by image or by person
//! - Image augmentation pipelines
//! - Burn-compatible batch iteration

pub mod aug;
pub mod batch;
pub mod index;
pub mod labels;
pub mod registry;
pub mod splits;
pub mod types;

pub use aug::{Augment, AugmentationKind, Chance, DatasetConfig, TransformPipeline};
pub use batch::{BatchIter, FaceBatch, FaceLoader, LoaderItem};
pub use index::{estimate_channel_stats, index_profiles, load_rgb, summarize};
pub use labels::*;
pub use registry::{DatasetKind, NUM_FOLDS};
pub use splits::{k_fold, split_by_profile, split_random};
pub use types::*;
