//! Core types, error definitions, and data structures for face_dataset.

use crate::labels::{GenderLabel, MaskLabel, SampleLabels};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, FaceDatasetError>;

#[derive(Debug, Error)]
pub enum FaceDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid face metadata at {path}: {msg}")]
    Metadata { path: PathBuf, msg: String },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("combined label {0} is outside 0..18")]
    LabelOutOfRange(u32),
    #[error("unknown {kind} `{key}` (known: {known})")]
    UnknownKey {
        kind: &'static str,
        key: String,
        known: String,
    },
    #[error("{0}")]
    Other(String),
}

/// One indexed image with the labels decoded from its folder and file name.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    pub path: PathBuf,
    /// Profile directory name; all images of one person share it.
    pub profile: String,
    pub mask: MaskLabel,
    pub gender: GenderLabel,
    pub age_years: u32,
}

impl FaceRecord {
    pub fn labels(&self) -> SampleLabels {
        SampleLabels::new(self.mask, self.gender, self.age_years)
    }
}

/// A decoded, transformed image ready for batching.
#[derive(Debug, Clone)]
pub struct FaceSample {
    /// Position of the source item in its loader.
    pub index: usize,
    /// Image in CHW layout, normalized with the pipeline's channel stats.
    pub image_chw: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub labels: Option<SampleLabels>,
}

/// Train/validation partition expressed as indices into a record list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

/// Per-channel normalization statistics in `[0, 1]` pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            mean: [0.548, 0.504, 0.479],
            std: [0.237, 0.247, 0.246],
        }
    }
}

/// Class counts over an indexed dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub images: usize,
    pub profiles: usize,
    pub mask: [usize; 3],
    pub gender: [usize; 2],
    pub age: [usize; 3],
}
