//! Burn image classifiers for face attributes.
//!
//! `FaceClassifier` is a small convolutional network: a stack of
//! conv/batch-norm/relu/max-pool blocks, global average pooling, dropout and
//! a linear head producing one logit per class. `ModelKind` names the preset
//! sizes selectable from the command line.
//!
//! These are pure Burn Modules. The `training` and `inference` crates pick the
//! backend and own checkpoint I/O.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown model `{key}` (known: {known})")]
    UnknownModel { key: String, known: String },
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub num_classes: usize,
    /// Output channels of each conv block; the first block reads RGB.
    pub widths: Vec<usize>,
    pub dropout: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            num_classes: 18,
            widths: vec![16, 32, 64],
            dropout: 0.2,
        }
    }
}

#[derive(Debug, Module)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: nn::BatchNorm<B, 2>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels_in: usize, channels_out: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([channels_in, channels_out], [3, 3])
            .with_padding(nn::PaddingConfig2d::Same)
            .init(device);
        let norm = nn::BatchNormConfig::new(channels_out).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { conv, norm, pool }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.norm.forward(self.conv.forward(input)));
        let [batch, channels, height, width] = x.dims();
        // Tiny inputs stop shrinking once a side reaches 1.
        if height < 2 || width < 2 {
            return x;
        }
        // The pooling backward pass needs even sides; drop the odd trailing
        // row and column as a floor-mode pool would.
        let x = if height % 2 == 1 || width % 2 == 1 {
            x.slice([0..batch, 0..channels, 0..height - height % 2, 0..width - width % 2])
        } else {
            x
        };
        self.pool.forward(x)
    }
}

#[derive(Debug, Module)]
pub struct FaceClassifier<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    gap: AdaptiveAvgPool2d,
    dropout: nn::Dropout,
    head: nn::Linear<B>,
    num_classes: usize,
}

impl<B: Backend> FaceClassifier<B> {
    pub fn new(cfg: ClassifierConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(cfg.widths.len());
        let mut channels = 3;
        for &width in &cfg.widths {
            blocks.push(ConvBlock::new(channels, width, device));
            channels = width;
        }
        let head = nn::LinearConfig::new(channels, cfg.num_classes.max(1)).init(device);
        Self {
            blocks,
            gap: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: nn::DropoutConfig::new(cfg.dropout).init(),
            head,
            num_classes: cfg.num_classes.max(1),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// `[batch, 3, height, width]` images to `[batch, num_classes]` logits.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.gap.forward(x);
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);
        self.head.forward(self.dropout.forward(x))
    }
}

/// Named classifier presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "BaseModel")]
    Base,
    #[serde(rename = "WideModel")]
    Wide,
    #[serde(rename = "DeepModel")]
    Deep,
}

impl ModelKind {
    pub const KEYS: [(&'static str, ModelKind); 3] = [
        ("BaseModel", ModelKind::Base),
        ("WideModel", ModelKind::Wide),
        ("DeepModel", ModelKind::Deep),
    ];

    pub fn from_key(key: &str) -> Result<Self, ModelError> {
        Self::KEYS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ModelError::UnknownModel {
                key: key.to_string(),
                known: Self::KEYS.map(|(name, _)| name).join(", "),
            })
    }

    pub fn key(self) -> &'static str {
        match self {
            ModelKind::Base => "BaseModel",
            ModelKind::Wide => "WideModel",
            ModelKind::Deep => "DeepModel",
        }
    }

    pub fn config(self, num_classes: usize) -> ClassifierConfig {
        let (widths, dropout) = match self {
            ModelKind::Base => (vec![16, 32, 64], 0.2),
            ModelKind::Wide => (vec![32, 64, 128], 0.3),
            ModelKind::Deep => (vec![16, 32, 64, 128, 128], 0.3),
        };
        ClassifierConfig {
            num_classes,
            widths,
            dropout,
        }
    }

    pub fn build<B: Backend>(self, num_classes: usize, device: &B::Device) -> FaceClassifier<B> {
        FaceClassifier::new(self.config(num_classes), device)
    }
}

/// Row-wise argmax of `[batch, classes]` logits as class indices.
pub fn argmax<B: Backend>(logits: Tensor<B, 2>) -> Vec<u8> {
    logits
        .argmax(1)
        .into_data()
        .iter::<i64>()
        .map(|v| v as u8)
        .collect()
}

pub mod prelude {
    pub use super::{argmax, ClassifierConfig, FaceClassifier, ModelError, ModelKind};
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn forward_produces_one_logit_per_class() {
        let device = Default::default();
        for (_, kind) in ModelKind::KEYS {
            let model = kind.build::<B>(11, &device);
            let images = Tensor::<B, 4>::zeros([2, 3, 16, 12], &device);
            assert_eq!(model.forward(images).dims(), [2, 11]);
            assert_eq!(model.num_classes(), 11);
        }
    }

    #[test]
    fn tiny_images_do_not_collapse() {
        let device = Default::default();
        let model = ModelKind::Deep.build::<B>(3, &device);
        let images = Tensor::<B, 4>::ones([1, 3, 4, 4], &device);
        assert_eq!(model.forward(images).dims(), [1, 3]);
    }

    #[test]
    fn argmax_picks_largest_logit_per_row() {
        let logits = Tensor::<B, 2>::from_data(
            burn::tensor::TensorData::new(vec![0.1f32, 0.9, 0.0, 2.0, -1.0, 1.0], [2, 3]),
            &Default::default(),
        );
        assert_eq!(argmax(logits), vec![1, 0]);
    }

    #[test]
    fn odd_feature_maps_backpropagate() {
        type AD = burn::backend::Autodiff<B>;
        let device = Default::default();
        for (height, width) in [(16, 12), (300, 200), (15, 9)] {
            let model = ModelKind::Base.build::<AD>(18, &device);
            let images = Tensor::<AD, 4>::ones([1, 3, height, width], &device);
            let loss = model.forward(images).mean();
            let grads = loss.backward();
            assert!(model.head.weight.grad(&grads).is_some());
        }
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert_eq!(ModelKind::from_key("WideModel").unwrap(), ModelKind::Wide);
        let err = ModelKind::from_key("EfficientnetB4").unwrap_err();
        assert!(err.to_string().starts_with("unknown model `EfficientnetB4`"));
    }
}
