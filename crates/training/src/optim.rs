//! Optimizer registry.
//!
//! Burn optimizers are distinct types, so a loop that is generic over the
//! optimizer implements [`OptimizerVisitor`] and receives a factory for the
//! selected one.

use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, AdamWConfig, Optimizer, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use models::FaceClassifier;
use serde::{Deserialize, Serialize};

pub const WEIGHT_DECAY: f32 = 5e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    AdamW,
    #[serde(rename = "SGD")]
    Sgd,
}

pub trait OptimizerVisitor<B: AutodiffBackend> {
    type Output;

    /// `make` returns a fresh optimizer each call.
    fn visit<O, F>(self, make: F) -> Self::Output
    where
        O: Optimizer<FaceClassifier<B>, B>,
        F: Fn() -> O;
}

impl OptimizerKind {
    pub const KEYS: [(&'static str, OptimizerKind); 3] = [
        ("Adam", OptimizerKind::Adam),
        ("AdamW", OptimizerKind::AdamW),
        ("SGD", OptimizerKind::Sgd),
    ];

    pub fn from_key(key: &str) -> anyhow::Result<Self> {
        Self::KEYS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown optimizer `{key}` (known: {})",
                    Self::KEYS.map(|(name, _)| name).join(", ")
                )
            })
    }

    pub fn dispatch<B: AutodiffBackend, V: OptimizerVisitor<B>>(self, visitor: V) -> V::Output {
        match self {
            OptimizerKind::Adam => visitor.visit(|| {
                AdamConfig::new()
                    .with_weight_decay(Some(WeightDecayConfig::new(WEIGHT_DECAY)))
                    .init::<B, FaceClassifier<B>>()
            }),
            OptimizerKind::AdamW => visitor.visit(|| {
                AdamWConfig::new()
                    .with_weight_decay(WEIGHT_DECAY)
                    .init::<B, FaceClassifier<B>>()
            }),
            OptimizerKind::Sgd => visitor.visit(|| {
                SgdConfig::new()
                    .with_weight_decay(Some(WeightDecayConfig::new(WEIGHT_DECAY)))
                    .init::<B, FaceClassifier<B>>()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::optim::GradientsParams;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use models::ModelKind;

    type AD = Autodiff<NdArray<f32>>;

    /// Takes one step with the dispatched optimizer and reports the new loss.
    struct OneStep;

    impl OptimizerVisitor<AD> for OneStep {
        type Output = (f32, f32);

        fn visit<O, F>(self, make: F) -> Self::Output
        where
            O: Optimizer<FaceClassifier<AD>, AD>,
            F: Fn() -> O,
        {
            let device = Default::default();
            let model = ModelKind::Base.build::<AD>(2, &device);
            let mut optim = make();
            let images = Tensor::<AD, 4>::ones([2, 3, 8, 8], &device);
            let before = model.forward(images.clone()).mean();
            let before_value = before.clone().into_scalar();
            let grads = GradientsParams::from_grads(before.backward(), &model);
            let model = optim.step(1e-2, model, grads);
            let after = model.forward(images).mean().into_scalar();
            (before_value, after)
        }
    }

    #[test]
    fn every_optimizer_updates_the_model() {
        for (_, kind) in OptimizerKind::KEYS {
            let (before, after) = kind.dispatch::<AD, _>(OneStep);
            assert!(before.is_finite() && after.is_finite());
            assert_ne!(before, after, "{kind:?} did not change the output");
        }
    }

    #[test]
    fn unknown_optimizer_is_rejected() {
        assert_eq!(OptimizerKind::from_key("SGD").unwrap(), OptimizerKind::Sgd);
        assert!(OptimizerKind::from_key("RMSprop").is_err());
    }
}
