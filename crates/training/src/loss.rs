//! Classification criteria and the joint fine/coarse age loss.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::activation::{log_softmax, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use face_dataset::{AGE_BUCKETS, NUM_AGE_CLASSES};
use serde::{Deserialize, Serialize};

pub const FOCAL_GAMMA: f32 = 2.0;
pub const LABEL_SMOOTHING: f32 = 0.1;
pub const F1_EPSILON: f32 = 1e-7;

/// Weight of the fine-class term in [`JointAgeLoss`].
pub const FINE_LOSS_SCALE: f32 = 0.5;
/// Per-bucket weights of the coarse term; the oldest bucket is rare.
pub const COARSE_CLASS_WEIGHTS: [f32; NUM_AGE_CLASSES] = [1.5, 1.5, 7.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionKind {
    #[serde(rename = "cross_entropy")]
    CrossEntropy,
    #[serde(rename = "focal")]
    Focal,
    #[serde(rename = "label_smoothing")]
    LabelSmoothing,
    #[serde(rename = "f1")]
    F1,
}

impl CriterionKind {
    pub const KEYS: [(&'static str, CriterionKind); 4] = [
        ("cross_entropy", CriterionKind::CrossEntropy),
        ("focal", CriterionKind::Focal),
        ("label_smoothing", CriterionKind::LabelSmoothing),
        ("f1", CriterionKind::F1),
    ];

    pub fn from_key(key: &str) -> anyhow::Result<Self> {
        Self::KEYS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown criterion `{key}` (known: {})",
                    Self::KEYS.map(|(name, _)| name).join(", ")
                )
            })
    }

    /// Mean loss of `logits` `[batch, classes]` against class indices.
    pub fn forward<B: Backend>(
        self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let device = logits.device();
        match self {
            CriterionKind::CrossEntropy => CrossEntropyLossConfig::new()
                .init(&device)
                .forward(logits, targets),
            CriterionKind::LabelSmoothing => CrossEntropyLossConfig::new()
                .with_smoothing(Some(LABEL_SMOOTHING))
                .init(&device)
                .forward(logits, targets),
            CriterionKind::Focal => focal_loss(logits, targets, FOCAL_GAMMA),
            CriterionKind::F1 => f1_loss(logits, targets, F1_EPSILON),
        }
    }
}

/// `-mean((1 - p_t)^gamma * log p_t)` over the batch.
pub fn focal_loss<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    gamma: f32,
) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    let log_pt = log_probs.gather(1, targets.unsqueeze_dim(1));
    let pt = log_pt.clone().exp();
    let modulating = pt.neg().add_scalar(1.0).powf_scalar(gamma);
    (modulating * log_pt).mean().neg()
}

/// `1 - mean_c(F1_c)` computed from softmax probabilities.
pub fn f1_loss<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    epsilon: f32,
) -> Tensor<B, 1> {
    let [batch, classes] = logits.dims();
    let device = logits.device();
    let truth = Tensor::<B, 2>::zeros([batch, classes], &device).scatter(
        1,
        targets.unsqueeze_dim(1),
        Tensor::ones([batch, 1], &device),
    );
    let probs = softmax(logits, 1);

    let tp = (truth.clone() * probs.clone()).sum_dim(0);
    let fp = (truth.clone().neg().add_scalar(1.0) * probs.clone()).sum_dim(0);
    let fn_ = (truth * probs.neg().add_scalar(1.0)).sum_dim(0);

    let precision = tp.clone() / (tp.clone() + fp).add_scalar(epsilon);
    let recall = tp.clone() / (tp + fn_).add_scalar(epsilon);
    let f1 = (precision.clone() * recall.clone()).mul_scalar(2.0)
        / (precision + recall).add_scalar(epsilon);
    f1.clamp(epsilon, 1.0 - epsilon).mean().neg().add_scalar(1.0)
}

/// Parts of the joint age loss.
pub struct JointAgeOutput<B: Backend> {
    /// `FINE_LOSS_SCALE * fine + coarse`; the tensor to back-propagate.
    pub total: Tensor<B, 1>,
    pub fine: Tensor<B, 1>,
    pub coarse: Tensor<B, 1>,
}

/// Fine-grained age loss plus a weighted loss on re-bucketed scores.
///
/// The logits are min-max normalized over the whole batch, summed into the
/// three coarse buckets of [`AGE_BUCKETS`], and scored with a class-weighted
/// cross entropy against the coarse labels.
#[derive(Debug, Clone, Copy)]
pub struct JointAgeLoss {
    pub criterion: CriterionKind,
}

impl JointAgeLoss {
    pub fn new(criterion: CriterionKind) -> Self {
        Self { criterion }
    }

    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        fine_targets: Tensor<B, 1, Int>,
        coarse_targets: Tensor<B, 1, Int>,
    ) -> JointAgeOutput<B> {
        let device = logits.device();
        let fine = self.criterion.forward(logits.clone(), fine_targets);

        let buckets = coarse_scores(logits);
        let coarse = CrossEntropyLossConfig::new()
            .with_weights(Some(COARSE_CLASS_WEIGHTS.to_vec()))
            .init(&device)
            .forward(buckets, coarse_targets);

        let total = fine.clone().mul_scalar(FINE_LOSS_SCALE) + coarse.clone();
        JointAgeOutput {
            total,
            fine,
            coarse,
        }
    }
}

/// Min-max normalize `[batch, 11]` logits and sum them into `[batch, 3]`.
pub fn coarse_scores<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, _] = logits.dims();
    let min = logits.clone().min().reshape([1, 1]);
    let max = logits.clone().max().reshape([1, 1]);
    // A constant batch would divide by zero.
    let range = (max - min.clone()).clamp_min(f32::EPSILON);
    let normalized = (logits - min) / range;
    let columns = AGE_BUCKETS
        .iter()
        .map(|bucket| {
            normalized
                .clone()
                .slice([0..batch, bucket.clone()])
                .sum_dim(1)
        })
        .collect();
    Tensor::cat(columns, 1)
}
