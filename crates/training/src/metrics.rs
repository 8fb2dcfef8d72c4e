//! Host-side classification metrics.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Macro-averaged F1 over the classes that occur in `targets` or `preds`.
///
/// A class with no true positives scores 0. Empty input scores 0.
pub fn macro_f1(targets: &[u8], preds: &[u8], num_classes: usize) -> f32 {
    let mut tp = vec![0usize; num_classes];
    let mut fp = vec![0usize; num_classes];
    let mut fn_ = vec![0usize; num_classes];
    let mut present = vec![false; num_classes];
    for (&t, &p) in targets.iter().zip(preds) {
        let (t, p) = (t as usize, p as usize);
        if t >= num_classes || p >= num_classes {
            continue;
        }
        present[t] = true;
        present[p] = true;
        if t == p {
            tp[t] += 1;
        } else {
            fp[p] += 1;
            fn_[t] += 1;
        }
    }
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for c in (0..num_classes).filter(|&c| present[c]) {
        count += 1;
        let denom = 2 * tp[c] + fp[c] + fn_[c];
        if denom > 0 {
            sum += (2 * tp[c]) as f32 / denom as f32;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

pub fn count_matches(targets: &[u8], preds: &[u8]) -> usize {
    targets.iter().zip(preds).filter(|(t, p)| t == p).count()
}

pub fn accuracy(targets: &[u8], preds: &[u8]) -> f32 {
    if targets.is_empty() {
        return 0.0;
    }
    count_matches(targets, preds) as f32 / targets.len() as f32
}

/// First element of a loss tensor.
pub fn scalar<B: Backend>(loss: Tensor<B, 1>) -> f32 {
    loss.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    pub loss: f32,
    pub accuracy: f32,
    pub f1: f32,
}

/// Running totals over a logging interval of training batches.
#[derive(Debug, Clone, Default)]
pub struct MetricWindow {
    loss_sum: f32,
    matches: usize,
    samples: usize,
    f1_sum: f32,
    batches: usize,
    loss_batches: usize,
}

impl MetricWindow {
    /// Record one batch; its F1 enters the window as a per-batch score.
    pub fn push(&mut self, loss: f32, targets: &[u8], preds: &[u8], num_classes: usize) {
        self.loss_sum += loss;
        self.loss_batches += 1;
        self.push_predictions(targets, preds, num_classes);
    }

    /// Record a batch that has predictions but no loss of its own.
    pub fn push_predictions(&mut self, targets: &[u8], preds: &[u8], num_classes: usize) {
        self.matches += count_matches(targets, preds);
        self.samples += targets.len();
        self.f1_sum += macro_f1(targets, preds, num_classes);
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn summary(&self) -> WindowSummary {
        let batches = self.batches.max(1) as f32;
        WindowSummary {
            loss: self.loss_sum / self.loss_batches.max(1) as f32,
            accuracy: if self.samples == 0 {
                0.0
            } else {
                self.matches as f32 / self.samples as f32
            },
            f1: self.f1_sum / batches,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
