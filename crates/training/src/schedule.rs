//! Per-epoch learning-rate schedule.

/// Step decay: the rate is multiplied by `gamma` every `step_size` epochs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLr {
    pub initial: f64,
    pub step_size: usize,
    pub gamma: f64,
}

pub const DEFAULT_LR_GAMMA: f64 = 0.5;

impl StepLr {
    pub fn new(initial: f64, step_size: usize) -> Self {
        Self {
            initial,
            step_size: step_size.max(1),
            gamma: DEFAULT_LR_GAMMA,
        }
    }

    /// Learning rate used during zero-based `epoch`.
    pub fn lr(&self, epoch: usize) -> f64 {
        self.initial * self.gamma.powi((epoch / self.step_size) as i32)
    }
}
