//! Best-score tracking and Burn record files in a run directory.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use std::path::{Path, PathBuf};

/// Which validation scores improved on the best seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Improvement {
    pub f1: bool,
    pub loss: bool,
    pub accuracy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestTracker {
    pub best_f1: f32,
    pub best_loss: f32,
    pub best_accuracy: f32,
}

impl Default for BestTracker {
    fn default() -> Self {
        Self {
            best_f1: 0.0,
            best_loss: f32::INFINITY,
            best_accuracy: 0.0,
        }
    }
}

impl BestTracker {
    /// F1 must strictly improve; a tie keeps the earlier checkpoint.
    pub fn observe(&mut self, f1: f32, loss: f32, accuracy: f32) -> Improvement {
        let improved = Improvement {
            f1: f1 > self.best_f1,
            loss: loss < self.best_loss,
            accuracy: accuracy > self.best_accuracy,
        };
        if improved.f1 {
            self.best_f1 = f1;
        }
        if improved.loss {
            self.best_loss = loss;
        }
        if improved.accuracy {
            self.best_accuracy = accuracy;
        }
        improved
    }
}

/// Writes module records as `<dir>/<name>.bin`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        // Names may contain dots (formatted scores), so append rather than
        // replace the extension.
        self.dir.join(format!("{name}.bin"))
    }

    pub fn save<B: Backend, M: Module<B>>(&self, model: &M, name: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(name);
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(path.clone(), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))?;
        log::debug!("saved checkpoint {}", path.display());
        Ok(path)
    }

    /// Always rewrite `<prefix>last`; rewrite `<prefix>best` only when F1 improved.
    pub fn save_best_and_last<B: Backend, M: Module<B>>(
        &self,
        model: &M,
        prefix: &str,
        improved: Improvement,
    ) -> anyhow::Result<()> {
        if improved.f1 {
            self.save(model, &format!("{prefix}best"))?;
        }
        self.save(model, &format!("{prefix}last"))?;
        Ok(())
    }
}

/// `<model>_<fold>_<epoch>_<f1>_<loss>` with four decimals.
pub fn epoch_checkpoint_name(model: &str, fold: usize, epoch: usize, f1: f32, loss: f32) -> String {
    format!("{model}_{fold}_{epoch}_{f1:.4}_{loss:.4}")
}

pub fn load_checkpoint<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<M> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))
}
