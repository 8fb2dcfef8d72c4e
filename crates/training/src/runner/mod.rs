//! Training loops: `Init -> (train epoch -> validate epoch) x N -> Done`.

mod age;
mod kfold;
mod multi_head;

use crate::checkpoint::{load_checkpoint, BestTracker, CheckpointStore};
use crate::metrics::{accuracy, macro_f1};
use crate::run_dir::{increment_path, write_config, MetricsSink};
use crate::util::{Mode, TrainConfig};
use crate::{ADBackend, TrainBackend};
use burn::tensor::backend::Backend;
use face_dataset::{
    estimate_channel_stats, index_profiles, summarize, DatasetConfig, FaceLoader, FaceRecord,
    Split,
};
use models::{FaceClassifier, ModelKind};
use std::fs;
use std::path::{Path, PathBuf};

/// Images sampled when recomputing channel statistics.
pub const STATS_SAMPLE_LIMIT: usize = 3000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub f1: f32,
}

#[derive(Debug, Clone)]
pub struct FoldReport {
    pub fold: usize,
    pub best: BestTracker,
    pub last: Option<EpochReport>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_dir: PathBuf,
    pub folds: Vec<FoldReport>,
}

pub(crate) struct RunContext {
    pub cfg: TrainConfig,
    pub store: CheckpointStore,
    pub sink: MetricsSink,
    pub device: <TrainBackend as Backend>::Device,
}

pub fn run(mut cfg: TrainConfig) -> anyhow::Result<RunReport> {
    let device = <TrainBackend as Backend>::Device::default();
    ADBackend::seed(cfg.seed);

    let records = index_profiles(&cfg.dirs.data_dir)?;
    if records.is_empty() {
        anyhow::bail!("no images found under {}", cfg.dirs.data_dir.display());
    }
    let summary = summarize(&records);
    log::info!(
        "indexed {} images of {} profiles (mask {:?}, gender {:?}, age {:?})",
        summary.images,
        summary.profiles,
        summary.mask,
        summary.gender,
        summary.age
    );
    if cfg.calc_statistics {
        cfg.stats = estimate_channel_stats(&records, STATS_SAMPLE_LIMIT)?;
        log::info!("channel stats: mean {:?} std {:?}", cfg.stats.mean, cfg.stats.std);
    }

    let run_dir = increment_path(&cfg.dirs.model_dir.join(&cfg.name))?;
    fs::create_dir_all(&run_dir)?;
    write_config(&run_dir, &cfg)?;
    log::info!("writing run to {}", run_dir.display());

    let splits = cfg.dataset.splits(&records, cfg.val_ratio, cfg.seed);
    let optimizer = cfg.optimizer;
    let mode = cfg.mode;
    let mut ctx = RunContext {
        store: CheckpointStore::new(&run_dir),
        sink: MetricsSink::open(&run_dir)?,
        cfg,
        device,
    };

    let folds = match mode {
        Mode::Kfold => optimizer.dispatch::<ADBackend, _>(kfold::KFoldLoop {
            ctx: &mut ctx,
            records: &records,
            splits: &splits,
        })?,
        Mode::Age => {
            let split = first_split(&splits)?;
            vec![optimizer.dispatch::<ADBackend, _>(age::AgeLoop {
                ctx: &mut ctx,
                records: &records,
                split,
            })?]
        }
        Mode::MultiHead => {
            let split = first_split(&splits)?;
            vec![optimizer.dispatch::<ADBackend, _>(multi_head::MultiHeadLoop {
                ctx: &mut ctx,
                records: &records,
                split,
            })?]
        }
    };
    ctx.sink.flush()?;
    Ok(RunReport { run_dir, folds })
}

fn first_split(splits: &[Split]) -> anyhow::Result<&Split> {
    if splits.len() > 1 {
        log::warn!("{} folds available; training on the first", splits.len());
    }
    splits
        .first()
        .ok_or_else(|| anyhow::anyhow!("dataset produced no splits"))
}

/// Augmented shuffled train loader and a deterministic validation loader.
pub(crate) fn build_loaders(
    cfg: &TrainConfig,
    records: &[FaceRecord],
    split: &Split,
) -> anyhow::Result<(FaceLoader, FaceLoader)> {
    let train_cfg = DatasetConfig {
        seed: Some(cfg.seed),
        num_workers: cfg.num_workers,
        ..cfg.augmentation.train_config(cfg.resize, cfg.stats)
    };
    let val_cfg = DatasetConfig {
        drop_last: false,
        ..train_cfg.for_eval()
    };
    let train = FaceLoader::new(records, &split.train, cfg.batch_size, train_cfg)?;
    let val = FaceLoader::new(records, &split.val, cfg.valid_batch_size, val_cfg)?;
    if train.num_batches() == 0 {
        anyhow::bail!(
            "training split has {} images, fewer than one batch of {}",
            train.len(),
            cfg.batch_size
        );
    }
    if val.is_empty() {
        log::warn!("validation split is empty; no best checkpoint will be selected");
    }
    log::info!(
        "train: {} images / {} batches, val: {} images",
        train.len(),
        train.num_batches(),
        val.len()
    );
    Ok((train, val))
}

pub(crate) fn init_model(
    kind: ModelKind,
    num_classes: usize,
    device: &<ADBackend as Backend>::Device,
    pretrained: Option<&Path>,
) -> anyhow::Result<FaceClassifier<ADBackend>> {
    let model = kind.build::<ADBackend>(num_classes, device);
    match pretrained {
        Some(path) => {
            log::info!("loading initial weights from {}", path.display());
            load_checkpoint(model, path, device)
        }
        None => Ok(model),
    }
}

/// Aggregated validation scores for one head.
#[derive(Debug, Clone, Default)]
pub(crate) struct Collected {
    pub losses: Vec<f32>,
    pub targets: Vec<u8>,
    pub preds: Vec<u8>,
}

impl Collected {
    pub fn push(&mut self, loss: f32, targets: &[u8], preds: &[u8]) {
        self.losses.push(loss);
        self.targets.extend_from_slice(targets);
        self.preds.extend_from_slice(preds);
    }

    /// Mean batch loss, sample accuracy, and F1 over the whole split.
    pub fn report(&self, epoch: usize, num_classes: usize) -> EpochReport {
        let loss = if self.losses.is_empty() {
            0.0
        } else {
            self.losses.iter().sum::<f32>() / self.losses.len() as f32
        };
        EpochReport {
            epoch,
            loss,
            accuracy: accuracy(&self.targets, &self.preds),
            f1: macro_f1(&self.targets, &self.preds, num_classes),
        }
    }
}
