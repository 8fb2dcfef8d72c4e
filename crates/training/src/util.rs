use crate::loss::CriterionKind;
use crate::optim::OptimizerKind;
use crate::runner::{self, RunReport};
use clap::{Parser, ValueEnum};
use cli_support::{resize_from_values, DataDirArgs, DataDirOpts, SeedArgs};
use face_dataset::{AugmentationKind, ChannelStats, DatasetKind, Task};
use models::ModelKind;
use serde::Serialize;
use std::path::PathBuf;

/// Which training loop to run.
#[derive(ValueEnum, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// One classifier per fold over five person-disjoint folds.
    Kfold,
    /// Fine-grained age classifier trained with the joint age loss.
    Age,
    /// Independent mask, gender and age classifiers combined at prediction.
    MultiHead,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "train",
    about = "Train face attribute classifiers (5-fold, joint age loss, or multi-head)"
)]
pub struct TrainArgs {
    #[arg(long, value_enum, default_value_t = Mode::Kfold)]
    pub mode: Mode,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    #[command(flatten)]
    pub dirs: DataDirArgs,
    #[command(flatten)]
    pub seed: SeedArgs,
    /// Number of epochs (kfold 2, age 30, multi-head 50).
    #[arg(long)]
    pub epochs: Option<usize>,
    /// MaskBaseDataset, MaskSplitByProfileDataset, AgeBaseDataset or My5foldDataset.
    #[arg(long, value_parser = DatasetKind::from_key)]
    pub dataset: Option<DatasetKind>,
    /// BaseAugmentation, CustomAugmentation or AlbuAugmentation.
    #[arg(long, value_parser = AugmentationKind::from_key)]
    pub augmentation: Option<AugmentationKind>,
    /// Label trained by the kfold loop: all, mask, gender or age.
    #[arg(long, value_parser = Task::from_key, default_value = "all")]
    pub task: Task,
    /// Image size as `HEIGHT WIDTH` or `HEIGHTxWIDTH` (kfold/multi-head
    /// 512 384, age 256 192).
    #[arg(long, num_args = 1..=2, value_names = ["HEIGHT", "WIDTH"])]
    pub resize: Option<Vec<String>>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub valid_batch_size: Option<usize>,
    /// BaseModel, WideModel or DeepModel.
    #[arg(long, value_parser = ModelKind::from_key, default_value = "BaseModel")]
    pub model: ModelKind,
    /// Adam, AdamW or SGD.
    #[arg(long, value_parser = OptimizerKind::from_key, default_value = "Adam")]
    pub optimizer: OptimizerKind,
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,
    /// Fraction held out for validation (kfold/age 0.2, multi-head 0.1).
    #[arg(long)]
    pub val_ratio: Option<f32>,
    /// cross_entropy, focal, label_smoothing or f1.
    #[arg(long, value_parser = CriterionKind::from_key, default_value = "cross_entropy")]
    pub criterion: CriterionKind,
    /// Epochs between learning-rate halvings.
    #[arg(long, default_value_t = 20)]
    pub lr_decay_step: usize,
    /// Batches between training log lines (kfold 100, age 20, multi-head 20).
    #[arg(long)]
    pub log_interval: Option<usize>,
    /// Run directory name under the model dir.
    #[arg(long)]
    pub name: Option<String>,
    /// Recompute channel mean/std from up to 3000 training images.
    #[arg(long, default_value_t = false)]
    pub calc_statistics: bool,
    /// Decoder threads (defaults to half the available cores).
    #[arg(long)]
    pub num_workers: Option<usize>,
    /// Initial weights: a checkpoint file, or for multi-head a directory
    /// holding `mask_best.bin`, `gender_best.bin` and `age_best.bin`.
    #[arg(long)]
    pub pretrained: Option<PathBuf>,
}

/// Fully resolved training settings; written to `config.json`.
#[derive(Debug, Clone, Serialize)]
pub struct TrainConfig {
    pub mode: Mode,
    #[serde(flatten)]
    pub dirs: DataDirOpts,
    pub seed: u64,
    pub epochs: usize,
    pub dataset: DatasetKind,
    pub augmentation: AugmentationKind,
    pub task: Task,
    /// (width, height)
    pub resize: (u32, u32),
    pub batch_size: usize,
    pub valid_batch_size: usize,
    pub model: ModelKind,
    pub optimizer: OptimizerKind,
    pub lr: f64,
    pub val_ratio: f32,
    pub criterion: CriterionKind,
    pub lr_decay_step: usize,
    pub log_interval: usize,
    pub name: String,
    pub calc_statistics: bool,
    pub stats: ChannelStats,
    pub num_workers: Option<usize>,
    pub pretrained: Option<PathBuf>,
}

struct ModeDefaults {
    epochs: usize,
    dataset: DatasetKind,
    augmentation: AugmentationKind,
    resize: (u32, u32),
    batch_size: usize,
    val_ratio: f32,
    log_interval: usize,
    name: &'static str,
}

impl Mode {
    fn defaults(self) -> ModeDefaults {
        match self {
            Mode::Kfold => ModeDefaults {
                epochs: 2,
                dataset: DatasetKind::FiveFold,
                augmentation: AugmentationKind::Albu,
                resize: (384, 512),
                batch_size: 12,
                val_ratio: 0.2,
                log_interval: 100,
                name: "5fold",
            },
            Mode::Age => ModeDefaults {
                epochs: 30,
                dataset: DatasetKind::AgeBase,
                augmentation: AugmentationKind::Base,
                resize: (192, 256),
                batch_size: 32,
                val_ratio: 0.2,
                log_interval: 20,
                name: "age",
            },
            Mode::MultiHead => ModeDefaults {
                epochs: 50,
                dataset: DatasetKind::MaskBase,
                augmentation: AugmentationKind::Base,
                resize: (384, 512),
                batch_size: 32,
                val_ratio: 0.1,
                log_interval: 20,
                name: "multi_head",
            },
        }
    }
}

/// Run directory name; kfold runs are kept apart per task.
fn run_name(mode: Mode, base: &str, task: Task) -> String {
    match mode {
        Mode::Kfold => format!("{base}_{}", task.key()),
        Mode::Age | Mode::MultiHead => base.to_string(),
    }
}

impl TrainArgs {
    pub fn resolve(&self) -> anyhow::Result<TrainConfig> {
        let d = self.mode.defaults();
        let batch_size = self.batch_size.unwrap_or(d.batch_size);
        let resize = match &self.resize {
            Some(values) => resize_from_values(values).map_err(anyhow::Error::msg)?,
            None => d.resize,
        };
        let cfg = TrainConfig {
            mode: self.mode,
            dirs: DataDirOpts::from(&self.dirs),
            seed: self.seed.seed,
            epochs: self.epochs.unwrap_or(d.epochs),
            dataset: self.dataset.unwrap_or(d.dataset),
            augmentation: self.augmentation.unwrap_or(d.augmentation),
            task: self.task,
            resize,
            batch_size,
            valid_batch_size: self.valid_batch_size.unwrap_or(batch_size),
            model: self.model,
            optimizer: self.optimizer,
            lr: self.lr,
            val_ratio: self.val_ratio.unwrap_or(d.val_ratio),
            criterion: self.criterion,
            lr_decay_step: self.lr_decay_step,
            log_interval: self.log_interval.unwrap_or(d.log_interval).max(1),
            name: run_name(self.mode, self.name.as_deref().unwrap_or(d.name), self.task),
            calc_statistics: self.calc_statistics,
            stats: ChannelStats::default(),
            num_workers: self.num_workers,
            pretrained: self.pretrained.clone(),
        };
        if cfg.batch_size == 0 || cfg.valid_batch_size == 0 {
            anyhow::bail!("batch sizes must be positive");
        }
        if !(0.0..1.0).contains(&cfg.val_ratio) {
            anyhow::bail!("--val-ratio must be in [0, 1), got {}", cfg.val_ratio);
        }
        if cfg.mode == Mode::Age && cfg.dataset != DatasetKind::AgeBase {
            log::warn!(
                "age mode trains on fine age labels; --dataset {} only changes the split",
                cfg.dataset.key()
            );
        }
        Ok(cfg)
    }
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<RunReport> {
    validate_backend_choice(args.backend)?;
    let cfg = args.resolve()?;
    log::info!("{cfg:?}");
    runner::run(cfg)
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            log::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> TrainArgs {
        let mut argv = vec!["train", "--data-dir", "/data", "--model-dir", "/models"];
        argv.extend_from_slice(extra);
        TrainArgs::parse_from(argv)
    }

    #[test]
    fn mode_defaults_fill_unset_flags() {
        let kfold = parse(&[]).resolve().unwrap();
        assert_eq!(kfold.epochs, 2);
        assert_eq!(kfold.dataset, DatasetKind::FiveFold);
        assert_eq!(kfold.resize, (384, 512));
        assert_eq!(kfold.batch_size, 12);
        assert_eq!(kfold.valid_batch_size, 12);
        assert_eq!(kfold.log_interval, 100);
        assert_eq!(kfold.name, "5fold_all");
        let masked = parse(&["--task", "mask", "--name", "exp"]).resolve().unwrap();
        assert_eq!(masked.name, "exp_mask");

        let age = parse(&["--mode", "age", "--batch-size", "8"]).resolve().unwrap();
        assert_eq!(age.epochs, 30);
        assert_eq!(age.dataset, DatasetKind::AgeBase);
        assert_eq!(age.resize, (192, 256));
        assert_eq!(age.batch_size, 8);
        assert_eq!(age.valid_batch_size, 8);

        let heads = parse(&["--mode", "multi-head", "--resize", "128x96"]).resolve().unwrap();
        assert_eq!(heads.val_ratio, 0.1);
        assert_eq!(heads.resize, (96, 128));
        assert_eq!(heads.name, "multi_head");

        let two = parse(&["--resize", "300", "200", "--lr", "0.01"]).resolve().unwrap();
        assert_eq!(two.resize, (200, 300));
        assert_eq!(two.lr, 0.01);
        assert!(parse(&["--resize", "300", "x"]).resolve().is_err());
    }

    #[test]
    fn unknown_registry_keys_fail_at_parse_time() {
        let mut argv = vec!["train"];
        argv.extend(["--model", "EfficientnetB4"]);
        let err = TrainArgs::try_parse_from(argv).unwrap_err();
        assert!(err.to_string().contains("unknown model"));

        let err = TrainArgs::try_parse_from(["train", "--dataset", "Coco"]).unwrap_err();
        assert!(err.to_string().contains("unknown dataset"));

        let err = TrainArgs::try_parse_from(["train", "--criterion", "hinge"]).unwrap_err();
        assert!(err.to_string().contains("unknown criterion"));
    }

    #[test]
    fn resolved_config_serializes_registry_keys() {
        let cfg = parse(&["--optimizer", "SGD", "--augmentation", "CustomAugmentation"])
            .resolve()
            .unwrap();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["mode"], "kfold");
        assert_eq!(json["optimizer"], "SGD");
        assert_eq!(json["augmentation"], "CustomAugmentation");
        assert_eq!(json["dataset"], "My5foldDataset");
        assert_eq!(json["model"], "BaseModel");
        assert_eq!(json["criterion"], "cross_entropy");
        assert_eq!(json["data_dir"], "/data");
    }
}
