use crate::predictor::{load_classifier, Predictor};
use crate::submission::{read_info, write_submission};
use crate::InferenceBackend;
use clap::Parser;
use cli_support::{resize_from_values, EvalDirArgs, EvalDirOpts};
use face_dataset::{
    ChannelStats, DatasetConfig, FaceLoader, NUM_AGE_CLASSES, NUM_GENDER_CLASSES,
    NUM_MASK_CLASSES, NUM_MULTI_CLASSES,
};
use models::ModelKind;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "infer",
    about = "Predict combined face attribute classes for an evaluation folder"
)]
pub struct InferArgs {
    #[command(flatten)]
    pub dirs: EvalDirArgs,
    /// Classifier over the combined label.
    #[arg(long, conflicts_with_all = ["mask_ckpt", "gender_ckpt", "age_ckpt"])]
    pub checkpoint: Option<PathBuf>,
    #[arg(long, requires_all = ["gender_ckpt", "age_ckpt"])]
    pub mask_ckpt: Option<PathBuf>,
    #[arg(long, requires_all = ["mask_ckpt", "age_ckpt"])]
    pub gender_ckpt: Option<PathBuf>,
    #[arg(long, requires_all = ["mask_ckpt", "gender_ckpt"])]
    pub age_ckpt: Option<PathBuf>,
    /// Output classes of the age head (3 buckets or 11 fine classes).
    #[arg(long, default_value_t = NUM_AGE_CLASSES)]
    pub age_classes: usize,
    /// BaseModel, WideModel or DeepModel.
    #[arg(long, value_parser = ModelKind::from_key, default_value = "BaseModel")]
    pub model: ModelKind,
    /// Output classes of `--checkpoint`.
    #[arg(long, default_value_t = NUM_MULTI_CLASSES)]
    pub num_classes: usize,
    /// Image size as `HEIGHT WIDTH` or `HEIGHTxWIDTH`.
    #[arg(long, num_args = 1..=2, value_names = ["HEIGHT", "WIDTH"], default_values = ["512", "384"])]
    pub resize: Vec<String>,
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,
    /// Per-channel mean, e.g. `0.548,0.504,0.479`.
    #[arg(long, value_delimiter = ',')]
    pub mean: Option<Vec<f32>>,
    /// Per-channel std, e.g. `0.237,0.247,0.246`.
    #[arg(long, value_delimiter = ',')]
    pub std: Option<Vec<f32>>,
    #[arg(long)]
    pub num_workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct InferReport {
    pub output_path: PathBuf,
    pub predictions: Vec<u8>,
}

fn channels(values: &[f32], flag: &str) -> anyhow::Result<[f32; 3]> {
    <[f32; 3]>::try_from(values)
        .map_err(|_| anyhow::anyhow!("--{flag} expects 3 values, got {}", values.len()))
}

impl InferArgs {
    /// `(width, height)` fed to the transform pipeline.
    pub fn target_size(&self) -> anyhow::Result<(u32, u32)> {
        resize_from_values(&self.resize).map_err(anyhow::Error::msg)
    }

    pub fn stats(&self) -> anyhow::Result<ChannelStats> {
        let mut stats = ChannelStats::default();
        if let Some(mean) = &self.mean {
            stats.mean = channels(mean, "mean")?;
        }
        if let Some(std) = &self.std {
            stats.std = channels(std, "std")?;
            if stats.std.iter().any(|s| *s <= 0.0) {
                anyhow::bail!("--std values must be positive");
            }
        }
        Ok(stats)
    }

    fn predictor(
        &self,
        device: &<InferenceBackend as burn::tensor::backend::Backend>::Device,
    ) -> anyhow::Result<Predictor<InferenceBackend>> {
        match (&self.checkpoint, &self.mask_ckpt, &self.gender_ckpt, &self.age_ckpt) {
            (Some(path), None, None, None) => Ok(Predictor::Single(load_classifier(
                path,
                self.model,
                self.num_classes,
                device,
            )?)),
            (None, Some(mask), Some(gender), Some(age)) => Ok(Predictor::MultiHead {
                mask: load_classifier(mask, self.model, NUM_MASK_CLASSES, device)?,
                gender: load_classifier(gender, self.model, NUM_GENDER_CLASSES, device)?,
                age: load_classifier(age, self.model, self.age_classes, device)?,
            }),
            _ => anyhow::bail!(
                "pass either --checkpoint or all of --mask-ckpt, --gender-ckpt and --age-ckpt"
            ),
        }
    }
}

pub fn run_inference(args: InferArgs) -> anyhow::Result<InferReport> {
    let device = <InferenceBackend as burn::tensor::backend::Backend>::Device::default();
    let opts = EvalDirOpts::from(&args.dirs);
    let predictor = args.predictor(&device)?;
    log::info!("{}", predictor.describe());

    let info = read_info(&opts.info_csv)?;
    log::info!("{} images listed in {}", info.len(), opts.info_csv.display());
    let cfg = DatasetConfig {
        target_size: args.target_size()?,
        stats: args.stats()?,
        shuffle: false,
        drop_last: false,
        num_workers: args.num_workers,
        ..DatasetConfig::default()
    };
    let loader = FaceLoader::from_paths(info.image_paths(&opts.image_dir), args.batch_size, cfg)?;

    let mut predictions = Vec::with_capacity(loader.len());
    let mut iter = loader.epoch(0);
    while let Some(batch) = iter.next_batch::<InferenceBackend>(&device)? {
        predictions.extend(predictor.predict(&batch));
    }
    write_submission(&opts.output_path, &info, &predictions)?;
    log::info!("test inference is done; wrote {}", opts.output_path.display());
    Ok(InferReport {
        output_path: opts.output_path,
        predictions,
    })
}
