use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_TRAIN_DIR: &str = "/opt/ml/input/data/train/images";
pub const DEFAULT_MODEL_DIR: &str = "./model";
pub const DEFAULT_EVAL_DIR: &str = "/opt/ml/input/data/eval";

/// Container data/model directories; flags override the environment.
#[derive(Debug, Clone, Args)]
pub struct DataDirArgs {
    /// Folder of `<id>_<gender>_<race>_<age>` profile directories.
    #[arg(long, env = "SM_CHANNEL_TRAIN", default_value = DEFAULT_TRAIN_DIR)]
    pub data_dir: PathBuf,
    /// Runs are written under `<model_dir>/<name>`.
    #[arg(long, env = "SM_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
    pub model_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataDirOpts {
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
}

impl From<&DataDirArgs> for DataDirOpts {
    fn from(args: &DataDirArgs) -> Self {
        DataDirOpts {
            data_dir: args.data_dir.clone(),
            model_dir: args.model_dir.clone(),
        }
    }
}

/// Evaluation folder layout and submission destination.
#[derive(Debug, Clone, Args)]
pub struct EvalDirArgs {
    /// Folder holding `info.csv` and the image subdirectory.
    #[arg(long, env = "SM_CHANNEL_EVAL", default_value = DEFAULT_EVAL_DIR)]
    pub eval_dir: PathBuf,
    /// Image subdirectory of the evaluation folder.
    #[arg(long, default_value = "images")]
    pub image_subdir: String,
    /// Directory the submission file is written into.
    #[arg(long, env = "SM_OUTPUT_DATA_DIR", default_value = "./output")]
    pub output_dir: PathBuf,
    #[arg(long, default_value = "submission.csv")]
    pub output_name: String,
}

#[derive(Debug, Clone)]
pub struct EvalDirOpts {
    pub info_csv: PathBuf,
    pub image_dir: PathBuf,
    pub output_path: PathBuf,
}

impl From<&EvalDirArgs> for EvalDirOpts {
    fn from(args: &EvalDirArgs) -> Self {
        EvalDirOpts {
            info_csv: args.eval_dir.join("info.csv"),
            image_dir: args.eval_dir.join(&args.image_subdir),
            output_path: args.output_dir.join(&args.output_name),
        }
    }
}

#[derive(Debug, Clone, Copy, Args)]
pub struct SeedArgs {
    /// Seeds the backend, shuffles and augmentations.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Parse `HxW` (or `H,W`) into `(width, height)` as the image pipeline expects.
pub fn parse_resize(value: &str) -> Result<(u32, u32), String> {
    let (h, w) = value
        .split_once(['x', 'X', ','])
        .ok_or_else(|| format!("expected HEIGHTxWIDTH, got `{value}`"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| format!("invalid size `{s}` in `{value}`"))
    };
    Ok((parse(w)?, parse(h)?))
}

/// Values of a `--resize` flag: `H W`, or one `HxW` / `H,W` token.
pub fn resize_from_values(values: &[String]) -> Result<(u32, u32), String> {
    match values {
        [single] => parse_resize(single),
        [h, w] => parse_resize(&format!("{h}x{w}")),
        _ => Err(format!(
            "--resize expects HEIGHT WIDTH, got {} values",
            values.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        dirs: DataDirArgs,
        #[command(flatten)]
        eval: EvalDirArgs,
    }

    #[test]
    fn resize_is_height_then_width() {
        assert_eq!(parse_resize("512x384"), Ok((384, 512)));
        assert_eq!(parse_resize("256,192"), Ok((192, 256)));
        assert!(parse_resize("512").is_err());
        assert!(parse_resize("0x10").is_err());
    }

    #[test]
    fn resize_accepts_two_values() {
        let values = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(resize_from_values(&values(&["512", "384"])), Ok((384, 512)));
        assert_eq!(resize_from_values(&values(&["256x192"])), Ok((192, 256)));
        assert!(resize_from_values(&values(&[])).is_err());
        assert!(resize_from_values(&values(&["1", "2", "3"])).is_err());
        assert!(resize_from_values(&values(&["512", "wide"])).is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "prog",
            "--data-dir",
            "/data/train",
            "--model-dir",
            "/tmp/models",
            "--eval-dir",
            "/data/eval",
            "--image-subdir",
            "rmbg_images",
        ]);
        let dirs = DataDirOpts::from(&cli.dirs);
        assert_eq!(dirs.data_dir, PathBuf::from("/data/train"));
        assert_eq!(dirs.model_dir, PathBuf::from("/tmp/models"));
        let eval = EvalDirOpts::from(&cli.eval);
        assert_eq!(eval.info_csv, PathBuf::from("/data/eval/info.csv"));
        assert_eq!(eval.image_dir, PathBuf::from("/data/eval/rmbg_images"));
        assert!(eval.output_path.ends_with("submission.csv"));
    }
}
