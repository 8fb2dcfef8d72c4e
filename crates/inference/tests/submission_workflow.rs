use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use clap::Parser;
use image::{Rgb, RgbImage};
use inference::{run_inference, InferArgs, InferenceBackend};
use models::ModelKind;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGES: [&str; 5] = ["e.png", "a.png", "c.png", "b.png", "d.png"];

fn eval_dir(root: &Path) -> anyhow::Result<PathBuf> {
    let dir = root.join("eval");
    fs::create_dir_all(dir.join("images"))?;
    let mut info = String::from("ImageID,ans\n");
    for (i, name) in IMAGES.iter().enumerate() {
        RgbImage::from_pixel(12, 16, Rgb([(i * 50) as u8, 90, 30]))
            .save(dir.join("images").join(name))?;
        info.push_str(&format!("{name},0\n"));
    }
    fs::write(dir.join("info.csv"), info)?;
    Ok(dir)
}

fn save_fresh(path: &Path, classes: usize) -> anyhow::Result<()> {
    let device = Default::default();
    ModelKind::Base
        .build::<InferenceBackend>(classes, &device)
        .save_file(path.to_path_buf(), &BinFileRecorder::<FullPrecisionSettings>::new())?;
    Ok(())
}

fn base_args(eval: &Path, out: &Path) -> Vec<String> {
    [
        "infer",
        "--eval-dir",
        &eval.display().to_string(),
        "--output-dir",
        &out.display().to_string(),
        "--resize",
        "16x12",
        "--batch-size",
        "2",
        "--num-workers",
        "1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn answers(path: &Path) -> anyhow::Result<Vec<(String, u8)>> {
    let mut reader = csv::Reader::from_path(path)?;
    assert_eq!(reader.headers()?.iter().collect::<Vec<_>>(), vec!["ImageID", "ans"]);
    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row?;
        rows.push((row[0].to_string(), row[1].parse()?));
    }
    Ok(rows)
}

#[test]
fn single_checkpoint_writes_one_answer_per_row_in_order() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let eval = eval_dir(tmp.path())?;
    let ckpt = tmp.path().join("best.bin");
    save_fresh(&ckpt, 18)?;

    let mut argv = base_args(&eval, &tmp.path().join("output"));
    argv.extend(["--checkpoint".to_string(), ckpt.display().to_string()]);
    let report = run_inference(InferArgs::parse_from(argv))?;

    assert_eq!(report.predictions.len(), IMAGES.len());
    let rows = answers(&report.output_path)?;
    let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, IMAGES);
    assert!(rows.iter().all(|(_, ans)| *ans < 18));
    Ok(())
}

#[test]
fn three_heads_combine_into_one_label() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let eval = eval_dir(tmp.path())?;
    let heads = [("mask", 3), ("gender", 2), ("age", 11)];
    for (name, classes) in heads {
        save_fresh(&tmp.path().join(format!("{name}_best.bin")), classes)?;
    }

    let mut argv = base_args(&eval, &tmp.path().join("output"));
    for (name, _) in heads {
        argv.push(format!("--{name}-ckpt"));
        argv.push(tmp.path().join(format!("{name}_best.bin")).display().to_string());
    }
    argv.extend(["--age-classes".to_string(), "11".to_string()]);
    let report = run_inference(InferArgs::parse_from(argv))?;

    let rows = answers(&report.output_path)?;
    assert_eq!(rows.len(), IMAGES.len());
    assert!(rows.iter().all(|(_, ans)| *ans < 18));
    Ok(())
}

#[test]
fn missing_image_fails_the_run() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let eval = eval_dir(tmp.path())?;
    fs::remove_file(eval.join("images").join("c.png"))?;
    let ckpt = tmp.path().join("best.bin");
    save_fresh(&ckpt, 18)?;

    let out = tmp.path().join("output");
    let mut argv = base_args(&eval, &out);
    argv.extend(["--checkpoint".to_string(), ckpt.display().to_string()]);
    assert!(run_inference(InferArgs::parse_from(argv)).is_err());
    assert!(!out.join("submission.csv").exists());
    Ok(())
}
