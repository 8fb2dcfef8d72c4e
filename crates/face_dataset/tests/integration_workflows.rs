//! Integration tests for end-to-end face_dataset workflows.
//!
//! 1. Folder → index → summary
//! 2. Index → five-fold splits → batch iteration
//! 3. Unlabelled paths → ordered inference batches

use burn_ndarray::NdArray;
use face_dataset::{
    estimate_channel_stats, index_profiles, summarize, AugmentationKind, ChannelStats,
    DatasetConfig, DatasetKind, FaceLoader, Task, NUM_FOLDS,
};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

type B = NdArray<f32>;

const STEMS: [&str; 7] = [
    "mask1",
    "mask2",
    "mask3",
    "mask4",
    "mask5",
    "incorrect_mask",
    "normal",
];

/// Write one profile folder with the seven standard images (8x6 RGB).
fn create_profile(root: &Path, name: &str, shade: u8) -> anyhow::Result<PathBuf> {
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;
    for (i, stem) in STEMS.iter().enumerate() {
        let img = RgbImage::from_pixel(8, 6, Rgb([shade, (i * 20) as u8, 200]));
        img.save(dir.join(format!("{stem}.png")))?;
    }
    Ok(dir)
}

fn synthetic_root(root: &Path) -> anyhow::Result<()> {
    let profiles = [
        "000001_male_Asian_25",
        "000002_female_Asian_45",
        "000003_male_Asian_61",
        "000004_female_Asian_19",
        "000005_male_Asian_33",
    ];
    for (i, name) in profiles.iter().enumerate() {
        create_profile(root, name, (i * 40) as u8)?;
    }
    fs::write(root.join("._000001_male_Asian_25"), b"resource fork")?;
    fs::write(root.join("000001_male_Asian_25").join("notes.txt"), b"ignore me")?;
    Ok(())
}

fn small_config() -> DatasetConfig {
    DatasetConfig {
        target_size: (4, 4),
        seed: Some(3),
        num_workers: Some(2),
        ..Default::default()
    }
}

#[test]
fn workflow_index_and_summarize() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_root(tmp.path())?;

    let records = index_profiles(tmp.path())?;
    assert_eq!(records.len(), 35);
    let summary = summarize(&records);
    assert_eq!(summary.profiles, 5);
    assert_eq!(summary.mask, [25, 5, 5]);
    assert_eq!(summary.gender, [21, 14]);
    assert_eq!(summary.age, [14, 14, 7]);

    let stats = estimate_channel_stats(&records, 3000)?;
    assert!(stats.std.iter().all(|s| *s > 0.0));
    Ok(())
}

#[test]
fn workflow_malformed_profile_fails_fast() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_root(tmp.path())?;
    create_profile(tmp.path(), "bad_folder", 10)?;
    let err = index_profiles(tmp.path()).unwrap_err();
    assert!(err.to_string().contains("bad_folder"));
    Ok(())
}

#[test]
fn workflow_five_fold_batches() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_root(tmp.path())?;
    let records = index_profiles(tmp.path())?;

    let splits = DatasetKind::FiveFold.splits(&records, 0.2, 42);
    assert_eq!(splits.len(), NUM_FOLDS);
    // Five profiles over five folds: one person per validation fold.
    assert!(splits.iter().all(|s| s.val.len() == 7 && s.train.len() == 28));

    let cfg = AugmentationKind::Albu.train_config((4, 4), ChannelStats::default());
    let cfg = DatasetConfig {
        seed: Some(1),
        num_workers: Some(2),
        ..cfg
    };
    let loader = FaceLoader::new(&records, &splits[0].train, 8, cfg)?;
    assert_eq!(loader.num_batches(), 3);

    let device = Default::default();
    let mut iter = loader.epoch(0);
    let mut batches = 0;
    while let Some(batch) = iter.next_batch::<B>(&device)? {
        assert_eq!(batch.images.dims(), [8, 3, 4, 4]);
        assert_eq!(batch.labels.len(), 8);
        let targets = batch.task_targets(Task::All, &device);
        assert_eq!(targets.dims(), [8]);
        let values = batch.target_values(|l| Task::All.select(l));
        assert!(values.iter().all(|v| *v < 18));
        batches += 1;
    }
    assert_eq!(batches, 3);
    Ok(())
}

#[test]
fn workflow_seeded_epochs_are_reproducible() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_root(tmp.path())?;
    let records = index_profiles(tmp.path())?;
    let all: Vec<usize> = (0..records.len()).collect();
    let loader = FaceLoader::new(&records, &all, 5, small_config())?;

    let device = Default::default();
    let first = loader.epoch(2).next_batch::<B>(&device)?.map(|b| b.indices);
    let again = loader.epoch(2).next_batch::<B>(&device)?.map(|b| b.indices);
    assert_eq!(first, again);
    Ok(())
}

#[test]
fn workflow_unlabelled_paths_keep_order() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = create_profile(tmp.path(), "000009_male_Asian_70", 90)?;
    let paths: Vec<PathBuf> = STEMS.iter().map(|s| dir.join(format!("{s}.png"))).collect();
    let cfg = DatasetConfig {
        shuffle: false,
        drop_last: false,
        ..small_config()
    };
    let loader = FaceLoader::from_paths(paths, 4, cfg)?;
    assert_eq!(loader.num_batches(), 2);

    let device = Default::default();
    let mut iter = loader.epoch(0);
    let mut seen = Vec::new();
    while let Some(batch) = iter.next_batch::<B>(&device)? {
        assert!(batch.labels.is_empty());
        seen.extend(batch.indices);
    }
    assert_eq!(seen, (0..7).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn workflow_missing_image_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = DatasetConfig {
        shuffle: false,
        drop_last: false,
        ..small_config()
    };
    let loader = FaceLoader::from_paths(vec![tmp.path().join("absent.png")], 1, cfg)?;
    let device = Default::default();
    assert!(loader.epoch(0).next_batch::<B>(&device).is_err());
    Ok(())
}
