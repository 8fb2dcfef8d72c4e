//! Indexing a face image folder and reading its images.

use crate::labels::{GenderLabel, MaskLabel};
use crate::types::{ChannelStats, DatasetResult, DatasetSummary, FaceDatasetError, FaceRecord};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "ppm"];

/// Fields parsed from a profile directory name `<id>_<gender>_<race>_<age>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileInfo {
    pub id: String,
    pub gender: GenderLabel,
    pub race: String,
    pub age_years: u32,
}

pub fn parse_profile_dir(name: &str, path: &Path) -> DatasetResult<ProfileInfo> {
    let invalid = |msg: String| FaceDatasetError::Metadata {
        path: path.to_path_buf(),
        msg,
    };
    let parts: Vec<&str> = name.split('_').collect();
    let [id, gender, race, age] = parts.as_slice() else {
        return Err(invalid(format!(
            "expected <id>_<gender>_<race>_<age>, got `{name}`"
        )));
    };
    let gender = GenderLabel::parse(gender)
        .ok_or_else(|| invalid(format!("unknown gender `{gender}`")))?;
    let age_years = age
        .parse::<u32>()
        .map_err(|e| invalid(format!("age `{age}` is not an integer: {e}")))?;
    Ok(ProfileInfo {
        id: id.to_string(),
        gender,
        race: race.to_string(),
        age_years,
    })
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Scan `root` for profile directories and index every labelled image.
///
/// The result is sorted by path so splits built on it are reproducible.
pub fn index_profiles(root: &Path) -> DatasetResult<Vec<FaceRecord>> {
    let io_err = |path: &Path, source| FaceDatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut records = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| io_err(root, e))? {
        let entry = entry.map_err(|e| io_err(root, e))?;
        let profile_path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) || !profile_path.is_dir() {
            continue;
        }
        let info = parse_profile_dir(&name, &profile_path)?;
        for image in fs::read_dir(&profile_path).map_err(|e| io_err(&profile_path, e))? {
            let image = image.map_err(|e| io_err(&profile_path, e))?;
            let image_path = image.path();
            let file_name = image.file_name().to_string_lossy().into_owned();
            if is_hidden(&file_name) || !is_image(&image_path) {
                continue;
            }
            let stem = image_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let mask = MaskLabel::from_stem(stem).ok_or_else(|| FaceDatasetError::Metadata {
                path: image_path.clone(),
                msg: format!("unknown mask image stem `{stem}`"),
            })?;
            records.push(FaceRecord {
                path: image_path,
                profile: name.clone(),
                mask,
                gender: info.gender,
                age_years: info.age_years,
            });
        }
    }
    records.sort_by(|a, b| a.path.cmp(&b.path));
    log::debug!("indexed {} images under {}", records.len(), root.display());
    Ok(records)
}

pub fn summarize(records: &[FaceRecord]) -> DatasetSummary {
    let mut summary = DatasetSummary {
        images: records.len(),
        ..Default::default()
    };
    let mut profiles = BTreeSet::new();
    for record in records {
        let labels = record.labels();
        summary.mask[labels.mask as usize] += 1;
        summary.gender[labels.gender as usize] += 1;
        summary.age[labels.age as usize] += 1;
        profiles.insert(record.profile.as_str());
    }
    summary.profiles = profiles.len();
    summary
}

pub fn load_rgb(path: &Path) -> DatasetResult<image::RgbImage> {
    Ok(image::open(path)
        .map_err(|e| FaceDatasetError::Image {
            path: path.to_path_buf(),
            source: e,
        })?
        .to_rgb8())
}

/// Estimate channel mean/std from at most `max_images` images.
pub fn estimate_channel_stats(
    records: &[FaceRecord],
    max_images: usize,
) -> DatasetResult<ChannelStats> {
    let mut sums = [0f64; 3];
    let mut squared = [0f64; 3];
    let mut count = 0usize;
    for record in records.iter().take(max_images) {
        let img = load_rgb(&record.path)?;
        let pixels = (img.width() as f64 * img.height() as f64).max(1.0);
        let mut mean = [0f64; 3];
        let mut sq = [0f64; 3];
        for pixel in img.pixels() {
            for c in 0..3 {
                let v = pixel[c] as f64 / 255.0;
                mean[c] += v;
                sq[c] += v * v;
            }
        }
        for c in 0..3 {
            sums[c] += mean[c] / pixels;
            squared[c] += sq[c] / pixels;
        }
        count += 1;
    }
    if count == 0 {
        return Err(FaceDatasetError::Other(
            "cannot estimate channel stats from an empty dataset".to_string(),
        ));
    }
    let mut stats = ChannelStats::default();
    for c in 0..3 {
        let mean = sums[c] / count as f64;
        let var = (squared[c] / count as f64 - mean * mean).max(0.0);
        stats.mean[c] = mean as f32;
        stats.std[c] = (var.sqrt() as f32).max(1e-6);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_profile_directory_names() {
        let info = parse_profile_dir("000004_male_Asian_54", Path::new("x")).unwrap();
        assert_eq!(info.id, "000004");
        assert_eq!(info.gender, GenderLabel::Male);
        assert_eq!(info.race, "Asian");
        assert_eq!(info.age_years, 54);

        assert!(parse_profile_dir("000004_male_Asian", Path::new("x")).is_err());
        assert!(parse_profile_dir("000004_robot_Asian_54", Path::new("x")).is_err());
        assert!(parse_profile_dir("000004_male_Asian_old", Path::new("x")).is_err());
    }

    #[test]
    fn image_extension_filter() {
        assert!(is_image(Path::new("a/mask1.JPG")));
        assert!(is_image(Path::new("a/normal.png")));
        assert!(!is_image(Path::new("a/notes.txt")));
        assert!(!is_image(Path::new("a/normal")));
    }
}
