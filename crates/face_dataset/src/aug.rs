//! Per-image transforms: center crop, resize, random photometric
//! augmentation and channel normalization into CHW floats.

use crate::types::{ChannelStats, DatasetResult, FaceDatasetError};
use image::imageops::FilterType;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// An augmentation applied with probability `prob` at magnitude `amount`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Chance {
    pub prob: f32,
    pub amount: f32,
}

impl Chance {
    pub const NEVER: Chance = Chance {
        prob: 0.0,
        amount: 0.0,
    };

    pub fn new(prob: f32, amount: f32) -> Self {
        Self { prob, amount }
    }

    fn active(self) -> bool {
        self.prob > 0.0 && self.amount > 0.0
    }
}

/// Random photometric and geometric augmentation; all off by default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Augment {
    /// Probability of a horizontal flip.
    pub hflip: f32,
    /// Brightness/contrast scale drawn from `1 ± amount`.
    pub jitter: Chance,
    /// Uniform per-pixel noise of at most `amount` in `[0, 1]` units.
    pub noise: Chance,
    /// Gaussian blur with sigma `amount`.
    pub blur: Chance,
}

impl Augment {
    pub const NONE: Augment = Augment {
        hflip: 0.0,
        jitter: Chance::NEVER,
        noise: Chance::NEVER,
        blur: Chance::NEVER,
    };
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Output (width, height) after resizing.
    pub target_size: (u32, u32),
    /// Center crop (width, height) taken before resizing.
    pub center_crop: Option<(u32, u32)>,
    pub augment: Augment,
    pub stats: ChannelStats,
    /// Reshuffle at the start of every epoch.
    pub shuffle: bool,
    /// Seeds shuffling and augmentation.
    pub seed: Option<u64>,
    pub drop_last: bool,
    /// Decoder threads; defaults to half the available cores.
    pub num_workers: Option<usize>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            target_size: (384, 512),
            center_crop: None,
            augment: Augment::NONE,
            stats: ChannelStats::default(),
            shuffle: true,
            seed: None,
            drop_last: true,
            num_workers: None,
        }
    }
}

impl DatasetConfig {
    /// Evaluation variant: same geometry and stats, no randomness.
    pub fn for_eval(&self) -> Self {
        Self {
            augment: Augment::NONE,
            shuffle: false,
            ..self.clone()
        }
    }
}

/// Named augmentation presets selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AugmentationKind {
    #[serde(rename = "BaseAugmentation")]
    Base,
    #[serde(rename = "CustomAugmentation")]
    Custom,
    #[serde(rename = "AlbuAugmentation")]
    Albu,
}

impl AugmentationKind {
    pub const KEYS: [(&'static str, AugmentationKind); 3] = [
        ("BaseAugmentation", AugmentationKind::Base),
        ("CustomAugmentation", AugmentationKind::Custom),
        ("AlbuAugmentation", AugmentationKind::Albu),
    ];

    pub fn from_key(key: &str) -> DatasetResult<Self> {
        Self::KEYS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| FaceDatasetError::UnknownKey {
                kind: "augmentation",
                key: key.to_string(),
                known: Self::KEYS.map(|(name, _)| name).join(", "),
            })
    }

    /// Training config for this preset at the given output size.
    pub fn train_config(self, target_size: (u32, u32), stats: ChannelStats) -> DatasetConfig {
        let base = DatasetConfig {
            target_size,
            stats,
            ..Default::default()
        };
        match self {
            AugmentationKind::Base => base,
            AugmentationKind::Custom => DatasetConfig {
                center_crop: Some((256, 320)),
                augment: Augment {
                    jitter: Chance::new(1.0, 0.1),
                    noise: Chance::new(1.0, 0.02),
                    ..Augment::NONE
                },
                ..base
            },
            AugmentationKind::Albu => DatasetConfig {
                augment: Augment {
                    hflip: 0.5,
                    jitter: Chance::new(0.5, 0.2),
                    blur: Chance::new(0.1, 1.0),
                    ..Augment::NONE
                },
                ..base
            },
        }
    }
}

/// The transform a loader applies to every decoded image.
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    target_size: (u32, u32),
    center_crop: Option<(u32, u32)>,
    augment: Augment,
    stats: ChannelStats,
    seed: Option<u64>,
}

impl TransformPipeline {
    pub fn from_config(cfg: &DatasetConfig) -> Self {
        Self {
            target_size: cfg.target_size,
            center_crop: cfg.center_crop,
            augment: cfg.augment,
            stats: cfg.stats,
            seed: cfg.seed,
        }
    }

    pub fn describe(&self) -> String {
        let (w, h) = self.target_size;
        let mut parts = vec![format!("resize {w}x{h}")];
        if let Some((cw, ch)) = self.center_crop {
            parts.push(format!("crop {cw}x{ch}"));
        }
        let a = self.augment;
        if a.hflip > 0.0 {
            parts.push(format!("hflip p={:.2}", a.hflip));
        }
        for (name, chance) in [("jitter", a.jitter), ("noise", a.noise), ("blur", a.blur)] {
            if chance.active() {
                parts.push(format!("{name} p={:.2} x{:.3}", chance.prob, chance.amount));
            }
        }
        parts.push(format!(
            "normalize mean={:?} std={:?}",
            self.stats.mean, self.stats.std
        ));
        if let Some(seed) = self.seed {
            parts.push(format!("seed {seed}"));
        }
        parts.join(", ")
    }

    /// Transform one image into normalized CHW floats.
    ///
    /// `sample_key` mixes into the seed so every (epoch, sample) pair draws
    /// its own augmentation while staying reproducible.
    pub fn apply(&self, img: image::RgbImage, sample_key: u64) -> (Vec<f32>, u32, u32) {
        let mut rng = match self.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed ^ sample_key),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };

        let img = match self.center_crop {
            Some((w, h)) => center_crop(&img, w, h),
            None => img,
        };
        let (w, h) = self.target_size;
        let mut img = if img.dimensions() == (w, h) {
            img
        } else {
            image::imageops::resize(&img, w, h, FilterType::Triangle)
        };

        let a = self.augment;
        maybe_hflip(&mut img, a.hflip, &mut rng);
        maybe_jitter(&mut img, a.jitter, &mut rng);
        maybe_noise(&mut img, a.noise, &mut rng);
        maybe_blur(&mut img, a.blur, &mut rng);

        (normalize_chw(&img, &self.stats), w, h)
    }
}

fn normalize_chw(img: &image::RgbImage, stats: &ChannelStats) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut image_chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            image_chw[c * plane + base] = (v - stats.mean[c]) / stats.std[c];
        }
    }
    image_chw
}

fn center_crop(img: &image::RgbImage, width: u32, height: u32) -> image::RgbImage {
    let (w, h) = img.dimensions();
    let cw = width.min(w);
    let ch = height.min(h);
    let x0 = (w - cw) / 2;
    let y0 = (h - ch) / 2;
    image::imageops::crop_imm(img, x0, y0, cw, ch).to_image()
}

pub(crate) fn maybe_hflip(img: &mut image::RgbImage, prob: f32, rng: &mut dyn rand::RngCore) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_horizontal_in_place(img);
    }
}

fn fires(chance: Chance, rng: &mut dyn rand::RngCore) -> bool {
    chance.active() && rng.random_range(0.0..1.0) < chance.prob
}

pub(crate) fn maybe_jitter(img: &mut image::RgbImage, chance: Chance, rng: &mut dyn rand::RngCore) {
    if !fires(chance, rng) {
        return;
    }
    let strength = chance.amount;
    let bright = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            let mut v = (v - 0.5) * contrast + 0.5;
            v *= bright;
            pixel[c] = (v.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
}

pub(crate) fn maybe_noise(img: &mut image::RgbImage, chance: Chance, rng: &mut dyn rand::RngCore) {
    if !fires(chance, rng) {
        return;
    }
    let strength = chance.amount;
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let noise = rng.random_range(-strength..strength);
            let v = (pixel[c] as f32 / 255.0 + noise).clamp(0.0, 1.0);
            pixel[c] = (v * 255.0) as u8;
        }
    }
}

pub(crate) fn maybe_blur(img: &mut image::RgbImage, chance: Chance, rng: &mut dyn rand::RngCore) {
    if fires(chance, rng) {
        *img = image::imageops::blur(img, chance.amount);
    }
}

#[cfg(test)]
mod aug_tests {
    use super::*;
    use rand::rng;

    #[test]
    fn hflip_mirrors_columns() {
        let mut img = image::RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        let mut rng = rng();
        maybe_hflip(&mut img, 1.0, &mut rng);
        assert_eq!(img.get_pixel(1, 0).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn normalizes_with_channel_stats() {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 51]));
        let pipeline = TransformPipeline::from_config(&DatasetConfig {
            target_size: (2, 2),
            stats: ChannelStats {
                mean: [0.5, 0.0, 0.0],
                std: [0.5, 1.0, 0.2],
            },
            ..Default::default()
        });
        let (chw, w, h) = pipeline.apply(img, 0);
        assert_eq!((w, h), (2, 2));
        assert_eq!(chw.len(), 12);
        assert!((chw[0] - 1.0).abs() < 1e-6);
        assert!(chw[4].abs() < 1e-6);
        assert!((chw[8] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn seeded_pipeline_is_reproducible() {
        let img = image::RgbImage::from_fn(8, 8, |x, y| image::Rgb([(x * 30) as u8, (y * 30) as u8, 90]));
        let pipeline = AugmentationKind::Albu
            .train_config((4, 4), ChannelStats::default());
        let pipeline = TransformPipeline::from_config(&DatasetConfig {
            seed: Some(7),
            ..pipeline
        });
        let a = pipeline.apply(img.clone(), 3);
        let b = pipeline.apply(img, 3);
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn eval_config_disables_augmentation() {
        let train = AugmentationKind::Custom.train_config((4, 4), ChannelStats::default());
        assert_eq!(train.center_crop, Some((256, 320)));
        assert!(train.augment.noise.prob > 0.0);
        let eval = train.for_eval();
        assert_eq!(eval.augment, Augment::NONE);
        assert_eq!(eval.center_crop, train.center_crop);
        assert!(!eval.shuffle);
        let described = TransformPipeline::from_config(&eval).describe();
        assert!(described.contains("crop 256x320"));
        assert!(!described.contains("noise"));
    }

    #[test]
    fn center_crop_clamps_to_image() {
        let img = image::RgbImage::new(10, 6);
        let cropped = center_crop(&img, 4, 8);
        assert_eq!(cropped.dimensions(), (4, 6));
    }

    #[test]
    fn unknown_augmentation_is_rejected() {
        assert_eq!(
            AugmentationKind::from_key("AlbuAugmentation").unwrap(),
            AugmentationKind::Albu
        );
        let err = AugmentationKind::from_key("Mystery").unwrap_err();
        assert!(err.to_string().contains("unknown augmentation `Mystery`"));
    }
}
