//! Label packing for the three face attributes.
//!
//! A combined label packs mask state, gender and age bucket into one index in
//! `0..18`, mask-major: `mask * 6 + gender * 3 + age`.

use crate::types::{DatasetResult, FaceDatasetError};
use serde::{Deserialize, Serialize};

pub const NUM_MASK_CLASSES: usize = 3;
pub const NUM_GENDER_CLASSES: usize = 2;
pub const NUM_AGE_CLASSES: usize = 3;
pub const NUM_MULTI_CLASSES: usize = NUM_MASK_CLASSES * NUM_GENDER_CLASSES * NUM_AGE_CLASSES;
pub const NUM_FINE_AGE_CLASSES: usize = 11;

/// Lower bound (inclusive, in years) of each fine age class.
pub const FINE_AGE_LOWER_BOUNDS: [u32; NUM_FINE_AGE_CLASSES] =
    [0, 20, 23, 26, 28, 30, 36, 42, 48, 54, 60];

/// Fine-score ranges summed into each coarse age bucket by the joint age loss.
///
/// Bucket 1 spans `5..11` and bucket 2 is the last score alone, so the last
/// fine score is counted in both. Checkpoints trained with the joint loss
/// depend on this exact partition.
pub const AGE_BUCKETS: [std::ops::Range<usize>; NUM_AGE_CLASSES] = [0..5, 5..11, 10..11];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaskLabel {
    Wear = 0,
    Incorrect = 1,
    NotWear = 2,
}

impl MaskLabel {
    /// Map an image file stem (`mask1`..`mask5`, `incorrect_mask`, `normal`).
    pub fn from_stem(stem: &str) -> Option<Self> {
        match stem {
            "mask1" | "mask2" | "mask3" | "mask4" | "mask5" => Some(MaskLabel::Wear),
            "incorrect_mask" => Some(MaskLabel::Incorrect),
            "normal" => Some(MaskLabel::NotWear),
            _ => None,
        }
    }

    pub fn from_index(value: u8) -> Option<Self> {
        match value {
            0 => Some(MaskLabel::Wear),
            1 => Some(MaskLabel::Incorrect),
            2 => Some(MaskLabel::NotWear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum GenderLabel {
    Male = 0,
    Female = 1,
}

impl GenderLabel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "male" => Some(GenderLabel::Male),
            "female" => Some(GenderLabel::Female),
            _ => None,
        }
    }

    pub fn from_index(value: u8) -> Option<Self> {
        match value {
            0 => Some(GenderLabel::Male),
            1 => Some(GenderLabel::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum AgeLabel {
    Young = 0,
    Middle = 1,
    Old = 2,
}

impl AgeLabel {
    pub fn from_years(age: u32) -> Self {
        if age < 30 {
            AgeLabel::Young
        } else if age < 60 {
            AgeLabel::Middle
        } else {
            AgeLabel::Old
        }
    }

    pub fn from_index(value: u8) -> Option<Self> {
        match value {
            0 => Some(AgeLabel::Young),
            1 => Some(AgeLabel::Middle),
            2 => Some(AgeLabel::Old),
            _ => None,
        }
    }
}

/// One of the 11 fine-grained age classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FineAge(u8);

impl FineAge {
    pub fn from_years(age: u32) -> Self {
        let class = FINE_AGE_LOWER_BOUNDS
            .iter()
            .rposition(|&lower| age >= lower)
            .unwrap_or(0);
        FineAge(class as u8)
    }

    pub fn new(class: u8) -> Option<Self> {
        ((class as usize) < NUM_FINE_AGE_CLASSES).then_some(FineAge(class))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Hard mapping of a fine class onto the three age buckets.
    pub fn coarse(self) -> AgeLabel {
        match self.0 {
            0..=4 => AgeLabel::Young,
            5..=9 => AgeLabel::Middle,
            _ => AgeLabel::Old,
        }
    }
}

/// Map a raw fine-age prediction onto the coarse age index.
pub fn coarse_from_fine_index(fine: u8) -> u8 {
    FineAge(fine.min(NUM_FINE_AGE_CLASSES as u8 - 1)).coarse() as u8
}

pub fn encode_multi_class(mask: MaskLabel, gender: GenderLabel, age: AgeLabel) -> u8 {
    encode_raw(mask as u8, gender as u8, age as u8)
}

/// Pack raw per-task indices. Inputs are expected in range.
pub fn encode_raw(mask: u8, gender: u8, age: u8) -> u8 {
    mask * 6 + gender * 3 + age
}

/// Unpack a combined label into `(mask, gender, age)` indices.
///
/// Inputs outside `0..18` are not rejected; the mask index simply exceeds 2.
pub fn decode_raw(label: u32) -> (u32, u32, u32) {
    (label / 6, (label / 3) % 2, label % 3)
}

pub fn decode_multi_class(label: u8) -> DatasetResult<(MaskLabel, GenderLabel, AgeLabel)> {
    let (mask, gender, age) = decode_raw(label as u32);
    match (
        MaskLabel::from_index(mask as u8),
        GenderLabel::from_index(gender as u8),
        AgeLabel::from_index(age as u8),
    ) {
        (Some(m), Some(g), Some(a)) if (label as usize) < NUM_MULTI_CLASSES => Ok((m, g, a)),
        _ => Err(FaceDatasetError::LabelOutOfRange(label as u32)),
    }
}

/// Which label a single-head classifier is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    All,
    Mask,
    Gender,
    Age,
}

impl Task {
    pub const KEYS: [(&'static str, Task); 4] = [
        ("all", Task::All),
        ("mask", Task::Mask),
        ("gender", Task::Gender),
        ("age", Task::Age),
    ];

    pub fn from_key(key: &str) -> DatasetResult<Self> {
        Self::KEYS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, task)| *task)
            .ok_or_else(|| FaceDatasetError::UnknownKey {
                kind: "task",
                key: key.to_string(),
                known: Self::KEYS.map(|(name, _)| name).join(", "),
            })
    }

    pub fn key(self) -> &'static str {
        match self {
            Task::All => "all",
            Task::Mask => "mask",
            Task::Gender => "gender",
            Task::Age => "age",
        }
    }

    pub fn num_classes(self) -> usize {
        match self {
            Task::All => NUM_MULTI_CLASSES,
            Task::Mask => NUM_MASK_CLASSES,
            Task::Gender => NUM_GENDER_CLASSES,
            Task::Age => NUM_AGE_CLASSES,
        }
    }

    pub fn select(self, labels: &SampleLabels) -> u8 {
        match self {
            Task::All => labels.multi_class,
            Task::Mask => labels.mask as u8,
            Task::Gender => labels.gender as u8,
            Task::Age => labels.age as u8,
        }
    }
}

/// Every label derived from one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLabels {
    pub multi_class: u8,
    pub mask: MaskLabel,
    pub gender: GenderLabel,
    pub age: AgeLabel,
    pub fine_age: FineAge,
}

impl SampleLabels {
    pub fn new(mask: MaskLabel, gender: GenderLabel, age_years: u32) -> Self {
        let age = AgeLabel::from_years(age_years);
        Self {
            multi_class: encode_multi_class(mask, gender, age),
            mask,
            gender,
            age,
            fine_age: FineAge::from_years(age_years),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_labels_round_trip() {
        for label in 0..NUM_MULTI_CLASSES as u8 {
            let (m, g, a) = decode_multi_class(label).unwrap();
            assert_eq!(encode_multi_class(m, g, a), label);
        }
        for mask in 0..3u8 {
            for gender in 0..2u8 {
                for age in 0..3u8 {
                    let packed = encode_raw(mask, gender, age);
                    assert_eq!(
                        decode_raw(packed as u32),
                        (mask as u32, gender as u32, age as u32)
                    );
                }
            }
        }
    }

    #[test]
    fn known_combined_labels() {
        assert_eq!(
            decode_multi_class(0).unwrap(),
            (MaskLabel::Wear, GenderLabel::Male, AgeLabel::Young)
        );
        assert_eq!(
            decode_multi_class(17).unwrap(),
            (MaskLabel::NotWear, GenderLabel::Female, AgeLabel::Old)
        );
        assert_eq!(
            decode_multi_class(6).unwrap(),
            (MaskLabel::Incorrect, GenderLabel::Male, AgeLabel::Young)
        );
        assert!(decode_multi_class(18).is_err());
        // Unchecked decoding wraps instead of failing.
        assert_eq!(decode_raw(18), (3, 0, 0));
    }

    #[test]
    fn fine_age_table_agrees_with_coarse_buckets() {
        assert!(FINE_AGE_LOWER_BOUNDS.windows(2).all(|w| w[0] < w[1]));
        for years in 0..100 {
            let fine = FineAge::from_years(years);
            assert_eq!(fine.coarse(), AgeLabel::from_years(years), "age {years}");
        }
        assert_eq!(FineAge::from_years(19).index(), 0);
        assert_eq!(FineAge::from_years(60).index(), 10);
        assert_eq!(coarse_from_fine_index(4), AgeLabel::Young as u8);
        assert_eq!(coarse_from_fine_index(9), AgeLabel::Middle as u8);
        assert_eq!(coarse_from_fine_index(10), AgeLabel::Old as u8);
    }

    #[test]
    fn age_buckets_match_fixed_partition() {
        assert_eq!(AGE_BUCKETS[0], 0..5);
        assert_eq!(AGE_BUCKETS[1], 5..11);
        assert_eq!(AGE_BUCKETS[2], 10..11);
        assert!(AGE_BUCKETS.iter().all(|r| r.end <= NUM_FINE_AGE_CLASSES));
    }

    #[test]
    fn task_selects_matching_label() {
        let labels = SampleLabels::new(MaskLabel::Incorrect, GenderLabel::Female, 45);
        assert_eq!(labels.multi_class, 10);
        assert_eq!(Task::All.select(&labels), 10);
        assert_eq!(Task::Mask.select(&labels), 1);
        assert_eq!(Task::Gender.select(&labels), 1);
        assert_eq!(Task::Age.select(&labels), 1);
        assert_eq!(Task::All.num_classes(), 18);
        assert_eq!(Task::Gender.num_classes(), 2);
        assert_eq!(Task::from_key("gender").unwrap(), Task::Gender);
        assert!(Task::from_key("hair").is_err());
    }

    #[test]
    fn parses_folder_metadata() {
        assert_eq!(MaskLabel::from_stem("mask3"), Some(MaskLabel::Wear));
        assert_eq!(MaskLabel::from_stem("incorrect_mask"), Some(MaskLabel::Incorrect));
        assert_eq!(MaskLabel::from_stem("normal"), Some(MaskLabel::NotWear));
        assert_eq!(MaskLabel::from_stem("mask6"), None);
        assert_eq!(GenderLabel::parse("Female"), Some(GenderLabel::Female));
        assert_eq!(GenderLabel::parse("other"), None);
    }
}
