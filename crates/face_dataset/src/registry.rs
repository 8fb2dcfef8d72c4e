//! Named dataset variants and the split each one uses.

use crate::splits::{k_fold, split_by_profile, split_random};
use crate::types::{DatasetResult, FaceDatasetError, FaceRecord, Split};
use serde::{Deserialize, Serialize};

/// Number of folds produced by [`DatasetKind::FiveFold`].
pub const NUM_FOLDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    /// Per-image random split.
    #[serde(rename = "MaskBaseDataset")]
    MaskBase,
    /// Split by person.
    #[serde(rename = "MaskSplitByProfileDataset")]
    MaskSplitByProfile,
    /// Random split, trained on the fine age classes.
    #[serde(rename = "AgeBaseDataset")]
    AgeBase,
    /// Five folds by person.
    #[serde(rename = "My5foldDataset")]
    FiveFold,
}

impl DatasetKind {
    pub const KEYS: [(&'static str, DatasetKind); 4] = [
        ("MaskBaseDataset", DatasetKind::MaskBase),
        ("MaskSplitByProfileDataset", DatasetKind::MaskSplitByProfile),
        ("AgeBaseDataset", DatasetKind::AgeBase),
        ("My5foldDataset", DatasetKind::FiveFold),
    ];

    pub fn from_key(key: &str) -> DatasetResult<Self> {
        Self::KEYS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| FaceDatasetError::UnknownKey {
                kind: "dataset",
                key: key.to_string(),
                known: Self::KEYS.map(|(name, _)| name).join(", "),
            })
    }

    pub fn key(self) -> &'static str {
        match self {
            DatasetKind::MaskBase => "MaskBaseDataset",
            DatasetKind::MaskSplitByProfile => "MaskSplitByProfileDataset",
            DatasetKind::AgeBase => "AgeBaseDataset",
            DatasetKind::FiveFold => "My5foldDataset",
        }
    }

    /// Train/validation splits; one entry except for the five-fold variant.
    pub fn splits(self, records: &[FaceRecord], val_ratio: f32, seed: u64) -> Vec<Split> {
        match self {
            DatasetKind::MaskBase | DatasetKind::AgeBase => {
                vec![split_random(records.len(), val_ratio, seed)]
            }
            DatasetKind::MaskSplitByProfile => vec![split_by_profile(records, val_ratio, seed)],
            DatasetKind::FiveFold => k_fold(records, NUM_FOLDS, seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip() {
        for (name, kind) in DatasetKind::KEYS {
            assert_eq!(DatasetKind::from_key(name).unwrap(), kind);
            assert_eq!(kind.key(), name);
            assert_eq!(serde_json::to_string(&kind).unwrap(), format!("\"{name}\""));
        }
    }

    #[test]
    fn unknown_dataset_fails() {
        let err = DatasetKind::from_key("CocoDataset").unwrap_err();
        assert!(err.to_string().starts_with("unknown dataset `CocoDataset`"));
    }

    #[test]
    fn five_fold_yields_five_splits() {
        assert_eq!(DatasetKind::FiveFold.splits(&[], 0.2, 0).len(), NUM_FOLDS);
        assert_eq!(DatasetKind::MaskBase.splits(&[], 0.2, 0).len(), 1);
    }
}
