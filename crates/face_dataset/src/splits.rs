//! Train/validation partitioning of an indexed dataset.

use crate::types::{FaceRecord, Split};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

fn val_count(total: usize, val_ratio: f32) -> usize {
    ((total as f64) * val_ratio.clamp(0.0, 1.0) as f64) as usize
}

/// Group record indices by profile, in sorted profile order.
fn profile_groups(records: &[FaceRecord]) -> Vec<Vec<usize>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        groups.entry(record.profile.as_str()).or_default().push(idx);
    }
    groups.into_values().collect()
}

/// Random per-image split. Images of one person may land on both sides.
pub fn split_random(total: usize, val_ratio: f32, seed: u64) -> Split {
    let mut order: Vec<usize> = (0..total).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let n_val = val_count(total, val_ratio);
    let mut val = order[..n_val].to_vec();
    let mut train = order[n_val..].to_vec();
    val.sort_unstable();
    train.sort_unstable();
    Split { train, val }
}

/// Split by profile so every person is entirely in train or in validation.
pub fn split_by_profile(records: &[FaceRecord], val_ratio: f32, seed: u64) -> Split {
    let mut groups = profile_groups(records);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    groups.shuffle(&mut rng);
    let n_val = val_count(groups.len(), val_ratio);
    let mut split = Split::default();
    for (i, group) in groups.into_iter().enumerate() {
        if i < n_val {
            split.val.extend(group);
        } else {
            split.train.extend(group);
        }
    }
    split.train.sort_unstable();
    split.val.sort_unstable();
    split
}

/// Partition profiles into `k` folds; fold `i` validates on the `i`-th group
/// of profiles and trains on the rest.
pub fn k_fold(records: &[FaceRecord], k: usize, seed: u64) -> Vec<Split> {
    let k = k.max(1);
    let mut groups = profile_groups(records);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    groups.shuffle(&mut rng);

    let mut fold_of = vec![0usize; records.len()];
    for (g, group) in groups.iter().enumerate() {
        for &idx in group {
            fold_of[idx] = g % k;
        }
    }
    (0..k)
        .map(|fold| {
            let mut split = Split::default();
            for (idx, &f) in fold_of.iter().enumerate() {
                if f == fold {
                    split.val.push(idx);
                } else {
                    split.train.push(idx);
                }
            }
            split
        })
        .collect()
}
