use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use face_dataset::{
    coarse_from_fine_index, encode_raw, FaceBatch, NUM_AGE_CLASSES, NUM_FINE_AGE_CLASSES,
};
use models::{argmax, FaceClassifier, ModelKind};
use std::path::Path;

/// Build a `kind` classifier with `num_classes` outputs and load its weights.
pub fn load_classifier<B: Backend>(
    path: &Path,
    kind: ModelKind,
    num_classes: usize,
    device: &B::Device,
) -> anyhow::Result<FaceClassifier<B>> {
    if !path.exists() {
        anyhow::bail!("checkpoint {} does not exist", path.display());
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    kind.build::<B>(num_classes, device)
        .load_file(path.to_path_buf(), &recorder, device)
        .with_context(|| {
            format!(
                "failed to load {} ({num_classes} classes) from {}",
                kind.key(),
                path.display()
            )
        })
}

/// Produces one combined 18-class label per image.
pub enum Predictor<B: Backend> {
    /// A single classifier over the combined label.
    Single(FaceClassifier<B>),
    /// Independent heads packed with `encode_raw`. An 11-output age head is
    /// read as fine age and mapped onto the coarse buckets.
    MultiHead {
        mask: FaceClassifier<B>,
        gender: FaceClassifier<B>,
        age: FaceClassifier<B>,
    },
}

impl<B: Backend> Predictor<B> {
    pub fn describe(&self) -> String {
        match self {
            Predictor::Single(model) => format!("single classifier, {} classes", model.num_classes()),
            Predictor::MultiHead { age, .. } => {
                format!("mask/gender/age heads, age head {} classes", age.num_classes())
            }
        }
    }

    pub fn predict(&self, batch: &FaceBatch<B>) -> Vec<u8> {
        match self {
            Predictor::Single(model) => argmax(model.forward(batch.images.clone())),
            Predictor::MultiHead { mask, gender, age } => {
                let masks = argmax(mask.forward(batch.images.clone()));
                let genders = argmax(gender.forward(batch.images.clone()));
                let ages = argmax(age.forward(batch.images.clone()));
                let fine = age.num_classes() == NUM_FINE_AGE_CLASSES;
                masks
                    .iter()
                    .zip(&genders)
                    .zip(&ages)
                    .map(|((&m, &g), &a)| {
                        let a = if fine {
                            coarse_from_fine_index(a)
                        } else {
                            a.min(NUM_AGE_CLASSES as u8 - 1)
                        };
                        encode_raw(m, g, a)
                    })
                    .collect()
            }
        }
    }
}
