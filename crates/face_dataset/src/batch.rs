//! Batch iteration for training, validation and inference.

use crate::aug::{DatasetConfig, TransformPipeline};
use crate::index::load_rgb;
use crate::labels::{SampleLabels, Task};
use crate::types::{DatasetResult, FaceDatasetError, FaceRecord, FaceSample};
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::{seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const LOG_EVERY: Duration = Duration::from_secs(30);

/// An image queued for loading, with labels when they are known.
#[derive(Debug, Clone)]
pub struct LoaderItem {
    pub path: PathBuf,
    pub labels: Option<SampleLabels>,
}

pub struct FaceBatch<B: Backend> {
    /// `[batch, 3, height, width]`, normalized.
    pub images: Tensor<B, 4>,
    /// Labels in batch order; empty for unlabelled items.
    pub labels: Vec<SampleLabels>,
    /// Loader positions of the batch items.
    pub indices: Vec<usize>,
}

impl<B: Backend> FaceBatch<B> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Host-side targets picked from each sample's labels.
    pub fn target_values(&self, select: impl Fn(&SampleLabels) -> u8) -> Vec<u8> {
        self.labels.iter().map(select).collect()
    }

    pub fn targets(
        &self,
        select: impl Fn(&SampleLabels) -> u8,
        device: &B::Device,
    ) -> Tensor<B, 1, Int> {
        let values: Vec<i64> = self.labels.iter().map(|l| select(l) as i64).collect();
        let len = values.len();
        Tensor::from_data(TensorData::new(values, [len]), device)
    }

    pub fn task_targets(&self, task: Task, device: &B::Device) -> Tensor<B, 1, Int> {
        self.targets(|labels| task.select(labels), device)
    }
}

/// Owns the items of one subset, the transform pipeline and the decode pool.
pub struct FaceLoader {
    items: Vec<LoaderItem>,
    cfg: DatasetConfig,
    pipeline: TransformPipeline,
    batch_size: usize,
    pool: rayon::ThreadPool,
}

impl FaceLoader {
    /// Loader over `indices` of an indexed dataset.
    pub fn new(
        records: &[FaceRecord],
        indices: &[usize],
        batch_size: usize,
        cfg: DatasetConfig,
    ) -> DatasetResult<Self> {
        let items = indices
            .iter()
            .map(|&i| {
                records
                    .get(i)
                    .map(|r| LoaderItem {
                        path: r.path.clone(),
                        labels: Some(r.labels()),
                    })
                    .ok_or_else(|| {
                        FaceDatasetError::Other(format!(
                            "split index {i} out of range for {} records",
                            records.len()
                        ))
                    })
            })
            .collect::<DatasetResult<Vec<_>>>()?;
        Self::from_items(items, batch_size, cfg)
    }

    /// Loader over unlabelled images, kept in the given order.
    pub fn from_paths(
        paths: Vec<PathBuf>,
        batch_size: usize,
        cfg: DatasetConfig,
    ) -> DatasetResult<Self> {
        let items = paths
            .into_iter()
            .map(|path| LoaderItem { path, labels: None })
            .collect();
        Self::from_items(items, batch_size, cfg)
    }

    pub fn from_items(
        items: Vec<LoaderItem>,
        batch_size: usize,
        cfg: DatasetConfig,
    ) -> DatasetResult<Self> {
        if batch_size == 0 {
            return Err(FaceDatasetError::Other(
                "batch size must be positive".to_string(),
            ));
        }
        let workers = cfg.num_workers.unwrap_or_else(default_workers).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| FaceDatasetError::Other(format!("failed to build decode pool: {e}")))?;
        let pipeline = TransformPipeline::from_config(&cfg);
        log::debug!(
            "loader: {} items, batch_size={batch_size}, workers={workers}, {}",
            items.len(),
            pipeline.describe()
        );
        Ok(Self {
            items,
            cfg,
            pipeline,
            batch_size,
            pool,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn items(&self) -> &[LoaderItem] {
        &self.items
    }

    pub fn num_batches(&self) -> usize {
        if self.cfg.drop_last {
            self.items.len() / self.batch_size
        } else {
            self.items.len().div_ceil(self.batch_size)
        }
    }

    /// Start a pass over the items; shuffles when configured.
    pub fn epoch(&self, epoch: usize) -> BatchIter<'_> {
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        if self.cfg.shuffle {
            let mut rng = match self.cfg.seed {
                Some(seed) => rand::rngs::StdRng::seed_from_u64(seed.wrapping_add(epoch as u64)),
                None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
            };
            order.shuffle(&mut rng);
        }
        let now = Instant::now();
        BatchIter {
            loader: self,
            order,
            cursor: 0,
            epoch,
            processed_samples: 0,
            processed_batches: 0,
            started: now,
            last_log: now,
        }
    }

    fn load(&self, index: usize, epoch: usize) -> DatasetResult<FaceSample> {
        let item = &self.items[index];
        let img = load_rgb(&item.path)?;
        let key = ((epoch as u64) << 32) | index as u64;
        let (image_chw, width, height) = self.pipeline.apply(img, key);
        Ok(FaceSample {
            index,
            image_chw,
            width,
            height,
            labels: item.labels,
        })
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
}

pub struct BatchIter<'a> {
    loader: &'a FaceLoader,
    order: Vec<usize>,
    cursor: usize,
    epoch: usize,
    processed_samples: usize,
    processed_batches: usize,
    started: Instant,
    last_log: Instant,
}

impl BatchIter<'_> {
    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<FaceBatch<B>>> {
        let batch_size = self.loader.batch_size;
        if self.cursor >= self.order.len() {
            return Ok(None);
        }
        let end = (self.cursor + batch_size).min(self.order.len());
        if self.loader.cfg.drop_last && end - self.cursor < batch_size {
            self.cursor = self.order.len();
            return Ok(None);
        }
        let slice = &self.order[self.cursor..end];
        self.cursor = end;

        let loader = self.loader;
        let epoch = self.epoch;
        let loaded: Vec<DatasetResult<FaceSample>> = loader
            .pool
            .install(|| slice.par_iter().map(|&idx| loader.load(idx, epoch)).collect());

        let batch_len = loaded.len();
        let mut images_buf = Vec::new();
        let mut labels = Vec::with_capacity(batch_len);
        let mut indices = Vec::with_capacity(batch_len);
        let mut expected_size: Option<(u32, u32)> = None;
        for res in loaded {
            let sample = res?;
            let size = (sample.width, sample.height);
            match expected_size {
                None => {
                    expected_size = Some(size);
                    images_buf.reserve(batch_len * sample.image_chw.len());
                }
                Some(sz) if sz != size => {
                    return Err(FaceDatasetError::Other(
                        "batch contains varying image sizes; set a target_size to force consistency"
                            .to_string(),
                    ));
                }
                _ => {}
            }
            images_buf.extend_from_slice(&sample.image_chw);
            if let Some(l) = sample.labels {
                labels.push(l);
            }
            indices.push(sample.index);
        }
        let Some((width, height)) = expected_size else {
            return Ok(None);
        };

        let images = Tensor::<B, 1>::from_floats(images_buf.as_slice(), device).reshape([
            batch_len,
            3,
            height as usize,
            width as usize,
        ]);
        self.processed_samples += batch_len;
        self.processed_batches += 1;
        self.maybe_log_progress();
        Ok(Some(FaceBatch {
            images,
            labels,
            indices,
        }))
    }

    fn maybe_log_progress(&mut self) {
        if self.last_log.elapsed() < LOG_EVERY {
            return;
        }
        let secs = self.started.elapsed().as_secs_f32().max(0.001);
        log::debug!(
            "[dataset] epoch={} batches={} samples={} rate={:.1} img/s",
            self.epoch,
            self.processed_batches,
            self.processed_samples,
            self.processed_samples as f32 / secs
        );
        self.last_log = Instant::now();
    }
}
