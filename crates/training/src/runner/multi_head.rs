use super::{build_loaders, init_model, Collected, EpochReport, FoldReport, RunContext};
use crate::checkpoint::BestTracker;
use crate::loss::CriterionKind;
use crate::metrics::{accuracy, count_matches, macro_f1, scalar, MetricWindow};
use crate::optim::OptimizerVisitor;
use crate::schedule::StepLr;
use crate::{ADBackend, TrainBackend};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::Tensor;
use face_dataset::{encode_raw, FaceBatch, FaceRecord, Split, Task, NUM_MULTI_CLASSES};
use models::{argmax, FaceClassifier};

const HEADS: [(&str, Task); 3] = [
    ("mask", Task::Mask),
    ("gender", Task::Gender),
    ("age", Task::Age),
];

struct Head<O> {
    name: &'static str,
    task: Task,
    model: FaceClassifier<ADBackend>,
    optim: O,
    window: MetricWindow,
}

impl<O: Optimizer<FaceClassifier<ADBackend>, ADBackend>> Head<O> {
    /// Forward, back-propagate and step this head alone.
    fn train_step(
        &mut self,
        images: Tensor<ADBackend, 4>,
        batch: &FaceBatch<ADBackend>,
        criterion: CriterionKind,
        lr: f64,
        device: &<ADBackend as burn::tensor::backend::Backend>::Device,
    ) -> Vec<u8> {
        let targets_host = batch.target_values(|l| self.task.select(l));
        let targets = batch.task_targets(self.task, device);
        let logits = self.model.forward(images);
        let preds = argmax(logits.clone());
        let loss = criterion.forward(logits, targets);
        let loss_value = scalar(loss.clone().detach());
        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optim.step(lr, self.model.clone(), grads);
        self.window
            .push(loss_value, &targets_host, &preds, self.task.num_classes());
        preds
    }
}

/// Combined label of each sample from per-head predictions.
fn combine(mask: &[u8], gender: &[u8], age: &[u8]) -> Vec<u8> {
    mask.iter()
        .zip(gender)
        .zip(age)
        .map(|((&m, &g), &a)| encode_raw(m, g, a))
        .collect()
}

/// Mask, gender and age classifiers with their own optimizers, selected
/// together on the F1 of the combined 18-class prediction.
pub(crate) struct MultiHeadLoop<'a> {
    pub ctx: &'a mut RunContext,
    pub records: &'a [FaceRecord],
    pub split: &'a Split,
}

impl OptimizerVisitor<ADBackend> for MultiHeadLoop<'_> {
    type Output = anyhow::Result<FoldReport>;

    fn visit<O, F>(self, make: F) -> Self::Output
    where
        O: Optimizer<FaceClassifier<ADBackend>, ADBackend>,
        F: Fn() -> O,
    {
        let MultiHeadLoop {
            ctx,
            records,
            split,
        } = self;
        let cfg = ctx.cfg.clone();
        let (train_loader, val_loader) = build_loaders(&cfg, records, split)?;

        let mut heads = Vec::with_capacity(HEADS.len());
        for (name, task) in HEADS {
            let pretrained = cfg
                .pretrained
                .as_ref()
                .map(|dir| dir.join(format!("{name}_best.bin")));
            heads.push(Head {
                name,
                task,
                model: init_model(
                    cfg.model,
                    task.num_classes(),
                    &ctx.device,
                    pretrained.as_deref(),
                )?,
                optim: make(),
                window: MetricWindow::default(),
            });
        }
        let schedule = StepLr::new(cfg.lr, cfg.lr_decay_step);
        let batches_per_epoch = train_loader.num_batches();

        let mut best = BestTracker::default();
        let mut last = None;
        for epoch in 0..cfg.epochs {
            let lr = schedule.lr(epoch);
            let mut combined_window = MetricWindow::default();
            let mut iter = train_loader.epoch(epoch);
            let mut idx = 0usize;
            while let Some(batch) = iter.next_batch::<ADBackend>(&ctx.device)? {
                let preds: Vec<Vec<u8>> = heads
                    .iter_mut()
                    .map(|head| {
                        head.train_step(batch.images.clone(), &batch, cfg.criterion, lr, &ctx.device)
                    })
                    .collect();
                let combined = combine(&preds[0], &preds[1], &preds[2]);
                let targets = batch.target_values(|l| Task::All.select(l));
                combined_window.push_predictions(&targets, &combined, NUM_MULTI_CLASSES);
                log::debug!(
                    "[epoch: {epoch}, iter: {idx}] mask acc {:.4}, gender acc {:.4}, age acc {:.4}, train acc {:.4}",
                    accuracy(&batch.target_values(|l| Task::Mask.select(l)), &preds[0]),
                    accuracy(&batch.target_values(|l| Task::Gender.select(l)), &preds[1]),
                    accuracy(&batch.target_values(|l| Task::Age.select(l)), &preds[2]),
                    accuracy(&targets, &combined)
                );

                idx += 1;
                if idx % cfg.log_interval == 0 {
                    let step = epoch * batches_per_epoch + idx - 1;
                    let c = combined_window.summary();
                    let mut line = format!(
                        "Epoch[{}/{}]({idx}/{batches_per_epoch}) || train acc {:.2}% || train f1 {:.2}%",
                        epoch + 1,
                        cfg.epochs,
                        c.accuracy * 100.0,
                        c.f1 * 100.0
                    );
                    for head in heads.iter_mut() {
                        let s = head.window.summary();
                        line.push_str(&format!(
                            " || {} loss {:.4} acc {:.2}%",
                            head.name,
                            s.loss,
                            s.accuracy * 100.0
                        ));
                        ctx.sink
                            .scalar(&format!("Train/{}_loss", head.name), s.loss, step)?;
                        ctx.sink
                            .scalar(&format!("Train/{}_accuracy", head.name), s.accuracy, step)?;
                        head.window.reset();
                    }
                    log::info!("{line} || lr {lr}");
                    ctx.sink.scalar("Train/accuracy", c.accuracy, step)?;
                    ctx.sink.scalar("Train/f1", c.f1, step)?;
                    combined_window.reset();
                }
            }

            log::info!("Calculating validation results...");
            let valid_models: Vec<FaceClassifier<TrainBackend>> =
                heads.iter().map(|h| h.model.valid()).collect();
            let mut per_head: Vec<Collected> = vec![Collected::default(); HEADS.len()];
            let mut combined_targets = Vec::new();
            let mut combined_preds = Vec::new();
            let mut val_iter = val_loader.epoch(0);
            while let Some(batch) = val_iter.next_batch::<TrainBackend>(&ctx.device)? {
                let mut preds = Vec::with_capacity(HEADS.len());
                for ((_, task), (model, collected)) in HEADS
                    .iter()
                    .zip(valid_models.iter().zip(per_head.iter_mut()))
                {
                    let targets_host = batch.target_values(|l| task.select(l));
                    let targets = batch.task_targets(*task, &ctx.device);
                    let logits = model.forward(batch.images.clone());
                    let head_preds = argmax(logits.clone());
                    let loss = scalar(cfg.criterion.forward(logits, targets));
                    collected.push(loss, &targets_host, &head_preds);
                    preds.push(head_preds);
                }
                combined_targets.extend(batch.target_values(|l| Task::All.select(l)));
                combined_preds.extend(combine(&preds[0], &preds[1], &preds[2]));
            }

            let head_reports: Vec<EpochReport> = HEADS
                .iter()
                .zip(&per_head)
                .map(|((_, task), c)| c.report(epoch, task.num_classes()))
                .collect();
            let val = EpochReport {
                epoch,
                loss: head_reports.iter().map(|r| r.loss).sum(),
                accuracy: accuracy(&combined_targets, &combined_preds),
                f1: macro_f1(&combined_targets, &combined_preds, NUM_MULTI_CLASSES),
            };
            let improved = best.observe(val.f1, val.loss, val.accuracy);
            for head in &heads {
                ctx.store
                    .save_best_and_last(&head.model, &format!("{}_", head.name), improved)?;
            }
            if improved.f1 {
                log::info!("New best combined f1 : {:.2}%! saved all heads", val.f1 * 100.0);
            }
            log::info!(
                "[Val] epoch {epoch}: acc {:.2}% ({} of {}), f1 {:.2}%, loss {:.4} || mask acc {:.2}%, gender acc {:.2}%, age acc {:.2}% || best f1 {:.2}%",
                val.accuracy * 100.0,
                count_matches(&combined_targets, &combined_preds),
                combined_targets.len(),
                val.f1 * 100.0,
                val.loss,
                head_reports[0].accuracy * 100.0,
                head_reports[1].accuracy * 100.0,
                head_reports[2].accuracy * 100.0,
                best.best_f1 * 100.0
            );
            for ((name, _), report) in HEADS.iter().zip(&head_reports) {
                ctx.sink
                    .scalar(&format!("Val/{name}_accuracy"), report.accuracy, epoch)?;
                ctx.sink.scalar(&format!("Val/{name}_loss"), report.loss, epoch)?;
            }
            ctx.sink.scalar("Val/accuracy", val.accuracy, epoch)?;
            ctx.sink.scalar("Val/f1", val.f1, epoch)?;
            ctx.sink.scalar("Val/loss", val.loss, epoch)?;
            last = Some(val);
        }
        Ok(FoldReport {
            fold: 0,
            best,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_head_predictions_mask_major() {
        assert_eq!(combine(&[0, 2, 1], &[0, 1, 0], &[0, 2, 1]), vec![0, 17, 7]);
    }
}
