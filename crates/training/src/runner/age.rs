use super::{build_loaders, init_model, Collected, FoldReport, RunContext};
use crate::checkpoint::BestTracker;
use crate::loss::JointAgeLoss;
use crate::metrics::{scalar, MetricWindow};
use crate::optim::OptimizerVisitor;
use crate::schedule::StepLr;
use crate::{ADBackend, TrainBackend};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use face_dataset::{
    coarse_from_fine_index, FaceRecord, SampleLabels, Split, NUM_AGE_CLASSES,
    NUM_FINE_AGE_CLASSES,
};
use models::{argmax, FaceClassifier};

fn fine_label(labels: &SampleLabels) -> u8 {
    labels.fine_age.index()
}

fn coarse_label(labels: &SampleLabels) -> u8 {
    labels.age as u8
}

fn to_coarse(fine_preds: &[u8]) -> Vec<u8> {
    fine_preds.iter().map(|&p| coarse_from_fine_index(p)).collect()
}

/// Eleven-class age model trained with [`JointAgeLoss`]; "final" metrics
/// score its predictions mapped back onto the three age buckets.
pub(crate) struct AgeLoop<'a> {
    pub ctx: &'a mut RunContext,
    pub records: &'a [FaceRecord],
    pub split: &'a Split,
}

impl OptimizerVisitor<ADBackend> for AgeLoop<'_> {
    type Output = anyhow::Result<FoldReport>;

    fn visit<O, F>(self, make: F) -> Self::Output
    where
        O: Optimizer<FaceClassifier<ADBackend>, ADBackend>,
        F: Fn() -> O,
    {
        let AgeLoop {
            ctx,
            records,
            split,
        } = self;
        let cfg = ctx.cfg.clone();
        let joint = JointAgeLoss::new(cfg.criterion);
        let (train_loader, val_loader) = build_loaders(&cfg, records, split)?;
        let mut model = init_model(
            cfg.model,
            NUM_FINE_AGE_CLASSES,
            &ctx.device,
            cfg.pretrained.as_deref(),
        )?;
        let mut optim = make();
        let schedule = StepLr::new(cfg.lr, cfg.lr_decay_step);
        let batches_per_epoch = train_loader.num_batches();

        let mut best = BestTracker::default();
        let mut last = None;
        for epoch in 0..cfg.epochs {
            let lr = schedule.lr(epoch);
            let mut window = MetricWindow::default();
            let mut final_window = MetricWindow::default();
            let mut iter = train_loader.epoch(epoch);
            let mut idx = 0usize;
            while let Some(batch) = iter.next_batch::<ADBackend>(&ctx.device)? {
                let fine_host = batch.target_values(fine_label);
                let coarse_host = batch.target_values(coarse_label);
                let fine_targets = batch.targets(fine_label, &ctx.device);
                let coarse_targets = batch.targets(coarse_label, &ctx.device);

                let logits = model.forward(batch.images);
                let preds = argmax(logits.clone());
                let final_preds = to_coarse(&preds);
                let out = joint.forward(logits, fine_targets, coarse_targets);
                let loss_value = scalar(out.total.clone().detach());
                let grads = GradientsParams::from_grads(out.total.backward(), &model);
                model = optim.step(lr, model, grads);

                window.push(loss_value, &fine_host, &preds, NUM_FINE_AGE_CLASSES);
                final_window.push(loss_value, &coarse_host, &final_preds, NUM_AGE_CLASSES);
                idx += 1;
                if idx % cfg.log_interval == 0 {
                    let s = window.summary();
                    let f = final_window.summary();
                    log::info!(
                        "Epoch[{epoch}/{}]({idx}/{batches_per_epoch}) || training loss {:.4} || training accuracy {:.2}% || final accuracy {:.2}% || training f1 {:.2}% || final f1 {:.2}% || lr {lr}",
                        cfg.epochs,
                        s.loss,
                        s.accuracy * 100.0,
                        f.accuracy * 100.0,
                        s.f1 * 100.0,
                        f.f1 * 100.0
                    );
                    let step = epoch * batches_per_epoch + idx - 1;
                    ctx.sink.scalar("Train/loss", s.loss, step)?;
                    ctx.sink.scalar("Train/accuracy", s.accuracy, step)?;
                    ctx.sink.scalar("Train/final_acc", f.accuracy, step)?;
                    ctx.sink.scalar("Train/f1", s.f1, step)?;
                    ctx.sink.scalar("Train/final_f1", f.f1, step)?;
                    window.reset();
                    final_window.reset();
                }
            }

            log::info!("Calculating validation results...");
            let valid_model: FaceClassifier<TrainBackend> = model.valid();
            let mut fine = Collected::default();
            let mut coarse = Collected::default();
            let mut val_iter = val_loader.epoch(0);
            while let Some(batch) = val_iter.next_batch::<TrainBackend>(&ctx.device)? {
                let fine_host = batch.target_values(fine_label);
                let coarse_host = batch.target_values(coarse_label);
                let fine_targets = batch.targets(fine_label, &ctx.device);
                let logits = valid_model.forward(batch.images);
                let preds = argmax(logits.clone());
                // Validation loss is the fine criterion alone.
                let loss = scalar(cfg.criterion.forward(logits, fine_targets));
                fine.push(loss, &fine_host, &preds);
                coarse.push(loss, &coarse_host, &to_coarse(&preds));
            }
            let val = fine.report(epoch, NUM_FINE_AGE_CLASSES);
            let final_val = coarse.report(epoch, NUM_AGE_CLASSES);
            log::info!(
                "Validation F1 Score : {:.2}%, final f1 score : {:.2}%",
                val.f1 * 100.0,
                final_val.f1 * 100.0
            );

            let improved = best.observe(val.f1, val.loss, val.accuracy);
            if improved.f1 {
                log::info!(
                    "New best model for val f1 score : {:.2}%! saving the best model..",
                    val.f1 * 100.0
                );
            }
            ctx.store.save_best_and_last(&model, "", improved)?;
            log::info!(
                "[Val] f1: {:.2}%, final_f1: {:.2}%, acc : {:.2}%, final acc : {:.2}%, loss: {:.4} || best acc : {:.2}%, best loss: {:.4}, best f1 score: {:.2}%",
                val.f1 * 100.0,
                final_val.f1 * 100.0,
                val.accuracy * 100.0,
                final_val.accuracy * 100.0,
                val.loss,
                best.best_accuracy * 100.0,
                best.best_loss,
                best.best_f1 * 100.0
            );
            ctx.sink.scalar("Val/loss", val.loss, epoch)?;
            ctx.sink.scalar("Val/accuracy", val.accuracy, epoch)?;
            ctx.sink.scalar("Val/f1", val.f1, epoch)?;
            ctx.sink.scalar("Val/final_acc", final_val.accuracy, epoch)?;
            ctx.sink.scalar("Val/final_f1", final_val.f1, epoch)?;
            last = Some(val);
        }
        Ok(FoldReport {
            fold: 0,
            best,
            last,
        })
    }
}
