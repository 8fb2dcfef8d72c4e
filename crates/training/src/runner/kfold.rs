use super::{build_loaders, init_model, Collected, EpochReport, FoldReport, RunContext};
use crate::checkpoint::{epoch_checkpoint_name, BestTracker};
use crate::metrics::{scalar, MetricWindow};
use crate::optim::OptimizerVisitor;
use crate::schedule::StepLr;
use crate::{ADBackend, TrainBackend};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use face_dataset::{FaceLoader, FaceRecord, Split, Task};
use models::{argmax, FaceClassifier};

/// One fresh classifier per fold, trained on the `--task` label.
pub(crate) struct KFoldLoop<'a> {
    pub ctx: &'a mut RunContext,
    pub records: &'a [FaceRecord],
    pub splits: &'a [Split],
}

impl OptimizerVisitor<ADBackend> for KFoldLoop<'_> {
    type Output = anyhow::Result<Vec<FoldReport>>;

    fn visit<O, F>(self, make: F) -> Self::Output
    where
        O: Optimizer<FaceClassifier<ADBackend>, ADBackend>,
        F: Fn() -> O,
    {
        let KFoldLoop {
            ctx,
            records,
            splits,
        } = self;
        let mut reports = Vec::with_capacity(splits.len());
        for (fold, split) in splits.iter().enumerate() {
            reports.push(train_fold(ctx, records, fold, split, make())?);
        }
        Ok(reports)
    }
}

fn train_fold<O>(
    ctx: &mut RunContext,
    records: &[FaceRecord],
    fold: usize,
    split: &Split,
    mut optim: O,
) -> anyhow::Result<FoldReport>
where
    O: Optimizer<FaceClassifier<ADBackend>, ADBackend>,
{
    let cfg = ctx.cfg.clone();
    let task = cfg.task;
    let num_classes = task.num_classes();
    log::info!("fold {fold}: task {task:?}, {num_classes} classes");
    let (train_loader, val_loader) = build_loaders(&cfg, records, split)?;
    let mut model = init_model(cfg.model, num_classes, &ctx.device, cfg.pretrained.as_deref())?;
    let schedule = StepLr::new(cfg.lr, cfg.lr_decay_step);
    let batches_per_epoch = train_loader.num_batches();

    let mut best = BestTracker::default();
    let mut last = None;
    for epoch in 0..cfg.epochs {
        let lr = schedule.lr(epoch);
        let mut window = MetricWindow::default();
        let mut iter = train_loader.epoch(epoch);
        let mut idx = 0usize;
        while let Some(batch) = iter.next_batch::<ADBackend>(&ctx.device)? {
            let targets_host = batch.target_values(|l| task.select(l));
            let targets = batch.task_targets(task, &ctx.device);
            let logits = model.forward(batch.images);
            let preds = argmax(logits.clone());
            let loss = cfg.criterion.forward(logits, targets);
            let loss_value = scalar(loss.clone().detach());
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);

            window.push(loss_value, &targets_host, &preds, num_classes);
            idx += 1;
            if idx % cfg.log_interval == 0 {
                let s = window.summary();
                log::info!(
                    "Fold[{fold}] Epoch[{}/{}]({idx}/{batches_per_epoch}) || training loss {:.4} || training accuracy {:.2}% || lr {lr}",
                    epoch + 1,
                    cfg.epochs,
                    s.loss,
                    s.accuracy * 100.0
                );
                let step = epoch * batches_per_epoch + idx - 1;
                ctx.sink.scalar(&format!("fold{fold}/Train/loss"), s.loss, step)?;
                ctx.sink
                    .scalar(&format!("fold{fold}/Train/accuracy"), s.accuracy, step)?;
                window.reset();
            }
        }

        log::info!("Calculating validation results...");
        let val = validate(&model.valid(), &val_loader, task, cfg.criterion, ctx, epoch)?;
        let improved = best.observe(val.f1, val.loss, val.accuracy);
        ctx.store.save(
            &model,
            &epoch_checkpoint_name(cfg.model.key(), fold, epoch, val.f1, val.loss),
        )?;
        if improved.f1 {
            log::info!(
                "New best model for val f1 : {:.2}%! saving the best model..",
                val.f1 * 100.0
            );
        }
        ctx.store
            .save_best_and_last(&model, &format!("fold{fold}_"), improved)?;
        log::info!(
            "[Val] Fold : {fold}, acc : {:.2}%, f1 : {:.2}%, loss: {:.4} || best acc : {:.2}%, best f1 : {:.2}%, best loss: {:.4}",
            val.accuracy * 100.0,
            val.f1 * 100.0,
            val.loss,
            best.best_accuracy * 100.0,
            best.best_f1 * 100.0,
            best.best_loss
        );
        ctx.sink.scalar(&format!("fold{fold}/Val/f1"), val.f1, epoch)?;
        ctx.sink.scalar(&format!("fold{fold}/Val/loss"), val.loss, epoch)?;
        ctx.sink
            .scalar(&format!("fold{fold}/Val/accuracy"), val.accuracy, epoch)?;
        last = Some(val);
    }
    Ok(FoldReport { fold, best, last })
}

fn validate(
    model: &FaceClassifier<TrainBackend>,
    loader: &FaceLoader,
    task: Task,
    criterion: crate::loss::CriterionKind,
    ctx: &RunContext,
    epoch: usize,
) -> anyhow::Result<EpochReport> {
    let mut collected = Collected::default();
    let mut iter = loader.epoch(0);
    while let Some(batch) = iter.next_batch::<TrainBackend>(&ctx.device)? {
        let targets_host = batch.target_values(|l| task.select(l));
        let targets = batch.task_targets(task, &ctx.device);
        let logits = model.forward(batch.images);
        let preds = argmax(logits.clone());
        let loss = scalar(criterion.forward(logits, targets));
        collected.push(loss, &targets_host, &preds);
    }
    Ok(collected.report(epoch, task.num_classes()))
}
