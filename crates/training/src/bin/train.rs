use clap::Parser;
use training::util::{run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = TrainArgs::parse();
    let report = run_train(args)?;
    for fold in &report.folds {
        log::info!(
            "fold {}: best f1 {:.4}, best loss {:.4}, best acc {:.4}",
            fold.fold,
            fold.best.best_f1,
            fold.best.best_loss,
            fold.best.best_accuracy
        );
    }
    log::info!("run saved to {}", report.run_dir.display());
    Ok(())
}
