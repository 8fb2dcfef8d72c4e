use clap::Parser;
use inference::{run_inference, InferArgs};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = InferArgs::parse();
    let report = run_inference(args)?;
    log::info!(
        "{} predictions written to {}",
        report.predictions.len(),
        report.output_path.display()
    );
    Ok(())
}
