use std::env;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;

use rmbg_rs::{
    Cli, Config, ImageLoader, ImageProcessor, Job, Mode, ModelSource, OnnxModelProvider, Reporter,
};

/// Log filter for diagnostic output, e.g. `RMBG_LOG=debug`.
const LOG_ENV: &str = "RMBG_LOG";

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().filter_or(LOG_ENV, "warn")).init();

    let reporter = Reporter::default();
    let current_dir = env::current_dir().context("Failed to read the current directory")?;
    let config = Config::resolve(Cli::parse(), &current_dir)?;

    if config.input_defaulted {
        reporter.info(format!(
            "No input specified, using current directory: {}",
            current_dir.display()
        ));
    }

    let provider = OnnxModelProvider::new(ModelSource::from_env());
    let loader = ImageLoader::new().context("Failed to create the HTTP client")?;
    let processor = ImageProcessor::new(provider, loader, reporter);

    // Per-image failures are already reported; only model errors end the run.
    match config.mode {
        Mode::Directory {
            input_dir,
            output_dir,
        } => {
            reporter.info(format!("Processing directory: {}", input_dir.display()));
            reporter.info(format!("Output directory: {}", output_dir.display()));
            processor.process_directory(&input_dir, &output_dir)?;
        }
        Mode::Single { source, output } => {
            reporter.info(format!("Output path: {}", output.display()));
            processor.process_one(&Job::new(source, output), None, None, true)?;
        }
    }

    Ok(())
}
