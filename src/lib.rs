pub mod config;
pub mod errors;
pub mod image_io;
pub mod model;
pub mod pipeline;
pub mod reporter;
pub mod traits;

pub mod mocks;

use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

pub use config::{is_supported_image_format, Cli, Config, Mode};
pub use errors::{RembgError, Result};
pub use image_io::{save_png, ImageLoader, ImageSource};
pub use model::{Device, ModelSource, OnnxModel, OnnxModelProvider};
pub use pipeline::remove_background;
pub use reporter::{Reporter, Status};
pub use traits::*;

/// One unit of work: where the image comes from and where the cutout goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub source: ImageSource,
    pub destination: PathBuf,
}

impl Job {
    pub fn new(source: ImageSource, destination: impl Into<PathBuf>) -> Self {
        Self {
            source,
            destination: destination.into(),
        }
    }
}

/// Outcome of a directory run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub found: usize,
    pub succeeded: usize,
    pub failed: Vec<PathBuf>,
}

impl BatchSummary {
    /// True when at least one image was written.
    pub const fn succeeded_any(&self) -> bool {
        self.succeeded > 0
    }
}

pub struct ImageProcessor<P: ModelProvider> {
    provider: P,
    loader: ImageLoader,
    reporter: Reporter,
}

impl<P: ModelProvider> ImageProcessor<P> {
    pub const fn new(provider: P, loader: ImageLoader, reporter: Reporter) -> Self {
        Self {
            provider,
            loader,
            reporter,
        }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Loads, segments and saves one image.
    ///
    /// The model is loaded on demand unless both `model` and `device` are
    /// given. Per-image failures are reported and come back as `Ok(false)`;
    /// `Err` means the model could not be loaded.
    pub fn process_one(
        &self,
        job: &Job,
        model: Option<Arc<P::Model>>,
        device: Option<Device>,
        verbose: bool,
    ) -> Result<bool> {
        let reporter = self.reporter.with_verbose(verbose);

        let Ok(image) = self.loader.load(&job.source, &reporter) else {
            return Ok(false);
        };

        let (model, device) = self.provider.resolve_or_load(model, device, &reporter)?;
        log::debug!("segmenting {} on {device}", job.source);

        let result = match remove_background(&image, model.as_ref()) {
            Ok(result) => result,
            Err(e) => {
                reporter.error(format!("Failed to process image: {e}"));
                return Ok(false);
            }
        };

        Ok(save_png(&job.destination, &result, &reporter).is_ok())
    }

    /// Processes every supported image directly inside `input_dir`.
    ///
    /// Nothing is created when the directory holds no supported image. The
    /// model is loaded once and shared by every file; a failing file is
    /// reported and skipped. An output directory that cannot be created
    /// fails every file without loading the model.
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchSummary> {
        let image_files = collect_image_files(input_dir);

        if image_files.is_empty() {
            self.reporter
                .warn(format!("No image files found in {}", input_dir.display()));
            return Ok(BatchSummary::default());
        }

        if let Err(e) = fs::create_dir_all(output_dir) {
            self.reporter.error(format!(
                "Failed to create output directory {}: {e}",
                output_dir.display()
            ));
            return Ok(BatchSummary {
                found: image_files.len(),
                succeeded: 0,
                failed: image_files,
            });
        }

        self.reporter
            .info(format!("Found {} images to process", image_files.len()));

        let (model, device) = self.provider.load(&self.reporter.with_verbose(true))?;

        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message("Processing images");

        let mut summary = BatchSummary {
            found: image_files.len(),
            ..BatchSummary::default()
        };

        for input_file in &image_files {
            let job = Job::new(
                ImageSource::Path(input_file.clone()),
                output_path_for(input_file, output_dir),
            );

            if self.process_one(&job, Some(Arc::clone(&model)), Some(device), false)? {
                summary.succeeded += 1;
            } else {
                self.reporter.println_above(
                    &pb,
                    Status::Error,
                    &format!("Failed to process {}", input_file.display()),
                );
                summary.failed.push(input_file.clone());
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        self.reporter.success(format!(
            "Successfully processed {} out of {} images",
            summary.succeeded, summary.found
        ));
        Ok(summary)
    }
}

/// Supported images directly inside `input_dir`, ordered by file name.
pub fn collect_image_files(input_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| is_supported_image_format(path))
        .collect()
}

/// `<output_dir>/<input stem>.png`
pub fn output_path_for(input_file: &Path, output_dir: &Path) -> PathBuf {
    let mut file_name = input_file
        .file_stem()
        .map_or_else(|| OsString::from("output"), OsStr::to_os_string);
    file_name.push(".png");
    output_dir.join(file_name)
}
