use std::path::{Path, PathBuf};

use clap::Parser;
use reqwest::Url;

use crate::{errors::Result, image_io::ImageSource};

/// Name of the folder results go to when no output is given.
pub const DEFAULT_OUTPUT_DIR: &str = "remove_bg";
const FALLBACK_STEM: &str = "output";

#[derive(Parser, Clone, Debug)]
#[command(version, about = "RMBG-2.0 background removal", long_about = None)]
pub struct Cli {
    /// Input image path, URL, or directory (default: current directory)
    #[arg(short, long)]
    pub input: Option<String>,

    /// Output image path or directory (default: <input dir>/remove_bg/)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Treat input as URL
    #[arg(long)]
    pub url: bool,
}

/// What a run does, with every path resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Directory {
        input_dir: PathBuf,
        output_dir: PathBuf,
    },
    Single {
        source: ImageSource,
        output: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
    /// Set when `--input` was omitted and `current_dir` was used instead.
    pub input_defaulted: bool,
}

impl Config {
    /// Resolves the run mode and output path from parsed arguments.
    ///
    /// An empty `--input` counts as omitted.
    ///
    /// Directory mode needs a local directory and no `--url`. Without
    /// `--output`, directories write to `<input>/remove_bg/` and single images
    /// to `<input's directory>/remove_bg/<stem>.png`.
    pub fn resolve(cli: Cli, current_dir: &Path) -> Result<Self> {
        let input = cli.input.filter(|input| !input.is_empty());
        let input_defaulted = input.is_none();
        let input = input.unwrap_or_else(|| current_dir.display().to_string());

        let mode = if !cli.url && Path::new(&input).is_dir() {
            let input_dir = PathBuf::from(&input);
            let output_dir = cli
                .output
                .unwrap_or_else(|| input_dir.join(DEFAULT_OUTPUT_DIR));
            Mode::Directory {
                input_dir,
                output_dir,
            }
        } else {
            let output = cli
                .output
                .unwrap_or_else(|| default_single_output(&input, cli.url));
            Mode::Single {
                source: ImageSource::new(&input, cli.url),
                output,
            }
        };

        Ok(Self {
            mode,
            input_defaulted,
        })
    }
}

/// Default output for one image: a `.png` named after the input, in a
/// `remove_bg` folder next to it. URLs have no local folder and use `.`.
pub fn default_single_output(input: &str, is_url: bool) -> PathBuf {
    let (parent, stem) = if is_url {
        (PathBuf::from("."), url_stem(input))
    } else {
        let path = Path::new(input);
        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        (parent, stem)
    };

    let stem = stem.unwrap_or_else(|| FALLBACK_STEM.to_string());
    parent
        .join(DEFAULT_OUTPUT_DIR)
        .join(format!("{stem}.png"))
}

fn url_stem(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Path::new(segment)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

/// Whether `path` has one of the extensions batch mode picks up.
pub fn is_supported_image_format(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "bmp" | "tiff" | "webp"
            )
        })
}
