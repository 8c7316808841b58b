use std::{
    fmt, fs,
    io::Cursor,
    path::{Path, PathBuf},
    time::Duration,
};

use image::{ImageFormat, ImageReader, RgbImage, RgbaImage};
use reqwest::blocking::Client;

use crate::{
    errors::{RembgError, Result},
    reporter::Reporter,
};

/// Upper bound for a single image download.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Where an input image is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Url(String),
}

impl ImageSource {
    pub fn new(source: &str, is_url: bool) -> Self {
        if is_url {
            Self::Url(source.to_string())
        } else {
            Self::Path(PathBuf::from(source))
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Decodes images from disk or over HTTP.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    http_client: Client,
}

impl ImageLoader {
    pub fn new() -> Result<Self> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http_client))
    }

    pub const fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }

    /// Loads `source` as RGB.
    ///
    /// Failures are returned as values and reported, so one bad input never
    /// takes a batch down with it.
    pub fn load(&self, source: &ImageSource, reporter: &Reporter) -> Result<RgbImage> {
        match source {
            ImageSource::Url(url) => {
                reporter.info(format!("Downloading image from URL: {url}"));
                self.fetch(url)
                    .inspect_err(|e| reporter.error(format!("Error downloading image: {e}")))
            }
            ImageSource::Path(path) => {
                reporter.info(format!("Processing image: {}", path.display()));
                open_rgb(path).inspect_err(|e| reporter.error(format!("Error opening image: {e}")))
            }
        }
    }

    fn fetch(&self, url: &str) -> Result<RgbImage> {
        let response = self.http_client.get(url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(RembgError::Download {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let bytes = response.bytes()?;
        log::debug!("downloaded {} bytes from {url}", bytes.len());
        decode_rgb(&bytes, url)
    }
}

fn open_rgb(path: &Path) -> Result<RgbImage> {
    let image = ImageReader::open(path)
        .map_err(|e| RembgError::FileSystem {
            path: path.to_path_buf(),
            operation: "open image".to_string(),
            source: e,
        })?
        .with_guessed_format()
        .map_err(|e| RembgError::FileSystem {
            path: path.to_path_buf(),
            operation: "detect image format".to_string(),
            source: e,
        })?
        .decode()
        .map_err(|e| RembgError::ImageProcessing {
            path: path.display().to_string(),
            operation: "decode image".to_string(),
            source: Box::new(e),
        })?;
    Ok(image.into_rgb8())
}

fn decode_rgb(bytes: &[u8], origin: &str) -> Result<RgbImage> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RembgError::ImageProcessing {
            path: origin.to_string(),
            operation: "detect image format".to_string(),
            source: Box::new(e),
        })?
        .decode()
        .map_err(|e| RembgError::ImageProcessing {
            path: origin.to_string(),
            operation: "decode downloaded image".to_string(),
            source: Box::new(e),
        })?;
    Ok(image.into_rgb8())
}

/// Writes `image` as PNG, creating missing parent directories first.
pub fn save_png(path: &Path, image: &RgbaImage, reporter: &Reporter) -> Result<()> {
    write_png(path, image)
        .inspect(|_| reporter.success(format!("Saved to: {}", path.display())))
        .inspect_err(|e| reporter.error(format!("Error saving output image: {e}")))
}

fn write_png(path: &Path, image: &RgbaImage) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| RembgError::FileSystem {
        path: parent.to_path_buf(),
        operation: "create output directory".to_string(),
        source: e,
    })?;

    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| RembgError::ImageProcessing {
            path: path.display().to_string(),
            operation: "save image".to_string(),
            source: Box::new(e),
        })
}
