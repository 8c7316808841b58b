use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use image::{ImageFormat, Rgb, RgbImage};
use reqwest::blocking::Client;
use tempfile::TempDir;

use rmbg_rs::{
    mocks::{MockModelProvider, MockSegmentationModel},
    remove_background, ImageLoader, ImageProcessor, ImageSource, Job, RembgError, Reporter,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Serves a single HTTP response on a local port and returns its URL.
fn serve_once(status: &str, content_type: &str, body: Vec<u8>) -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
        }
    });

    Ok(format!("http://{addr}/images/portrait.png"))
}

fn local_loader() -> reqwest::Result<ImageLoader> {
    Ok(ImageLoader::with_client(Client::builder().no_proxy().build()?))
}

fn png_bytes(image: &RgbImage) -> image::ImageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// A photo-like gradient so resampling produces varied values.
fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 90])
    })
}

#[test]
fn output_is_rgba_with_input_dimensions() -> TestResult {
    let model = MockSegmentationModel::radial();
    for (width, height) in [(320, 240), (99, 401), (1024, 1024), (1500, 20)] {
        let result = remove_background(&gradient(width, height), &model)?;
        assert_eq!(result.dimensions(), (width, height));
    }
    Ok(())
}

#[test]
fn soft_edges_survive_as_partial_alpha() -> TestResult {
    let model = MockSegmentationModel::radial();
    let result = remove_background(&gradient(400, 300), &model)?;

    let partial = result.pixels().filter(|p| p[3] > 0 && p[3] < 255).count();
    let opaque = result.pixels().filter(|p| p[3] == 255).count();
    let transparent = result.pixels().filter(|p| p[3] == 0).count();
    assert!(partial > 0, "mask was thresholded into a hard cutout");
    assert!(opaque > 0);
    assert!(transparent > 0);
    Ok(())
}

#[test]
fn repeated_runs_are_bit_identical() -> TestResult {
    let model = MockSegmentationModel::radial();
    let image = gradient(213, 157);
    let first = remove_background(&image, &model)?;
    let second = remove_background(&image, &model)?;
    assert_eq!(first.as_raw(), second.as_raw());
    Ok(())
}

#[test]
fn transparent_pixels_carry_no_color() -> TestResult {
    let model = MockSegmentationModel::Constant(-40.0);
    let result = remove_background(&gradient(50, 50), &model)?;
    assert!(result.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    Ok(())
}

#[test]
fn url_with_non_image_payload_is_an_error_value() -> TestResult {
    let url = serve_once("200 OK", "text/html", b"<html>not an image</html>".to_vec())?;
    let result = local_loader()?.load(&ImageSource::Url(url), &Reporter::new(false));
    assert!(matches!(result, Err(RembgError::ImageProcessing { .. })));
    Ok(())
}

#[test]
fn url_with_error_status_is_an_error_value() -> TestResult {
    let url = serve_once("404 Not Found", "text/plain", b"missing".to_vec())?;
    let result = local_loader()?.load(&ImageSource::Url(url), &Reporter::new(false));
    assert!(matches!(result, Err(RembgError::Download { .. })));
    Ok(())
}

#[test]
fn url_image_is_decoded() -> TestResult {
    let url = serve_once("200 OK", "image/png", png_bytes(&gradient(12, 7))?)?;
    let image = local_loader()?.load(&ImageSource::Url(url), &Reporter::new(false))?;
    assert_eq!(image.dimensions(), (12, 7));
    Ok(())
}

#[test]
fn single_url_job_end_to_end() -> TestResult {
    let temp_dir = TempDir::new()?;
    let url = serve_once("200 OK", "image/png", png_bytes(&gradient(64, 48))?)?;
    let destination = temp_dir.path().join("remove_bg/portrait.png");

    let processor = ImageProcessor::new(
        MockModelProvider::new(MockSegmentationModel::radial()),
        local_loader()?,
        Reporter::new(false),
    );
    let job = Job::new(ImageSource::Url(url), &destination);

    assert!(processor.process_one(&job, None, None, false)?);
    let written = image::open(&destination)?;
    assert!(written.color().has_alpha());
    assert_eq!(written.into_rgba8().dimensions(), (64, 48));
    Ok(())
}
