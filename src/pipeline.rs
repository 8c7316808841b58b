use image::{
    buffer::ConvertBuffer, imageops, imageops::FilterType, GrayImage, ImageBuffer, Luma,
    RgbImage, Rgba, RgbaImage,
};
use imageproc::map::map_colors;
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::{
    errors::{RembgError, Result},
    traits::SegmentationModel,
};

/// Side length of the square the network sees.
pub const PROCESSING_SIZE: u32 = 1024;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Cuts the background out of `image`.
///
/// The mask probabilities become the alpha channel as they are, without a
/// threshold, so object boundaries keep their soft edges. The result always has
/// the dimensions of the input.
pub fn remove_background<M>(image: &RgbImage, model: &M) -> Result<RgbaImage>
where
    M: SegmentationModel + ?Sized,
{
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(RembgError::Pipeline {
            reason: format!("cannot segment an empty {width}x{height} image"),
        });
    }

    let tensor = preprocess(image);
    let logits = model.predict(tensor.view())?;
    let mask = postprocess_mask(logits, width, height)?;

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    let foreground: RgbaImage = image.convert();
    paste_with_mask(&mut canvas, &foreground, &mask)?;
    Ok(canvas)
}

/// Resizes to the processing square and normalizes into a `1x3xSxS` tensor.
pub fn preprocess(image: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(image, PROCESSING_SIZE, PROCESSING_SIZE, FilterType::Triangle);

    let mut tensor = resized.as_ndarray3().mapv(|v| f32::from(v) / 255.0);
    for (mut channel, (mean, std)) in tensor
        .outer_iter_mut()
        .zip(IMAGENET_MEAN.iter().zip(IMAGENET_STD.iter()))
    {
        channel.mapv_inplace(|v| (v - mean) / std);
    }

    tensor.insert_axis(Axis(0))
}

/// Turns final-stage logits into an 8-bit mask at `width`x`height`.
pub fn postprocess_mask(logits: Array4<f32>, width: u32, height: u32) -> Result<GrayImage> {
    let (batch, channels, mask_height, mask_width) = logits.dim();
    if batch == 0 || channels == 0 || mask_height == 0 || mask_width == 0 {
        return Err(RembgError::Pipeline {
            reason: format!("model returned an empty mask of shape {:?}", logits.shape()),
        });
    }

    let probabilities: Vec<f32> = logits
        .slice(s![0, 0, .., ..])
        .iter()
        .map(|&logit| sigmoid(logit))
        .collect();
    let probabilities: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(mask_width as u32, mask_height as u32, probabilities).ok_or_else(
            || RembgError::Pipeline {
                reason: "mask buffer does not match its dimensions".to_string(),
            },
        )?;

    let mask = map_colors(&probabilities, |Luma([p])| Luma([quantize(p)]));
    Ok(imageops::resize(&mask, width, height, FilterType::CatmullRom))
}

/// Pastes `image` onto `canvas`, weighting every channel by `mask`.
///
/// A mask value of 255 copies the source pixel, 0 keeps the canvas pixel and
/// anything in between blends the two.
pub fn paste_with_mask(canvas: &mut RgbaImage, image: &RgbaImage, mask: &GrayImage) -> Result<()> {
    if canvas.dimensions() != image.dimensions() || image.dimensions() != mask.dimensions() {
        return Err(RembgError::Pipeline {
            reason: format!(
                "dimension mismatch: canvas {:?}, image {:?}, mask {:?}",
                canvas.dimensions(),
                image.dimensions(),
                mask.dimensions()
            ),
        });
    }

    for ((target, source), &Luma([weight])) in
        canvas.pixels_mut().zip(image.pixels()).zip(mask.pixels())
    {
        for (dst, &src) in target.0.iter_mut().zip(source.0.iter()) {
            *dst = blend(src, *dst, weight);
        }
    }
    Ok(())
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Scales a probability to 8 bits, truncating like a float-to-byte tensor cast.
fn quantize(p: f32) -> u8 {
    (p.clamp(0.0, 1.0) * 255.0) as u8
}

fn blend(src: u8, dst: u8, weight: u8) -> u8 {
    let weight = u32::from(weight);
    let value = u32::from(src) * weight + u32::from(dst) * (255 - weight);
    ((value + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockSegmentationModel;
    use image::Rgb;

    #[test]
    fn preprocess_shape_and_normalization() {
        let image = RgbImage::from_pixel(40, 20, Rgb([255, 0, 128]));
        let tensor = preprocess(&image);
        let size = PROCESSING_SIZE as usize;
        assert_eq!(tensor.shape(), &[1, 3, size, size]);

        let red = tensor[[0, 0, 10, 10]];
        let green = tensor[[0, 1, 500, 700]];
        let blue = tensor[[0, 2, size - 1, size - 1]];
        assert!((red - (1.0 - 0.485) / 0.229).abs() < 1e-5);
        assert!((green - (0.0 - 0.456) / 0.224).abs() < 1e-5);
        assert!((blue - (128.0 / 255.0 - 0.406) / 0.225).abs() < 1e-5);
    }

    #[test]
    fn postprocess_applies_sigmoid_and_resizes() -> Result<()> {
        let logits = Array4::<f32>::zeros((1, 1, 8, 8));
        let mask = postprocess_mask(logits, 3, 5)?;
        assert_eq!(mask.dimensions(), (3, 5));
        assert!(mask.pixels().all(|&Luma([v])| v == 127));

        let saturated = Array4::<f32>::from_elem((1, 1, 4, 4), 50.0);
        let mask = postprocess_mask(saturated, 4, 4)?;
        assert!(mask.pixels().all(|&Luma([v])| v == 255));
        Ok(())
    }

    #[test]
    fn postprocess_rejects_empty_output() {
        let logits = Array4::<f32>::zeros((1, 0, 8, 8));
        assert!(matches!(
            postprocess_mask(logits, 4, 4),
            Err(RembgError::Pipeline { .. })
        ));
    }

    #[test]
    fn paste_blends_every_channel() -> Result<()> {
        let mut canvas = RgbaImage::from_pixel(3, 1, Rgba([0, 0, 0, 0]));
        let image = RgbaImage::from_pixel(3, 1, Rgba([200, 100, 50, 255]));
        let mask = GrayImage::from_raw(3, 1, vec![0, 128, 255]).unwrap();

        paste_with_mask(&mut canvas, &image, &mask)?;

        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(canvas.get_pixel(1, 0), &Rgba([100, 50, 25, 128]));
        assert_eq!(canvas.get_pixel(2, 0), &Rgba([200, 100, 50, 255]));
        Ok(())
    }

    #[test]
    fn paste_rejects_mismatched_mask() {
        let mut canvas = RgbaImage::new(4, 4);
        let image = RgbaImage::new(4, 4);
        let mask = GrayImage::new(4, 3);
        assert!(paste_with_mask(&mut canvas, &image, &mask).is_err());
    }

    #[test]
    fn output_keeps_input_size() -> Result<()> {
        let model = MockSegmentationModel::radial();
        for (width, height) in [(1, 1), (17, 5), (64, 200)] {
            let image = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
            let result = remove_background(&image, &model)?;
            assert_eq!(result.dimensions(), (width, height));
        }
        Ok(())
    }

    #[test]
    fn alpha_follows_mask_without_threshold() -> Result<()> {
        let model = MockSegmentationModel::radial();
        let image = RgbImage::from_pixel(256, 256, Rgb([255, 255, 255]));
        let result = remove_background(&image, &model)?;

        assert!(result.get_pixel(128, 128)[3] > 250);
        assert!(result.get_pixel(0, 0)[3] < 5);
        assert!(result.pixels().any(|p| p[3] > 0 && p[3] < 255));
        Ok(())
    }

    #[test]
    fn empty_image_is_a_pipeline_error() {
        let model = MockSegmentationModel::radial();
        let image = RgbImage::new(0, 10);
        assert!(matches!(
            remove_background(&image, &model),
            Err(RembgError::Pipeline { .. })
        ));
    }
}
