//! Image preprocessing for the crop classifiers
//!
//! Shorter side resized to 256, center crop to 224, then ImageNet
//! normalization into a flat CHW buffer. This must match the transform
//! the weights were trained with.

use image::{imageops::FilterType, DynamicImage};

use crate::utils::error::{AdvisoryError, Result};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Shorter-side length before cropping
pub const RESIZE_SHORTER: u32 = 256;
/// Side of the square crop fed to the network
pub const CROP_SIZE: u32 = 224;
/// Longest accepted long-side to short-side ratio
///
/// Keeps the resized image at most `MAX_ASPECT_RATIO * RESIZE_SHORTER` long.
pub const MAX_ASPECT_RATIO: u32 = 10;

/// Decode uploaded bytes, rejecting anything that is not an image
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(AdvisoryError::InvalidImage("empty upload".to_string()));
    }
    image::load_from_memory(bytes)
        .map_err(|e| AdvisoryError::InvalidImage(format!("could not decode image: {}", e)))
}

/// Reject banner-shaped images before resizing blows them up
fn check_aspect_ratio(image: &DynamicImage) -> Result<()> {
    let (width, height) = (image.width(), image.height());
    let (long, short) = (width.max(height), width.min(height));
    if short == 0 || long as u64 > short as u64 * MAX_ASPECT_RATIO as u64 {
        return Err(AdvisoryError::InvalidImage(format!(
            "image is {}x{}, aspect ratio above {}:1",
            width, height, MAX_ASPECT_RATIO
        )));
    }
    Ok(())
}

/// Resize so the shorter side equals `target`, keeping the aspect ratio
fn resize_shorter_side(image: &DynamicImage, target: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let (new_w, new_h) = if width <= height {
        let h = (height as u64 * target as u64 / width.max(1) as u64) as u32;
        (target, h.max(target))
    } else {
        let w = (width as u64 * target as u64 / height.max(1) as u64) as u32;
        (w.max(target), target)
    };
    image.resize_exact(new_w, new_h, FilterType::Triangle)
}

/// Square crop of `size` from the middle of the image
fn center_crop(image: &DynamicImage, size: u32) -> DynamicImage {
    let x = image.width().saturating_sub(size) / 2;
    let y = image.height().saturating_sub(size) / 2;
    image.crop_imm(x, y, size, size)
}

/// Normalize an image to a flat vector with ImageNet normalization
/// Returns CHW layout: [C, H, W] flattened
fn normalize_image(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let num_pixels = (width * height) as usize;

    let mut normalized = vec![0.0f32; 3 * num_pixels];

    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            normalized[c * num_pixels + i] =
                (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    normalized
}

/// Full transform for an already decoded image
pub fn preprocess(image: &DynamicImage, crop_size: u32) -> Result<Vec<f32>> {
    check_aspect_ratio(image)?;
    let shorter = RESIZE_SHORTER * crop_size / CROP_SIZE;
    let resized = resize_shorter_side(image, shorter);
    let cropped = center_crop(&resized, crop_size);
    Ok(normalize_image(&cropped))
}

/// Decode and transform uploaded bytes
pub fn preprocess_bytes(bytes: &[u8], crop_size: u32) -> Result<Vec<f32>> {
    let image = decode_image(bytes)?;
    preprocess(&image, crop_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_resize_keeps_aspect_ratio() {
        let img = DynamicImage::new_rgb8(512, 300);
        let resized = resize_shorter_side(&img, 256);
        assert_eq!(resized.height(), 256);
        assert_eq!(resized.width(), 436);
    }

    #[test]
    fn test_output_is_chw_crop() {
        let bytes = png_bytes(400, 300, [255, 0, 0]);
        let tensor = preprocess_bytes(&bytes, CROP_SIZE).unwrap();
        assert_eq!(tensor.len(), 3 * 224 * 224);
    }

    #[test]
    fn test_normalization_per_channel() {
        let bytes = png_bytes(300, 300, [255, 0, 0]);
        let tensor = preprocess_bytes(&bytes, CROP_SIZE).unwrap();
        let plane = 224 * 224;

        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((tensor[0] - red).abs() < 1e-4);
        assert!((tensor[plane] - green).abs() < 1e-4);
    }

    #[test]
    fn test_extreme_aspect_ratio_is_invalid_image() {
        for (width, height) in [(1, 600), (3000, 200), (1, 0)] {
            let img = DynamicImage::new_rgb8(width, height);
            let err = preprocess(&img, CROP_SIZE).unwrap_err();
            assert!(matches!(err, AdvisoryError::InvalidImage(_)), "{}x{}", width, height);
        }

        // exactly at the limit is still accepted
        let tensor = preprocess_bytes(&png_bytes(2000, 200, [0, 128, 0]), CROP_SIZE).unwrap();
        assert_eq!(tensor.len(), 3 * 224 * 224);
    }

    #[test]
    fn test_corrupt_bytes_are_invalid_image() {
        let err = preprocess_bytes(b"definitely not a jpeg", CROP_SIZE).unwrap_err();
        assert!(matches!(err, AdvisoryError::InvalidImage(_)));

        let err = decode_image(&[]).unwrap_err();
        assert!(matches!(err, AdvisoryError::InvalidImage(_)));
    }
}
