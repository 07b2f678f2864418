//! Loading and pixel level helpers shared by the pipeline stages.
//!
//! Photos are decoded into RGB with float samples in `[0, 1]`, the form the localization
//! network consumes. Binarization helpers work on 8-bit grayscale.

use image::{ imageops, imageops::FilterType, DynamicImage, GrayImage, Rgb32FImage, RgbImage };
use imageproc::contrast::{ self, ThresholdType };

use std::path::Path;

use crate::error::LprError;

/// Side of the square that classifier-style consumers expect.
pub const SQUARE_SIDE: u32 = 224;

/// Read a photo as RGB with samples scaled to `[0, 1]`.
pub fn load_image(path: impl AsRef<Path>) -> Result<Rgb32FImage, LprError> {
    let img = image::open(path)?;
    Ok(img.to_rgb32f())
}

/// Like [`load_image`], then stretched to `SQUARE_SIDE x SQUARE_SIDE`.
pub fn load_image_square(path: impl AsRef<Path>) -> Result<Rgb32FImage, LprError> {
    let img = load_image(path)?;
    Ok(imageops::resize(&img, SQUARE_SIDE, SQUARE_SIDE, FilterType::Triangle))
}

/// Scale float samples back to `[0, 255]`, saturating.
pub fn to_rgb8(img: &Rgb32FImage) -> RgbImage {
    DynamicImage::ImageRgb32F(img.clone()).to_rgb8()
}

/// Grey level spread below which an image counts as a single colour.
/// Resampling alone can move a flat image by a level or two, anything wider is left to Otsu.
pub const MIN_CONTRAST: u8 = 3;

/// Difference between the brightest and the darkest pixel.
pub fn spread(img: &GrayImage) -> u8 {
    let (min, max) = img.pixels().fold((u8::MAX, u8::MIN), |(min, max), p| (min.min(p[0]), max.max(p[0])));
    max.saturating_sub(min)
}

pub fn is_flat(img: &GrayImage) -> bool {
    spread(img) < MIN_CONTRAST
}

/// Otsu threshold with inverted output: dark strokes become 255, the light background 0.
/// A flat image has nothing to separate and yields `None`.
pub fn binarize_inverted(gray: &GrayImage) -> Option<GrayImage> {
    if is_flat(gray) {
        return None;
    }
    let level = contrast::otsu_level(gray);
    Some(contrast::threshold(gray, level, ThresholdType::BinaryInverted))
}

/// Otsu threshold, falling back to `cutoff` when the image is flat.
pub fn binarize(gray: &GrayImage, cutoff: u8) -> GrayImage {
    let level = if is_flat(gray) {
        cutoff
    } else {
        contrast::otsu_level(gray)
    };
    contrast::threshold(gray, level, ThresholdType::Binary)
}
